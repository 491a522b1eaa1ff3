use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use deskpilot::attachments::FsInspector;
use deskpilot::cancel::TokenRegistry;
use deskpilot::conversation::ChatMessage;
use deskpilot::credentials::EnvCredentialStore;
use deskpilot::execution::{
    ExecutionGate, ExecutionResult, ExecutionStatus, ShellExecutor, StepStatus,
};
use deskpilot::llm::create_transport;
use deskpilot::{AssistConfig, AssistantSession, Error, SessionDeps};

/// Install the subscriber. The returned guard flushes the log file on drop.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("DESKPILOT_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "deskpilot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn print_reply(message: &ChatMessage) {
    println!("\n{}\n", message.text());
    let Some(response) = &message.ai_response else {
        return;
    };
    if message.execution_status == ExecutionStatus::Pending {
        for (i, step) in response.steps().iter().enumerate() {
            eprintln!("   {}. {}", i + 1, step.step);
            for line in step.code.lines() {
                eprintln!("      {line}");
            }
        }
        eprintln!("⚠️  Approval needed. Type 'yes' to run, 'no' to reject");
    }
}

fn print_result(result: &ExecutionResult) {
    for step in &result.steps {
        let mark = match step.status {
            StepStatus::Success => "✅",
            StepStatus::Failure => "❌",
            StepStatus::Pending => "…",
        };
        eprintln!("{mark} {}", step.step);
        if !step.result.trim().is_empty() {
            eprintln!("   {}", step.result.trim_end().replace('\n', "\n   "));
        }
    }
}

fn report(error: &Error) {
    eprintln!("❌ {}", error.category().user_message());
}

async fn send(session: &AssistantSession, text: &str) {
    let send = session.send(text);
    tokio::pin!(send);

    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            _ = tokio::signal::ctrl_c() => {
                if session.abort() {
                    eprintln!("⏹  Cancelling...");
                }
            }
        }
    };

    match result {
        Ok(index) => {
            let snapshot = session.snapshot();
            if let Some(message) = snapshot.messages.get(index) {
                print_reply(message);
                if let Some(result) = &message.execution_result {
                    print_result(result);
                }
            }
        }
        Err(e) => {
            report(&e);
            if let Some(draft) = session.take_draft() {
                eprintln!("   Your message was not sent: {draft}");
            }
        }
    }
}

async fn confirm(session: &AssistantSession, approved: bool) {
    let pending = session.snapshot().pending_confirmations;
    let Some(&index) = pending.first() else {
        eprintln!("ℹ️  Nothing is waiting for confirmation");
        return;
    };
    match session.confirm_execution(index, approved).await {
        Ok(Some(result)) => print_result(&result),
        Ok(None) => eprintln!("🚫 Rejected"),
        Err(e) => report(&e),
    }
}

async fn attach(session: &AssistantSession, args: &str) {
    let paths: Vec<PathBuf> = args.split_whitespace().map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("Usage: /attach <path> [path...]");
        return;
    }
    match session.add_attachments(&paths).await {
        Ok(outcome) => {
            for attachment in &outcome.added {
                eprintln!("📎 {} ({})", attachment.name, attachment.mime_type);
            }
            for failure in &outcome.failed {
                eprintln!("⚠️  {failure}");
            }
        }
        Err(e) => report(&e),
    }
}

async fn list_files(session: &AssistantSession) {
    let attachments = session.attachments().await;
    if attachments.is_empty() {
        eprintln!("No files attached");
    }
    for (i, attachment) in attachments.iter().enumerate() {
        eprintln!("  {}. {} ({} bytes)", i + 1, attachment.path.display(), attachment.size);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let config = AssistConfig::from_env().context("invalid DESKPILOT_* configuration")?;

    eprintln!("🧭 deskpilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Provider: {} ({})", config.backend, config.model);
    eprintln!("   Commands: /attach <paths>, /detach <n>, /files, /new, yes, no, /quit");
    eprintln!("   Ctrl+C cancels a request in flight.\n");

    let executor = ShellExecutor::new().with_timeout(config.shell_timeout);
    let deps = SessionDeps {
        transport: create_transport(config.backend),
        credentials: Arc::new(EnvCredentialStore),
        registry: Arc::new(TokenRegistry::new()),
        inspector: Arc::new(FsInspector::new()),
        gate: Arc::new(ExecutionGate::new(Arc::new(executor))),
    };
    let session = AssistantSession::new(config, deps);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/new" => {
                session.new_conversation().await;
                eprintln!("🆕 New conversation");
            }
            "/files" => list_files(&session).await,
            "yes" | "y" => confirm(&session, true).await,
            "no" | "n" => confirm(&session, false).await,
            _ if line.starts_with("/attach") => attach(&session, &line["/attach".len()..]).await,
            _ if line.starts_with("/detach") => {
                let arg = line["/detach".len()..].trim();
                match arg.parse::<usize>() {
                    Ok(n) if n > 0 => match session.remove_attachment(n - 1).await {
                        Ok(removed) => eprintln!("Removed {}", removed.name),
                        Err(e) => report(&e),
                    },
                    _ => eprintln!("Usage: /detach <n>"),
                }
            }
            text => send(&session, text).await,
        }
        eprint!("> ");
    }

    Ok(())
}
