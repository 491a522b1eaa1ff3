//! Runs proposed code in a subprocess.
//!
//! Provides:
//! - Platform shell selection (`sh -c`, PowerShell on Windows)
//! - Timeout enforcement
//! - Output capture and truncation
//! - Blocked command patterns

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::executor::{CodeExecutor, RunOutput};

/// Maximum output size before truncation (64KB).
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Commands that are always refused.
static BLOCKED_COMMANDS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "rm -rf /",
        "rm -rf /*",
        ":(){ :|:& };:", // Fork bomb
        "dd if=/dev/zero",
        "mkfs",
        "chmod -r 777 /",
        "> /dev/sda",
        "curl | sh",
        "wget | sh",
        "curl | bash",
        "wget | bash",
    ]
});

/// Patterns that must never run without the user saying yes, whatever the response asked for.
static NEVER_AUTO_APPROVE_PATTERNS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "rm -rf",
        "rm -fr",
        "remove-item",
        "del /s",
        "rmdir /s",
        "chmod -r 777",
        "chmod 777",
        "chown -r",
        "shutdown",
        "reboot",
        "poweroff",
        "stop-computer",
        "restart-computer",
        "init 0",
        "init 6",
        "sudo ",
        "iptables",
        "useradd",
        "userdel",
        "passwd",
        "crontab",
        "systemctl disable",
        "launchctl unload",
        "kill -9",
        "killall",
        "pkill",
        "git push --force",
        "git push -f",
        "git reset --hard",
        "git clean -f",
        "drop table",
        "drop database",
        "truncate",
        "delete from",
    ]
});

/// Whether `code` contains a pattern that always requires explicit confirmation.
pub fn requires_explicit_approval(code: &str) -> bool {
    let lower = code.to_lowercase();
    NEVER_AUTO_APPROVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Runs code through the platform shell.
#[derive(Debug)]
pub struct ShellExecutor {
    /// Working directory for commands (if None, uses cwd).
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_blocked(&self, code: &str) -> bool {
        let normalized = code.to_lowercase();
        BLOCKED_COMMANDS.iter().any(|b| normalized.contains(b))
    }

    fn command_for(code: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-Command", code]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", code]);
            c
        }
    }

    async fn execute(&self, code: &str) -> Result<RunOutput, String> {
        let mut command = Self::command_for(code);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| format!("Failed to spawn command: {e}"))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let result = tokio::time::timeout(self.timeout, async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let read_out = async {
                if let Some(ref mut out) = stdout_pipe {
                    out.read_to_end(&mut stdout).await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let read_err = async {
                if let Some(ref mut err) = stderr_pipe {
                    err.read_to_end(&mut stderr).await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let (out_res, err_res) = tokio::join!(read_out, read_err);
            out_res?;
            err_res?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        match result {
            Ok(Ok((status, stdout, stderr))) => {
                let stdout = String::from_utf8_lossy(&stdout);
                let stderr = String::from_utf8_lossy(&stderr);
                // Successful runs report stdout, failed runs report stderr first
                let output = match (status.success(), stdout.is_empty(), stderr.is_empty()) {
                    (_, _, true) => stdout.to_string(),
                    (true, false, false) => format!("{stdout}\n\n--- stderr ---\n{stderr}"),
                    (false, false, false) => format!("{stderr}\n\n--- stdout ---\n{stdout}"),
                    (_, true, false) => stderr.to_string(),
                };
                Ok(RunOutput {
                    success: status.success(),
                    output: truncate_output(&output),
                })
            }
            Ok(Err(e)) => Err(format!("Command execution failed: {e}")),
            Err(_) => Err(format!("Command timed out after {:?}", self.timeout)),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeExecutor for ShellExecutor {
    async fn run(&self, code: &str) -> RunOutput {
        if self.is_blocked(code) {
            tracing::warn!(code = %truncate_for_log(code), "Refused blocked command");
            return RunOutput::failure("Command contains a blocked pattern and was not run");
        }

        match self.execute(code).await {
            Ok(output) => output,
            Err(reason) => {
                tracing::warn!(%reason, "Shell execution failed");
                RunOutput::failure(reason)
            }
        }
    }
}

/// Truncate output to fit within limits (UTF-8 safe).
fn truncate_output(s: &str) -> String {
    if s.len() <= MAX_OUTPUT_SIZE {
        s.to_string()
    } else {
        let half = MAX_OUTPUT_SIZE / 2;
        let head_end = floor_char_boundary(s, half);
        let tail_start = floor_char_boundary(s, s.len() - half);
        format!(
            "{}\n\n... [truncated {} bytes] ...\n\n{}",
            &s[..head_end],
            s.len() - MAX_OUTPUT_SIZE,
            &s[tail_start..]
        )
    }
}

/// Find the largest byte index <= `i` that is a valid char boundary.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn truncate_for_log(s: &str) -> String {
    if s.chars().count() <= 100 {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(100).collect::<String>())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_succeeds() {
        let out = ShellExecutor::new().run("echo hello").await;
        assert!(out.success);
        assert!(out.output.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_stderr() {
        let out = ShellExecutor::new().run("echo oops >&2; exit 3").await;
        assert!(!out.success);
        assert!(out.output.contains("oops"));
    }

    #[tokio::test]
    async fn timeout_is_failure() {
        let out = ShellExecutor::new()
            .with_timeout(Duration::from_millis(100))
            .run("sleep 10")
            .await;
        assert!(!out.success);
        assert!(out.output.contains("timed out"));
    }

    #[tokio::test]
    async fn blocked_command_never_runs() {
        let out = ShellExecutor::new().run("rm -rf /").await;
        assert!(!out.success);
        assert!(out.output.contains("blocked"));
    }

    #[tokio::test]
    async fn working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellExecutor::new()
            .with_working_dir(dir.path().to_path_buf())
            .run("pwd")
            .await;
        let name = dir.path().file_name().unwrap().to_str().unwrap();
        assert!(out.output.contains(name));
    }

    #[test]
    fn explicit_approval_patterns() {
        assert!(requires_explicit_approval("rm -rf /tmp/stuff"));
        assert!(requires_explicit_approval("git push --force origin main"));
        assert!(requires_explicit_approval("sudo apt install jq"));
        assert!(requires_explicit_approval("DROP TABLE users;"));

        assert!(!requires_explicit_approval("ls -la /tmp"));
        assert!(!requires_explicit_approval("open -a Safari"));
        assert!(!requires_explicit_approval("git status"));
    }

    #[test]
    fn truncate_output_long() {
        let s = "x".repeat(MAX_OUTPUT_SIZE + 1000);
        let result = truncate_output(&s);
        assert!(result.len() <= MAX_OUTPUT_SIZE + 100);
        assert!(result.contains("[truncated"));
        assert_eq!(truncate_output("short"), "short");
    }

    #[test]
    fn floor_char_boundary_multibyte() {
        let s = "café";
        assert_eq!(floor_char_boundary(s, 5), 5);
        assert_eq!(floor_char_boundary(s, 4), 3);
        assert_eq!(floor_char_boundary(s, 3), 3);
    }
}
