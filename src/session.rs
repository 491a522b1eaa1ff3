//! The operations a UI drives, wired over the components.
//!
//! One session is one conversation. Requests and executions are serialized by the orchestrator
//! and the shared execution gate; the store is only ever locked briefly and never across an
//! await.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachments::{AddFilesOutcome, Attachment, AttachmentIngestor, FileInspector};
use crate::cancel::CancellationRegistry;
use crate::config::AssistConfig;
use crate::conversation::{ChatMessage, ChatMessagePatch, ConversationStore, StoreEvent};
use crate::credentials::CredentialStore;
use crate::error::{Error, ErrorCategory, RequestError, Result, UsageError};
use crate::execution::{ExecutionGate, ExecutionPermit, ExecutionResult, ExecutionStatus};
use crate::llm::AiTransport;
use crate::orchestrator::{RequestOrchestrator, provider_context};
use crate::status::{self, ErrorRecord};

/// Errors kept for display; older ones are dropped.
const MAX_ERROR_LOG: usize = 50;

/// Capabilities a session is built from.
///
/// Share one `gate` between sessions to keep execution exclusive application-wide.
pub struct SessionDeps {
    pub transport: Arc<dyn AiTransport>,
    pub credentials: Arc<dyn CredentialStore>,
    pub registry: Arc<dyn CancellationRegistry>,
    pub inspector: Arc<dyn FileInspector>,
    pub gate: Arc<ExecutionGate>,
}

/// Read-only view for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub pending_confirmations: Vec<usize>,
    pub pending_errors: Vec<ErrorRecord>,
    pub last_error: Option<ErrorRecord>,
    /// Input text handed back after a failed send.
    pub draft: Option<String>,
}

pub struct AssistantSession {
    config: AssistConfig,
    store: Mutex<ConversationStore>,
    ingestor: tokio::sync::Mutex<AttachmentIngestor>,
    orchestrator: RequestOrchestrator,
    gate: Arc<ExecutionGate>,
    errors: Mutex<Vec<ErrorRecord>>,
    draft: Mutex<Option<String>>,
}

/// A user turn and its loading placeholder waiting for a reply.
///
/// Dropped while armed (request failure or the `send` future itself dropped), it removes both
/// entries and hands the text back as the draft.
struct PendingTurn<'a> {
    session: &'a AssistantSession,
    user_id: Uuid,
    placeholder_id: Uuid,
    text: &'a str,
    armed: bool,
}

impl PendingTurn<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.rollback(self.user_id, self.placeholder_id) {
            self.session.restore_draft(self.text);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AssistantSession {
    pub fn new(config: AssistConfig, deps: SessionDeps) -> Self {
        let orchestrator =
            RequestOrchestrator::new(deps.transport, deps.credentials, deps.registry, &config);
        let ingestor = AttachmentIngestor::new(deps.inspector, config.attachments);

        Self {
            store: Mutex::new(ConversationStore::new()),
            ingestor: tokio::sync::Mutex::new(ingestor),
            orchestrator,
            gate: deps.gate,
            errors: Mutex::new(Vec::new()),
            draft: Mutex::new(None),
            config,
        }
    }

    /// Change notifications from the conversation store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        lock(&self.store).subscribe()
    }

    /// Send `text` with the pending attachments. Returns the index of the assistant reply.
    ///
    /// When the reply proposes code that needs no confirmation, it runs before this returns.
    /// On any request failure, or if this future is dropped before the reply is stored, the user
    /// turn is rolled back and `text` becomes the draft.
    pub async fn send(&self, text: &str) -> Result<usize> {
        if text.trim().is_empty() {
            return Err(UsageError::EmptyInput.into());
        }

        let prepared = match self.orchestrator.prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                if matches!(e, Error::Request(_)) {
                    self.restore_draft(text);
                    self.record(&e);
                }
                return Err(e);
            }
        };

        let (content, sent_paths) = {
            let tray = self.ingestor.lock().await;
            (tray.compose(text), tray.paths())
        };

        let (mut turn, context) = {
            let mut store = lock(&self.store);
            let user = ChatMessage::user(content);
            let placeholder = ChatMessage::loading();
            let turn = PendingTurn {
                session: self,
                user_id: user.id,
                placeholder_id: placeholder.id,
                text,
                armed: true,
            };
            store.append(user);
            store.append(placeholder);
            let context = provider_context(&store, self.config.context_window);
            (turn, context)
        };
        *lock(&self.draft) = None;
        debug!(request_id = %prepared.id(), "Turn appended");

        let outcome = self.orchestrator.dispatch(prepared, &context).await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                let e = Error::from(e);
                drop(turn);
                self.record(&e);
                return Err(e);
            }
        };

        let mut status = ExecutionStatus::initial(&response);
        let mut permit = None;
        if status == ExecutionStatus::Executing {
            match self.gate.try_admit() {
                Ok(p) => permit = Some(p),
                Err(_) => {
                    warn!("Another execution is running; waiting for confirmation instead");
                    status = ExecutionStatus::Pending;
                }
            }
        }

        let (index, reply_id) = {
            let mut store = lock(&self.store);
            if store.last().map(|m| m.id) != Some(turn.placeholder_id) {
                // Conversation was reset while the request was out.
                turn.disarm();
                info!("Discarding reply for a cleared conversation");
                return Err(RequestError::Aborted.into());
            }
            let reply = ChatMessage::assistant(response, status);
            let reply_id = reply.id;
            store.replace_last(reply);
            turn.disarm();
            (store.len() - 1, reply_id)
        };
        // Files attached while the request was out stay for the next turn.
        self.ingestor.lock().await.remove_paths(&sent_paths);
        info!(index, execution = %status, "Reply received");

        if let Some(permit) = permit {
            self.run_execution(index, reply_id, &permit).await;
        }
        Ok(index)
    }

    /// Cancel the outstanding request. Running executions are unaffected.
    pub fn abort(&self) -> bool {
        self.orchestrator.abort()
    }

    pub fn is_in_flight(&self) -> bool {
        self.orchestrator.is_in_flight()
    }

    /// Approve or reject the pending execution of message `index`.
    ///
    /// Approval runs every step before returning the settled result. If another sequence is
    /// running, approval fails with `ExecutionError::Busy` and the message stays pending.
    pub async fn confirm_execution(
        &self,
        index: usize,
        approved: bool,
    ) -> Result<Option<ExecutionResult>> {
        let (id, permit) = {
            let mut store = lock(&self.store);
            let entry = store.get(index).ok_or(UsageError::NoSuchMessage(index))?;
            if entry.execution_status != ExecutionStatus::Pending {
                return Err(UsageError::NothingToConfirm(index).into());
            }
            let id = entry.id;
            let next = entry.execution_status.confirm(approved)?;

            if !approved {
                store.update_at(index, ChatMessagePatch::execution_status(next))?;
                info!(index, "Execution rejected");
                return Ok(None);
            }

            let permit = self.gate.try_admit()?;
            store.update_at(index, ChatMessagePatch::execution_status(next))?;
            (id, permit)
        };

        info!(index, "Execution approved");
        Ok(Some(self.run_execution(index, id, &permit).await))
    }

    /// Inspect and hold `paths` for the next turn.
    pub async fn add_attachments(&self, paths: &[PathBuf]) -> Result<AddFilesOutcome> {
        let outcome = self.ingestor.lock().await.add_files(paths).await;
        match outcome {
            Ok(outcome) => {
                if !outcome.failed.is_empty() {
                    self.record_category(ErrorCategory::AttachmentUnsupported);
                }
                Ok(outcome)
            }
            Err(e) => {
                let e = Error::from(e);
                self.record(&e);
                Err(e)
            }
        }
    }

    pub async fn remove_attachment(&self, index: usize) -> Result<Attachment> {
        Ok(self.ingestor.lock().await.remove(index)?)
    }

    pub async fn attachments(&self) -> Vec<Attachment> {
        self.ingestor.lock().await.attachments().to_vec()
    }

    /// Reset: abort any request, drop every message, attachment, error and draft.
    pub async fn new_conversation(&self) {
        self.abort();
        lock(&self.store).clear();
        self.ingestor.lock().await.clear();
        lock(&self.errors).clear();
        *lock(&self.draft) = None;
        info!("New conversation");
    }

    /// Take the restored draft, leaving none.
    pub fn take_draft(&self) -> Option<String> {
        lock(&self.draft).take()
    }

    pub fn dismiss_errors(&self) {
        lock(&self.errors).clear();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let messages = lock(&self.store).entries().to_vec();
        let errors = lock(&self.errors).clone();
        let status = status::project(&messages, self.orchestrator.is_in_flight(), &errors);

        SessionSnapshot {
            messages,
            is_loading: status.is_loading,
            pending_confirmations: status.pending_confirmations,
            pending_errors: errors,
            last_error: status.last_error,
            draft: lock(&self.draft).clone(),
        }
    }

    /// Run the steps of message `index`, publishing progress, then settle it as complete.
    async fn run_execution(
        &self,
        index: usize,
        id: Uuid,
        permit: &ExecutionPermit,
    ) -> ExecutionResult {
        let (steps, status) = {
            let store = lock(&self.store);
            let entry = store.get(index).filter(|m| m.id == id);
            (
                entry
                    .and_then(|m| m.ai_response.as_ref())
                    .map(|r| r.steps())
                    .unwrap_or_default(),
                entry.map_or(ExecutionStatus::Executing, |m| m.execution_status),
            )
        };
        info!(index, steps = steps.len(), "Executing");

        let result = self
            .gate
            .run(permit, steps, |_, partial| {
                self.update_entry(index, id, ChatMessagePatch {
                    execution_result: Some(partial.clone()),
                    ..Default::default()
                });
            })
            .await;

        for _ in 0..result.failed() {
            self.record_category(ErrorCategory::ExecutionStepFailed);
        }

        match status.settle() {
            Ok(settled) => self.update_entry(
                index,
                id,
                ChatMessagePatch::execution_status(settled).with_result(result.clone()),
            ),
            Err(e) => warn!(index, error = %e, "Execution settled from an unexpected status"),
        }
        info!(
            index,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "Execution complete"
        );
        result
    }

    /// Patch the entry at `index` if it is still message `id`.
    fn update_entry(&self, index: usize, id: Uuid, patch: ChatMessagePatch) {
        let mut store = lock(&self.store);
        if store.get(index).map(|m| m.id) != Some(id) {
            debug!(index, "Execution target is gone; result dropped");
            return;
        }
        if let Err(e) = store.update_at(index, patch) {
            warn!(index, error = %e, "Failed to record execution progress");
        }
    }

    /// Remove the user turn and placeholder if they are still the tail. Returns whether it did.
    fn rollback(&self, user_id: Uuid, placeholder_id: Uuid) -> bool {
        let mut store = lock(&self.store);
        let entries = store.entries();
        let tail_matches = entries.len() >= 2
            && entries[entries.len() - 2].id == user_id
            && entries[entries.len() - 1].id == placeholder_id;
        if tail_matches {
            store.remove_last(2);
            warn!("No reply stored; turn rolled back");
        }
        tail_matches
    }

    fn restore_draft(&self, text: &str) {
        *lock(&self.draft) = Some(text.to_string());
    }

    fn record(&self, error: &Error) {
        warn!(category = error.category().as_str(), error = %error, "Operation failed");
        self.push_error(ErrorRecord::from(error));
    }

    fn record_category(&self, category: ErrorCategory) {
        self.push_error(ErrorRecord::new(category));
    }

    fn push_error(&self, record: ErrorRecord) {
        let mut errors = lock(&self.errors);
        errors.push(record);
        if errors.len() > MAX_ERROR_LOG {
            let excess = errors.len() - MAX_ERROR_LOG;
            errors.drain(..excess);
        }
    }
}

