//! Request orchestrator: one outstanding AI call at a time.
//!
//! A send is split in two:
//! - `prepare` runs synchronously: admission, credential lookup, token acquisition
//! - `dispatch` awaits the transport and classifies the outcome
//!
//! Callers that must admit a request before touching other state (the session appends the user
//! turn only once admitted) call the halves separately; everyone else uses `send`.

pub mod context;

pub use context::provider_context;

use std::sync::{Arc, Mutex, PoisonError};

use secrecy::SecretString;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::{CancelHandle, CancellationRegistry};
use crate::config::AssistConfig;
use crate::conversation::Message;
use crate::credentials::CredentialStore;
use crate::error::{Error, RequestError, UsageError};
use crate::llm::{
    AIResponse, AiTransport, ToolSchema, TransportError, TransportRequest, normalize_payload,
    prompt,
};

/// Map a transport failure onto the request taxonomy.
pub fn classify_transport_error(provider: &str, error: TransportError) -> RequestError {
    let provider = provider.to_string();
    match error {
        TransportError::Cancelled => RequestError::Aborted,
        TransportError::Status { status: 400, body } => RequestError::BadRequest { provider, body },
        TransportError::Status { status: 401, .. } => RequestError::CredentialMissing { provider },
        TransportError::Status { status: 429, .. } => RequestError::RateLimited { provider },
        TransportError::Status { status, .. } if (500..600).contains(&status) => {
            RequestError::ServerError { provider, status }
        }
        TransportError::Status { status, body } => RequestError::TransportUnknown {
            provider,
            reason: format!("HTTP {status}: {body}"),
        },
        TransportError::Network(reason) => RequestError::TransportUnknown { provider, reason },
    }
}

/// An admitted request holding the in-flight slot. Dropping it frees the slot.
pub struct PreparedRequest<'a> {
    orchestrator: &'a RequestOrchestrator,
    handle: CancelHandle,
    api_key: SecretString,
}

impl PreparedRequest<'_> {
    pub fn id(&self) -> Uuid {
        self.handle.id
    }
}

impl Drop for PreparedRequest<'_> {
    fn drop(&mut self) {
        self.orchestrator.settle(self.handle.id);
    }
}

pub struct RequestOrchestrator {
    transport: Arc<dyn AiTransport>,
    credentials: Arc<dyn CredentialStore>,
    registry: Arc<dyn CancellationRegistry>,
    tool: ToolSchema,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    /// Id of the token owned by the outstanding request.
    active: Mutex<Option<Uuid>>,
}

impl RequestOrchestrator {
    pub fn new(
        transport: Arc<dyn AiTransport>,
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<dyn CancellationRegistry>,
        config: &AssistConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            registry,
            tool: ToolSchema::assistant_reply(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(prompt::system_prompt),
            active: Mutex::new(None),
        }
    }

    fn provider(&self) -> &'static str {
        self.transport.backend().name()
    }

    pub fn is_in_flight(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Admit a request: claim the slot, resolve the credential, acquire a fresh token.
    ///
    /// Nothing is claimed when this fails.
    pub fn prepare(&self) -> Result<PreparedRequest<'_>, Error> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(UsageError::RequestInFlight.into());
        }

        let provider = self.provider();
        let api_key = self
            .credentials
            .get(provider)
            .ok_or_else(|| RequestError::CredentialMissing {
                provider: provider.to_string(),
            })?;

        let handle = self.registry.create();
        *active = Some(handle.id);
        debug!(request_id = %handle.id, provider, "Request admitted");

        Ok(PreparedRequest {
            orchestrator: self,
            handle,
            api_key,
        })
    }

    /// Send an admitted request with `context` and normalize the reply.
    pub async fn dispatch(
        &self,
        prepared: PreparedRequest<'_>,
        context: &[Message],
    ) -> Result<AIResponse, RequestError> {
        let provider = self.provider();
        let request_id = prepared.handle.id;
        let token = prepared.handle.token.clone();
        info!(
            %request_id,
            provider,
            model = %self.model,
            messages = context.len(),
            "Dispatching request"
        );

        let outcome = self
            .transport
            .complete(
                TransportRequest {
                    model: &self.model,
                    api_key: &prepared.api_key,
                    tool: &self.tool,
                    system_prompt: &self.system_prompt,
                    messages: context,
                    max_tokens: self.max_tokens,
                },
                token.clone(),
            )
            .await;

        // Anything that finished after abort() is discarded.
        let aborted = token.is_cancelled();
        drop(prepared);

        if aborted {
            info!(%request_id, "Request aborted");
            return Err(RequestError::Aborted);
        }

        let result = outcome
            .map_err(|e| classify_transport_error(provider, e))
            .and_then(|raw| {
                normalize_payload(self.transport.backend(), &raw).map_err(|reason| {
                    RequestError::MalformedResponse {
                        provider: provider.to_string(),
                        reason,
                    }
                })
            });

        match &result {
            Ok(response) => info!(
                %request_id,
                proposes_execution = response.proposes_execution(),
                "Request completed"
            ),
            Err(e) => warn!(%request_id, category = e.category().as_str(), error = %e, "Request failed"),
        }
        result
    }

    /// `prepare` followed by `dispatch`.
    pub async fn send(&self, context: &[Message]) -> Result<AIResponse, Error> {
        let prepared = self.prepare()?;
        Ok(self.dispatch(prepared, context).await?)
    }

    /// Cancel the outstanding request, if any. Returns whether there was one.
    pub fn abort(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match *active {
            Some(id) => {
                let cancelled = self.registry.cancel(id);
                info!(request_id = %id, cancelled, "Abort requested");
                cancelled
            }
            None => false,
        }
    }

    fn settle(&self, id: Uuid) {
        self.registry.release(id);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active == Some(id) {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::TokenRegistry;
    use crate::conversation::{ContentBlock, Role};
    use crate::credentials::MemoryCredentialStore;
    use crate::llm::LlmBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    fn payload() -> String {
        serde_json::json!({
            "content": [{
                "type": "tool_use",
                "name": crate::llm::schema::ASSISTANT_TOOL_NAME,
                "input": {
                    "thought_process": "",
                    "plan": [],
                    "user_confirmation_required": false,
                    "should_execute_code": false,
                    "execution": [],
                    "response": "hello"
                }
            }]
        })
        .to_string()
    }

    enum Behaviour {
        Reply(String),
        Fail(TransportError),
        /// Wait for cancellation.
        Hang,
        /// Wait for `release`, then reply even if cancelled.
        ReplyAfter(Arc<Notify>),
    }

    struct StubTransport {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubTransport {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AiTransport for StubTransport {
        fn backend(&self) -> LlmBackend {
            LlmBackend::Anthropic
        }

        async fn complete(
            &self,
            _request: TransportRequest<'_>,
            token: CancellationToken,
        ) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Reply(raw) => Ok(raw.clone()),
                Behaviour::Fail(e) => Err(e.clone()),
                Behaviour::Hang => {
                    token.cancelled().await;
                    Err(TransportError::Cancelled)
                }
                Behaviour::ReplyAfter(release) => {
                    release.notified().await;
                    Ok(payload())
                }
            }
        }
    }

    fn orchestrator(
        transport: Arc<StubTransport>,
        with_key: bool,
    ) -> (RequestOrchestrator, Arc<TokenRegistry>) {
        let credentials = MemoryCredentialStore::new();
        if with_key {
            credentials.set("anthropic", "sk-test");
        }
        let registry = Arc::new(TokenRegistry::new());
        let orch = RequestOrchestrator::new(
            transport,
            Arc::new(credentials),
            registry.clone(),
            &AssistConfig::default(),
        );
        (orch, registry)
    }

    fn context() -> Vec<Message> {
        vec![Message {
            role: Role::User,
            content: vec![ContentBlock::text("hi")],
        }]
    }

    #[tokio::test]
    async fn successful_send_normalizes_and_releases() {
        let transport = StubTransport::new(Behaviour::Reply(payload()));
        let (orch, registry) = orchestrator(transport.clone(), true);

        let response = orch.send(&context()).await.unwrap();
        assert_eq!(response.response, "hello");
        assert!(!orch.is_in_flight());
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_transport() {
        let transport = StubTransport::new(Behaviour::Reply(payload()));
        let (orch, registry) = orchestrator(transport.clone(), false);

        let err = orch.send(&context()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Request(RequestError::CredentialMissing { .. })
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(!orch.is_in_flight());
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test]
    async fn second_send_is_rejected_while_in_flight() {
        let transport = StubTransport::new(Behaviour::Hang);
        let (orch, _) = orchestrator(transport.clone(), true);

        let first = orch.prepare().unwrap();
        assert!(orch.is_in_flight());
        assert!(matches!(
            orch.prepare(),
            Err(Error::Usage(UsageError::RequestInFlight))
        ));

        drop(first);
        assert!(!orch.is_in_flight());
        assert!(orch.prepare().is_ok());
    }

    #[tokio::test]
    async fn abort_resolves_aborted() {
        let transport = StubTransport::new(Behaviour::Hang);
        let (orch, registry) = orchestrator(transport, true);

        let prepared = orch.prepare().unwrap();
        let ctx = context();
        let (result, aborted) = tokio::join!(orch.dispatch(prepared, &ctx), async {
            tokio::task::yield_now().await;
            orch.abort()
        });

        assert!(aborted);
        assert!(matches!(result, Err(RequestError::Aborted)));
        assert!(!orch.is_in_flight());
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test]
    async fn reply_racing_abort_is_discarded() {
        let release = Arc::new(Notify::new());
        let transport = StubTransport::new(Behaviour::ReplyAfter(release.clone()));
        let (orch, _) = orchestrator(transport, true);

        let prepared = orch.prepare().unwrap();
        let ctx = context();
        let (result, _) = tokio::join!(orch.dispatch(prepared, &ctx), async {
            tokio::task::yield_now().await;
            orch.abort();
            release.notify_one();
        });

        assert!(matches!(result, Err(RequestError::Aborted)));
    }

    #[tokio::test]
    async fn abort_without_request_is_noop() {
        let (orch, _) = orchestrator(StubTransport::new(Behaviour::Hang), true);
        assert!(!orch.abort());
    }

    #[tokio::test]
    async fn malformed_payload() {
        let transport = StubTransport::new(Behaviour::Reply(r#"{"content": []}"#.into()));
        let (orch, registry) = orchestrator(transport, true);

        let err = orch.send(&context()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Request(RequestError::MalformedResponse { .. })
        ));
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test]
    async fn transport_failure_releases_token() {
        let transport = StubTransport::new(Behaviour::Fail(TransportError::Status {
            status: 503,
            body: "overloaded".into(),
        }));
        let (orch, registry) = orchestrator(transport, true);

        let err = orch.send(&context()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Request(RequestError::ServerError { status: 503, .. })
        ));
        assert!(!orch.is_in_flight());
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn status_mapping() {
        let status = |status: u16| TransportError::Status {
            status,
            body: "x".into(),
        };
        assert!(matches!(
            classify_transport_error("p", status(400)),
            RequestError::BadRequest { .. }
        ));
        assert!(matches!(
            classify_transport_error("p", status(401)),
            RequestError::CredentialMissing { .. }
        ));
        assert!(matches!(
            classify_transport_error("p", status(429)),
            RequestError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_transport_error("p", status(500)),
            RequestError::ServerError { status: 500, .. }
        ));
        assert!(matches!(
            classify_transport_error("p", status(404)),
            RequestError::TransportUnknown { .. }
        ));
        assert!(matches!(
            classify_transport_error("p", TransportError::Network("dns".into())),
            RequestError::TransportUnknown { .. }
        ));
        assert!(matches!(
            classify_transport_error("p", TransportError::Cancelled),
            RequestError::Aborted
        ));
    }
}
