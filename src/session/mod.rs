//! The bidirectional session shared by both ends of a connection.
//!
//! A `Session` multiplexes everything that travels over one connection: requests it
//! sends and awaits, requests it receives and answers, and notifications in both
//! directions. A single dispatch task reads frames in arrival order. Responses are
//! matched against the correlation table, notifications run inline, and each
//! inbound request executes in its own task so that a handler waiting on a nested
//! request to the peer never blocks the reader.

pub mod context;
pub mod correlation;
pub mod inflight;

pub use context::RequestContext;
pub use correlation::{CorrelationTable, OutstandingRequest, PendingGuard};
pub use inflight::{CallState, PendingCall};

use crate::envelope::{Envelope, Undecodable};
use crate::error::{Error, Result};
use crate::network_adapter::NetworkAdapter;
use crate::protocol::ProtocolConnection;
use crate::types::{
    methods, CancelledParams, ClientCapabilities, ErrorData, ErrorResponse, LogLevel,
    Notification, ProgressToken, Request, RequestId, Response, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND,
};
use dashmap::DashMap;
use inflight::InflightTable;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Type alias for the boxed futures returned by handlers and callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type RequestHandler =
    Arc<dyn Fn(RequestContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
pub(crate) type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Client,
    Server,
}

impl SessionRole {
    fn label(&self) -> &'static str {
        match self {
            SessionRole::Client => "Client",
            SessionRole::Server => "Server",
        }
    }
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the queue of frames waiting to be written to the transport.
    pub outbound_capacity: usize,
    /// Default timeout applied to every `invoke`. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 32,
            request_timeout: None,
        }
    }
}

impl SessionConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }
}

pub(crate) struct CallOptions {
    pub parent: Option<RequestId>,
    pub timeout: Option<Duration>,
    pub progress: bool,
}

struct Shared {
    role: SessionRole,
    config: SessionConfig,
    next_id: AtomicI64,
    outbound: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    pending: CorrelationTable,
    inflight: InflightTable,
    request_handlers: DashMap<String, RequestHandler>,
    notification_handlers: DashMap<String, NotificationHandler>,
    shutdown: Notify,
    closed: AtomicBool,
    peer_capabilities: OnceLock<ClientCapabilities>,
    log_level: watch::Sender<LogLevel>,
}

/// One logical connection. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

/// Unlinks a sub-request from its parent call however the awaiting future ends.
struct SubRequestLink {
    inflight: InflightTable,
    parent: RequestId,
    child: RequestId,
}

impl Drop for SubRequestLink {
    fn drop(&mut self) {
        self.inflight.remove_sub_request(&self.parent, &self.child);
    }
}

impl Session {
    pub fn new(role: SessionRole, config: SessionConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (log_level, _) = watch::channel(LogLevel::Debug);
        Self {
            shared: Arc::new(Shared {
                role,
                config,
                next_id: AtomicI64::new(1),
                outbound,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                pending: CorrelationTable::new(),
                inflight: InflightTable::default(),
                request_handlers: DashMap::new(),
                notification_handlers: DashMap::new(),
                shutdown: Notify::new(),
                closed: AtomicBool::new(false),
                peer_capabilities: OnceLock::new(),
                log_level,
            }),
        }
    }

    pub fn role(&self) -> SessionRole {
        self.shared.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Registers the handler for an inbound request method, replacing any previous one.
    pub fn register_request_handler<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |ctx, params| Box::pin(handler(ctx, params)));
        self.shared
            .request_handlers
            .insert(method.to_string(), handler);
    }

    /// Registers the handler for an inbound notification method, replacing any previous one.
    /// Notification handlers run on the dispatch task, in arrival order.
    pub fn register_notification_handler<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.shared
            .notification_handlers
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Sends a request and waits for its response.
    ///
    /// Fails with `Error::Remote` if the peer answers with an error, and with
    /// `Error::Cancelled` if the session closes first.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value> {
        self.call(
            method,
            params,
            CallOptions {
                parent: None,
                timeout: self.shared.config.request_timeout,
                progress: false,
            },
        )
        .await
    }

    /// Like `invoke`, but gives up after `timeout`. On expiry the peer is told to stop
    /// working on the request and `Error::Timeout` is returned.
    pub async fn invoke_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        self.call(
            method,
            params,
            CallOptions {
                parent: None,
                timeout: Some(timeout),
                progress: false,
            },
        )
        .await
    }

    /// Like `invoke`, but attaches a progress token equal to the request id so that the
    /// peer can stream `notifications/progress` for it.
    pub async fn invoke_with_progress(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.call(
            method,
            params,
            CallOptions {
                parent: None,
                timeout: timeout.or(self.shared.config.request_timeout),
                progress: true,
            },
        )
        .await
    }

    pub(crate) async fn call(
        &self,
        method: &str,
        mut params: Value,
        options: CallOptions,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::Cancelled);
        }
        let id = RequestId::Num(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        if options.progress {
            attach_progress_token(&mut params, &id);
        }

        let (guard, rx) = self
            .shared
            .pending
            .register(id.clone(), method, options.parent.clone())?;
        let _link = options.parent.map(|parent| {
            self.shared.inflight.add_sub_request(&parent, &id);
            SubRequestLink {
                inflight: self.shared.inflight.clone(),
                parent,
                child: id.clone(),
            }
        });

        let frame = serde_json::to_string(&Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.clone(),
            method: method.to_string(),
            params,
        })?;
        debug!(
            "[{}] -> {} (id {})",
            self.shared.role.label(),
            method,
            id
        );
        self.shared
            .outbound
            .send(frame)
            .await
            .map_err(|_| Error::Cancelled)?;

        let outcome = match options.timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    drop(guard);
                    warn!(
                        "[{}] Request {} ({}) timed out after {:?}",
                        self.shared.role.label(),
                        id,
                        method,
                        limit
                    );
                    let cancelled = CancelledParams {
                        request_id: id,
                        reason: Some("request timed out".to_string()),
                    };
                    if let Ok(params) = serde_json::to_value(cancelled) {
                        let _ = self.notify(methods::CANCELLED, params);
                    }
                    return Err(Error::Timeout);
                }
            },
        };
        drop(guard);
        outcome.unwrap_or(Err(Error::Cancelled))
    }

    /// Queues a notification without waiting. Delivery is best effort: the frame is
    /// dropped if the session is closed or the outbound queue is full.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Cancelled);
        }
        let frame = serde_json::to_string(&Notification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: (!params.is_null()).then_some(params),
        })?;
        self.shared.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(
                    "[{}] Outbound queue full, dropping {} notification",
                    self.shared.role.label(),
                    method
                );
                Error::Other("outbound queue full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => Error::ChannelClosed,
        })
    }

    /// Tears the session down. Every pending `invoke` fails with `Cancelled`, every
    /// inbound call is aborted, and the dispatch loop stops. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = self.shared.pending.cancel_all();
        let aborted = self.shared.inflight.abort_all();
        self.shared.shutdown.notify_one();
        info!(
            "[{}] Session closed ({} pending requests cancelled, {} calls aborted)",
            self.shared.role.label(),
            drained,
            aborted
        );
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Requests this endpoint has sent and not yet seen answered.
    pub fn outstanding_requests(&self) -> Vec<OutstandingRequest> {
        self.shared.pending.snapshot()
    }

    /// Inbound requests currently executing on this endpoint.
    pub fn pending_calls(&self) -> Vec<PendingCall> {
        self.shared.inflight.snapshot()
    }

    pub fn peer_capabilities(&self) -> Option<&ClientCapabilities> {
        self.shared.peer_capabilities.get()
    }

    /// Records what the peer advertised during `initialize`. Only the first call wins.
    pub fn set_peer_capabilities(&self, capabilities: ClientCapabilities) -> bool {
        self.shared.peer_capabilities.set(capabilities).is_ok()
    }

    pub fn log_level(&self) -> LogLevel {
        *self.shared.log_level.borrow()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.shared.log_level.send_replace(level);
    }

    /// Runs the dispatch loop on the current task until the transport closes or the
    /// session is closed. A session can be run only once.
    pub async fn run<A: NetworkAdapter>(&self, adapter: A) -> Result<()> {
        let taken = self
            .shared
            .outbound_rx
            .lock()
            .map(|mut slot| slot.take())
            .unwrap_or(None);
        let Some(mut outbound_rx) = taken else {
            return Err(Error::Other("session is already running".to_string()));
        };
        let mut connection = ProtocolConnection::new(adapter);
        let label = self.shared.role.label();
        info!("[{}] Session started", label);

        let result = loop {
            if self.is_closed() {
                break Ok(());
            }
            tokio::select! {
                biased;

                _ = self.shared.shutdown.notified() => {
                    break Ok(());
                }
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = connection.send_raw(&frame).await {
                        error!("[{}] Error writing message: {}", label, e);
                        break Err(e);
                    }
                }
                incoming = connection.recv_envelope() => {
                    match incoming {
                        Ok(Some(Ok(envelope))) => {
                            if let Err(e) = self.route(envelope, &mut connection).await {
                                error!("[{}] Error writing message: {}", label, e);
                                break Err(e);
                            }
                        }
                        Ok(Some(Err(undecodable))) => {
                            if let Err(e) = self.reject(undecodable, &mut connection).await {
                                error!("[{}] Error writing message: {}", label, e);
                                break Err(e);
                            }
                        }
                        Ok(None) => {
                            info!("[{}] Connection closed by peer.", label);
                            break Ok(());
                        }
                        Err(e) => {
                            error!("[{}] Error reading message: {}", label, e);
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.close();
        result
    }

    /// Runs the dispatch loop on a new task.
    pub fn spawn<A: NetworkAdapter>(&self, adapter: A) -> JoinHandle<Result<()>> {
        let session = self.clone();
        tokio::spawn(async move { session.run(adapter).await })
    }

    async fn route<A: NetworkAdapter>(
        &self,
        envelope: Envelope,
        connection: &mut ProtocolConnection<A>,
    ) -> Result<()> {
        match envelope {
            Envelope::Response { id, result } => {
                if !self.shared.pending.resolve(&id, Ok(result)) {
                    debug!(
                        "[{}] Ignoring response for unknown id {}",
                        self.shared.role.label(),
                        id
                    );
                }
            }
            Envelope::Error { id, error } => {
                if !self.shared.pending.resolve(&id, Err(Error::Remote(error))) {
                    debug!(
                        "[{}] Ignoring error for unknown id {}",
                        self.shared.role.label(),
                        id
                    );
                }
            }
            Envelope::Notification { method, params } => {
                self.handle_notification(&method, params)
            }
            Envelope::Request { id, method, params } => {
                let handler = self
                    .shared
                    .request_handlers
                    .get(&method)
                    .map(|h| Arc::clone(h.value()));
                let Some(handler) = handler else {
                    warn!(
                        "[{}] No handler for method '{}'",
                        self.shared.role.label(),
                        method
                    );
                    let data =
                        ErrorData::new(METHOD_NOT_FOUND, format!("Method not found: {}", method));
                    return connection.send_serializable(error_response(id, data)).await;
                };
                if !self.shared.inflight.begin(&id, &method) {
                    let data = ErrorData::new(
                        INVALID_REQUEST,
                        format!("Request id {} is already in flight", id),
                    );
                    return connection.send_serializable(error_response(id, data)).await;
                }
                self.spawn_call(id, method, params, handler);
            }
        }
        Ok(())
    }

    /// Answers a frame that failed to decode. A malformed request gets an
    /// `INVALID_REQUEST` error; a malformed reply fails the `invoke` awaiting it.
    /// Frames without a usable id can only be logged.
    async fn reject<A: NetworkAdapter>(
        &self,
        frame: Undecodable,
        connection: &mut ProtocolConnection<A>,
    ) -> Result<()> {
        let label = self.shared.role.label();
        let Undecodable {
            id,
            has_method,
            error,
        } = frame;
        match id {
            Some(id) if has_method => {
                warn!("[{}] Rejecting malformed request {}: {}", label, id, error);
                let data = ErrorData::new(INVALID_REQUEST, error.to_string());
                connection.send_serializable(error_response(id, data)).await
            }
            Some(id) => {
                warn!("[{}] Malformed reply to request {}: {}", label, id, error);
                if !self.shared.pending.resolve(&id, Err(error)) {
                    debug!("[{}] Ignoring malformed reply for unknown id {}", label, id);
                }
                Ok(())
            }
            None => {
                warn!("[{}] Dropping undecodable message: {}", label, error);
                Ok(())
            }
        }
    }

    fn handle_notification(&self, method: &str, params: Value) {
        if method == methods::CANCELLED {
            match serde_json::from_value::<CancelledParams>(params) {
                Ok(cancelled) => {
                    if self.shared.inflight.cancel(&cancelled.request_id) {
                        info!(
                            "[{}] Peer cancelled request {}: {}",
                            self.shared.role.label(),
                            cancelled.request_id,
                            cancelled.reason.as_deref().unwrap_or("no reason given")
                        );
                    }
                }
                Err(e) => warn!("[{}] Malformed cancellation: {}", self.shared.role.label(), e),
            }
            return;
        }
        if self.is_closed() {
            return;
        }
        let handler = self
            .shared
            .notification_handlers
            .get(method)
            .map(|h| Arc::clone(h.value()));
        match handler {
            Some(handler) => handler(params),
            None => debug!(
                "[{}] Received unhandled notification: {}",
                self.shared.role.label(),
                method
            ),
        }
    }

    /// Runs one inbound request. The handler executes in its own task; a supervising
    /// task turns its outcome, including a panic, into exactly one response. A call
    /// cancelled by the peer or by `close` gets no response.
    fn spawn_call(&self, id: RequestId, method: String, params: Value, handler: RequestHandler) {
        let ctx = RequestContext::new(
            self.clone(),
            id.clone(),
            method.clone(),
            progress_token(&params),
        );
        let inner = tokio::spawn(handler(ctx, params));
        self.shared.inflight.attach(&id, inner.abort_handle());

        let session = self.clone();
        tokio::spawn(async move {
            let label = session.shared.role.label();
            let outcome = match inner.await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_cancelled() => {
                    debug!("[{}] Call {} ({}) was cancelled", label, id, method);
                    return;
                }
                Err(join_error) => {
                    error!("[{}] Handler for '{}' panicked: {}", label, method, join_error);
                    Err(Error::Other(format!("handler for '{}' panicked", method)))
                }
            };
            if !session.shared.inflight.finish(&id) {
                return;
            }
            let frame = match outcome {
                Ok(result) => serde_json::to_string(&Response {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id: id.clone(),
                    result,
                }),
                Err(e) => {
                    debug!("[{}] Call {} ({}) failed: {}", label, id, method, e);
                    serde_json::to_string(&error_response(id.clone(), e.to_error_data()))
                }
            };
            match frame {
                Ok(frame) => {
                    if session.shared.outbound.send(frame).await.is_err() {
                        debug!("[{}] Session closed before response to {} was sent", label, id);
                    }
                }
                Err(e) => error!("[{}] Failed to serialize response to {}: {}", label, id, e),
            }
        });
    }
}

fn error_response(id: RequestId, error: ErrorData) -> ErrorResponse {
    ErrorResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        error,
    }
}

fn progress_token(params: &Value) -> Option<ProgressToken> {
    params
        .get("_meta")
        .and_then(|meta| meta.get("progressToken"))
        .and_then(|token| serde_json::from_value(token.clone()).ok())
}

fn attach_progress_token(params: &mut Value, id: &RequestId) {
    if !params.is_object() {
        *params = json!({});
    }
    if let Some(obj) = params.as_object_mut() {
        let meta = obj.entry("_meta").or_insert_with(|| json!({}));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("progressToken".to_string(), json!(id));
        }
    }
}
