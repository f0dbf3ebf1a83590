//! Defines the public-facing `Client` struct, its builder, and its API methods.

use crate::{
    error::{Error, Result},
    interaction::{check_elicit_result, ElicitCallback, RootsCallback, SampleCallback},
    network_adapter::NetworkAdapter,
    session::{Session, SessionConfig, SessionRole},
    types::{
        methods, CallToolParams, CallToolResult, ClientCapabilities, CompleteParams, CompleteResult,
        Completion, CompletionArgument, CompletionContext, CompletionReference, CreateMessageParams,
        CreateMessageResult, ElicitRequestParams, ElicitResult, EmptyCapability, EmptyParams,
        GetPromptParams, GetPromptResult, Implementation, InitializeRequestParams, InitializeResult,
        ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListRootsResult,
        ListToolsResult, LogLevel, LoggingMessageParams, ProgressParams, Prompt, ReadResourceParams,
        ReadResourceResult, Resource, ResourceTemplate, Root, RootsCapability, SetLevelParams, Tool,
        LATEST_PROTOCOL_VERSION,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type ProgressObserver = Arc<dyn Fn(ProgressParams) + Send + Sync>;
type LogObserver = Arc<dyn Fn(LoggingMessageParams) + Send + Sync>;

/// Configures the callbacks a `Client` answers server-initiated requests with.
///
/// A capability is advertised during `initialize` only if its callback is
/// registered, so a server never sends a sub-request the client cannot answer.
pub struct ClientBuilder {
    client_info: Implementation,
    config: SessionConfig,
    elicit: Option<ElicitCallback>,
    sample: Option<SampleCallback>,
    roots: Option<RootsCallback>,
    on_progress: Option<ProgressObserver>,
    on_log: Option<LogObserver>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: "docmcp-client".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            config: SessionConfig::default(),
            elicit: None,
            sample: None,
            roots: None,
            on_progress: None,
            on_log: None,
        }
    }
}

impl ClientBuilder {
    pub fn client_info(mut self, name: &str, version: &str) -> Self {
        self.client_info = Implementation {
            name: name.to_string(),
            version: version.to_string(),
        };
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Answers `elicitation/create`. An `accept` returned by the callback is checked
    /// against the requested schema before it is sent back.
    pub fn on_elicit<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ElicitRequestParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ElicitResult>> + Send + 'static,
    {
        self.elicit = Some(Arc::new(move |params| Box::pin(callback(params))));
        self
    }

    /// Answers `sampling/createMessage`.
    pub fn on_sample<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(CreateMessageParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CreateMessageResult>> + Send + 'static,
    {
        self.sample = Some(Arc::new(move |params| Box::pin(callback(params))));
        self
    }

    /// Answers `roots/list`.
    pub fn on_list_roots<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ListRootsResult>> + Send + 'static,
    {
        self.roots = Some(Arc::new(move || Box::pin(callback())));
        self
    }

    /// Answers `roots/list` with a fixed set of roots.
    pub fn with_roots(self, roots: Vec<Root>) -> Self {
        self.on_list_roots(move || {
            let roots = roots.clone();
            async move { Ok(ListRootsResult { roots }) }
        })
    }

    /// Observes `notifications/progress` for calls made by this client.
    pub fn on_progress<F>(mut self, observer: F) -> Self
    where
        F: Fn(ProgressParams) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(observer));
        self
    }

    /// Observes `notifications/message` log entries sent by the server.
    pub fn on_log<F>(mut self, observer: F) -> Self
    where
        F: Fn(LoggingMessageParams) + Send + Sync + 'static,
    {
        self.on_log = Some(Arc::new(observer));
        self
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            elicitation: self.elicit.as_ref().map(|_| EmptyCapability {}),
            sampling: self.sample.as_ref().map(|_| EmptyCapability {}),
            roots: self.roots.as_ref().map(|_| RootsCapability {
                list_changed: Some(false),
            }),
        }
    }

    fn register(&self, session: &Session) {
        session.register_request_handler(methods::PING, |_ctx, _params| async {
            Ok(Value::Object(Default::default()))
        });

        if let Some(elicit) = self.elicit.clone() {
            session.register_request_handler(methods::ELICITATION_CREATE, move |_ctx, params| {
                let elicit = elicit.clone();
                async move {
                    let params: ElicitRequestParams = decode(params)?;
                    let schema = params.requested_schema.clone();
                    let result = elicit(params).await?;
                    let result = check_elicit_result(&schema, result).inspect_err(|e| {
                        warn!("[Client] Refusing to send malformed elicitation result: {}", e);
                    })?;
                    Ok(serde_json::to_value(result)?)
                }
            });
        }
        if let Some(sample) = self.sample.clone() {
            session.register_request_handler(methods::SAMPLING_CREATE_MESSAGE, move |_ctx, params| {
                let sample = sample.clone();
                async move {
                    let params: CreateMessageParams = decode(params)?;
                    Ok(serde_json::to_value(sample(params).await?)?)
                }
            });
        }
        if let Some(roots) = self.roots.clone() {
            session.register_request_handler(methods::ROOTS_LIST, move |_ctx, _params| {
                let roots = roots.clone();
                async move { Ok(serde_json::to_value(roots().await?)?) }
            });
        }

        if let Some(observer) = self.on_progress.clone() {
            session.register_notification_handler(methods::PROGRESS, move |params| {
                match serde_json::from_value::<ProgressParams>(params) {
                    Ok(progress) => observer(progress),
                    Err(e) => warn!("[Client] Failed to deserialize progress notification: {}", e),
                }
            });
        }
        if let Some(observer) = self.on_log.clone() {
            session.register_notification_handler(methods::MESSAGE, move |params| {
                match serde_json::from_value::<LoggingMessageParams>(params) {
                    Ok(message) => observer(message),
                    Err(e) => warn!("[Client] Failed to deserialize log notification: {}", e),
                }
            });
        }
    }

    /// Starts the session on `adapter` and performs the `initialize` handshake.
    pub async fn connect<A: NetworkAdapter>(self, adapter: A) -> Result<Client> {
        let session = Session::new(SessionRole::Client, self.config.clone());
        self.register(&session);
        let driver = session.spawn(adapter);

        let init_params = InitializeRequestParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities(),
            client_info: self.client_info.clone(),
        };
        let handshake = async {
            let raw = session
                .invoke(methods::INITIALIZE, serde_json::to_value(init_params)?)
                .await?;
            let result: InitializeResult = serde_json::from_value(raw)?;
            session.notify(methods::INITIALIZED, Value::Null)?;
            Ok::<_, Error>(result)
        };
        let server_info = match handshake.await {
            Ok(result) => result,
            Err(e) => {
                session.close();
                driver.abort();
                return Err(e);
            }
        };

        info!(
            "[Client] Handshake successful. Server: {} {}",
            server_info.server_info.name, server_info.server_info.version
        );
        Ok(Client {
            session,
            driver,
            server_info,
        })
    }
}

fn decode<P: DeserializeOwned>(params: Value) -> Result<P> {
    serde_json::from_value(params).map_err(|e| Error::Malformed(format!("invalid params: {}", e)))
}

/// A high-level, asynchronous client for a docmcp server.
///
/// The `Client` drives its connection in a background task. Requests the server
/// sends back while one of our calls is in flight (elicitation, sampling, roots)
/// are answered by the callbacks registered on the [`ClientBuilder`].
///
/// # Example
///
/// ```no_run
/// use docmcp::client::Client;
/// use docmcp::network_adapter::NdjsonAdapter;
/// use docmcp::types::{CreateMessageResult, Content, Role};
/// use docmcp::Result;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let adapter = NdjsonAdapter::connect("127.0.0.1:8080").await?;
///     let client = Client::builder()
///         .on_sample(|_params| async {
///             Ok(CreateMessageResult {
///                 role: Role::Assistant,
///                 content: Content::text("Once upon a time..."),
///                 model: "mock".to_string(),
///                 stop_reason: None,
///             })
///         })
///         .connect(adapter)
///         .await?;
///
///     let story = client.call_tool("create_story", json!({ "topic": "rust" })).await?;
///     println!("{}", story.text_content());
///
///     // The client closes the session when it goes out of scope.
///     Ok(())
/// }
/// ```
pub struct Client {
    session: Session,
    driver: JoinHandle<Result<()>>,
    server_info: InitializeResult,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Connects without any interaction callbacks.
    pub async fn connect<A: NetworkAdapter>(adapter: A) -> Result<Self> {
        ClientBuilder::default().connect(adapter).await
    }

    /// The server's answer to `initialize`.
    pub fn server_info(&self) -> &InitializeResult {
        &self.server_info
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn send_request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let raw = self.session.invoke(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(raw)?)
    }

    // --- Public API Methods ---

    pub async fn ping(&self) -> Result<()> {
        let _: Value = self.send_request(methods::PING, EmptyParams {}).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.send_request(methods::TOOLS_LIST, EmptyParams {}).await?;
        Ok(result.tools)
    }

    /// Calls a tool. The request carries a progress token, so progress the tool
    /// reports reaches the `on_progress` observer.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.call_tool_inner(name, arguments, None).await
    }

    /// Like `call_tool`, but gives up after `timeout` and tells the server to stop.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<CallToolResult> {
        self.call_tool_inner(name, arguments, Some(timeout)).await
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<CallToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        debug!("[Client] Calling tool '{}'", name);
        let raw = self
            .session
            .invoke_with_progress(methods::TOOLS_CALL, params, timeout)
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let result: ListResourcesResult =
            self.send_request(methods::RESOURCES_LIST, EmptyParams {}).await?;
        Ok(result.resources)
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        let result: ListResourceTemplatesResult = self
            .send_request(methods::RESOURCES_TEMPLATES_LIST, EmptyParams {})
            .await?;
        Ok(result.resource_templates)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.send_request(
            methods::RESOURCES_READ,
            ReadResourceParams {
                uri: uri.to_string(),
            },
        )
        .await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        let result: ListPromptsResult = self
            .send_request(methods::PROMPTS_LIST, EmptyParams {})
            .await?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        self.send_request(
            methods::PROMPTS_GET,
            GetPromptParams {
                name: name.to_string(),
                arguments: Some(arguments),
            },
        )
        .await
    }

    /// Asks for completions of `argument`, given what has been typed so far and any
    /// sibling arguments already chosen.
    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument: &str,
        value: &str,
        context: HashMap<String, String>,
    ) -> Result<Completion> {
        let params = CompleteParams {
            reference,
            argument: CompletionArgument {
                name: argument.to_string(),
                value: value.to_string(),
            },
            context: (!context.is_empty()).then_some(CompletionContext {
                arguments: Some(context),
            }),
        };
        let result: CompleteResult = self.send_request(methods::COMPLETION_COMPLETE, params).await?;
        Ok(result.completion)
    }

    /// Sets the minimum severity of log notifications the server sends.
    pub async fn set_log_level(&self, level: LogLevel) -> Result<()> {
        let _: Value = self
            .send_request(methods::LOGGING_SET_LEVEL, SetLevelParams { level })
            .await?;
        Ok(())
    }

    /// Closes the session. Calls still waiting fail with `Error::Cancelled`.
    pub fn close(&self) {
        self.session.close();
    }
}

impl Drop for Client {
    /// Ensures the background connection task is terminated when the `Client` is dropped.
    fn drop(&mut self) {
        self.session.close();
        self.driver.abort();
    }
}
