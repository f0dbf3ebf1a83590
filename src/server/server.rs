//! Defines the main `Server` struct and its builder API for setting up handlers.

use super::session::ServerSession;
use crate::{
    completion::CompletionCatalog,
    error::{Error, Result},
    network_adapter::NetworkAdapter,
    session::{BoxFuture, RequestContext, SessionConfig},
    types::{
        CallToolResult, EmptyCapability, GetPromptResult, Implementation, Prompt,
        PromptsCapability, ReadResourceResult, Resource, ResourceTemplate, ResourcesCapability,
        ServerCapabilities, Tool, ToolsCapability,
    },
    uri_template::UriTemplate,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::{future::Future, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

// --- Handler Type Definitions ---

pub(crate) type ToolHandler =
    Arc<dyn Fn(RequestContext, Value) -> BoxFuture<'static, Result<CallToolResult>> + Send + Sync>;
pub(crate) type ResourceHandler = Arc<
    dyn Fn(RequestContext, String) -> BoxFuture<'static, Result<ReadResourceResult>> + Send + Sync,
>;
#[allow(clippy::type_complexity)]
pub(crate) type TemplateHandler = Arc<
    dyn Fn(
            RequestContext,
            String,
            HashMap<String, String>,
        ) -> BoxFuture<'static, Result<ReadResourceResult>>
        + Send
        + Sync,
>;
pub(crate) type PromptHandler = Arc<
    dyn Fn(RequestContext, HashMap<String, String>) -> BoxFuture<'static, Result<GetPromptResult>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub(crate) struct TemplateEntry {
    pub(crate) template: ResourceTemplate,
    pub(crate) matcher: UriTemplate,
    pub(crate) handler: TemplateHandler,
}

/// A high-level, asynchronous server exposing tools, resources, prompts and completions.
///
/// This struct uses a builder pattern to register handlers. After configuration,
/// [`Self::handle_connection`] serves a single adapter, and [`Self::tcp_listen`]
/// accepts TCP connections, spawning a new task for each client.
///
/// Tool handlers receive a [`RequestContext`], through which they can report
/// progress, emit log messages, and ask the caller to elicit input, sample a
/// message, or list its roots.
///
/// # Example
///
/// ```no_run
/// use docmcp::server::Server;
/// use docmcp::types::{CallToolResult, Tool};
/// use docmcp::network_adapter::NdjsonAdapter;
/// use docmcp::Result;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let server = Server::new("test").register_tool(
///         Tool {
///             name: "test-tool".to_string(),
///             ..Default::default()
///         },
///         |ctx, _args| async move {
///             ctx.info("working");
///             Ok(CallToolResult::text("Success!"))
///         },
///     );
///
///     // This runs forever, handling connections until the process is stopped.
///     server.tcp_listen::<NdjsonAdapter>("127.0.0.1:8080").await?;
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone)]
pub struct Server {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) instructions: Option<String>,
    // tool name -> (metadata, handler); ordered so tools/list is stable
    pub(crate) tools: BTreeMap<String, (Tool, ToolHandler)>,
    pub(crate) resources: BTreeMap<String, (Resource, ResourceHandler)>,
    pub(crate) templates: Vec<TemplateEntry>,
    pub(crate) prompts: BTreeMap<String, (Prompt, PromptHandler)>,
    pub(crate) completions: CompletionCatalog,
    pub(crate) config: SessionConfig,
}

impl Server {
    /// Creates a new `Server` builder.
    ///
    /// # Arguments
    ///
    /// * `name` - A name for the server implementation, e.g., "DocumentMCP". This
    ///   is sent to the client during the initialization handshake.
    pub fn new(name: &str) -> Self {
        Server {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Text returned to the client in the `initialize` result.
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_completions(mut self, catalog: CompletionCatalog) -> Self {
        self.completions = catalog;
        self
    }

    pub fn info(&self) -> Implementation {
        Implementation {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Capabilities advertised in the `initialize` result, derived from what is registered.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            resources: (!self.resources.is_empty() || !self.templates.is_empty())
                .then(ResourcesCapability::default),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
            completions: (!self.completions.is_empty()).then_some(EmptyCapability {}),
            logging: Some(EmptyCapability {}),
        }
    }

    /// Registers a tool, its metadata, and its execution handler at the same time.
    pub fn register_tool<F, Fut>(mut self, tool: Tool, handler: F) -> Self
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.tools.insert(tool.name.clone(), (tool, handler));
        self
    }

    /// Registers a tool with a handler that accepts strongly-typed arguments.
    ///
    /// The `tool` definition should be created with `Tool::from_args::<Args>()`, where
    /// `Args` derives `docmcp::Schema` (which provides the schema) and
    /// `serde::Deserialize`.
    ///
    /// If the client's arguments do not deserialize into `Args`, an error
    /// `CallToolResult` describing the expected schema is returned and the handler
    /// is not called.
    ///
    /// # Example
    ///
    /// ```rust
    /// use docmcp::server::Server;
    /// use docmcp::session::RequestContext;
    /// use docmcp::types::{CallToolResult, Tool};
    /// use docmcp::{Result as SdkResult, Schema};
    /// use serde::Deserialize;
    ///
    /// #[derive(Schema, Deserialize)]
    /// struct EchoArgs {
    ///     #[schema(desc = "A message to echo.")]
    ///     message: String,
    ///     repeat: Option<i32>,
    /// }
    ///
    /// async fn echo(_ctx: RequestContext, args: EchoArgs) -> SdkResult<CallToolResult> {
    ///     Ok(CallToolResult::text(args.message.repeat(args.repeat.unwrap_or(1) as usize)))
    /// }
    ///
    /// let tool = Tool::from_args::<EchoArgs>("echo", Some("Echoes a message."));
    /// let server = Server::new("my-server").register_tool_typed(tool, echo);
    /// ```
    pub fn register_tool_typed<Args, Fut, F>(self, tool: Tool, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
        F: Fn(RequestContext, Args) -> Fut + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let tool_name = tool.name.clone();
        let input_schema = tool.input_schema.clone();

        self.register_tool(tool, move |ctx, args| {
            let handler = Arc::clone(&handler);
            let tool_name = tool_name.clone();
            let input_schema = input_schema.clone();
            async move {
                match serde_json::from_value::<Args>(args) {
                    Ok(typed_args) => handler(ctx, typed_args).await,
                    Err(e) => {
                        error!(
                            tool_name = %tool_name,
                            error = %e,
                            "Failed to deserialize arguments for tool"
                        );
                        Ok(CallToolResult::error(format!(
                            "Invalid arguments for tool '{}': {}. Expected schema: {}",
                            tool_name,
                            e,
                            serde_json::to_string_pretty(&input_schema).unwrap_or_default()
                        )))
                    }
                }
            }
        })
    }

    /// Registers a resource with a fixed URI.
    pub fn register_resource<F, Fut>(mut self, resource: Resource, handler: F) -> Self
    where
        F: Fn(RequestContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult>> + Send + 'static,
    {
        let handler: ResourceHandler = Arc::new(move |ctx, uri| Box::pin(handler(ctx, uri)));
        self.resources
            .insert(resource.uri.clone(), (resource, handler));
        self
    }

    /// Registers a family of resources addressed by a URI template. The handler
    /// receives the concrete URI and the variables bound from it.
    ///
    /// A template that does not parse is logged and not registered.
    pub fn register_resource_template<F, Fut>(
        mut self,
        template: ResourceTemplate,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestContext, String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult>> + Send + 'static,
    {
        let matcher = match UriTemplate::parse(&template.uri_template) {
            Ok(matcher) => matcher,
            Err(e) => {
                error!("[Server] Skipping resource template '{}': {}", template.uri_template, e);
                return self;
            }
        };
        let handler: TemplateHandler =
            Arc::new(move |ctx, uri, vars| Box::pin(handler(ctx, uri, vars)));
        self.templates
            .retain(|entry| entry.template.uri_template != template.uri_template);
        self.templates.push(TemplateEntry {
            template,
            matcher,
            handler,
        });
        self
    }

    /// Registers a prompt. Arguments the prompt declares as required are checked
    /// before the handler runs.
    pub fn register_prompt<F, Fut>(mut self, prompt: Prompt, handler: F) -> Self
    where
        F: Fn(RequestContext, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult>> + Send + 'static,
    {
        let handler: PromptHandler = Arc::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.prompts.insert(prompt.name.clone(), (prompt, handler));
        self
    }

    pub(crate) fn check_prompt_arguments(
        prompt: &Prompt,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        let missing: Vec<&str> = prompt
            .arguments
            .iter()
            .flatten()
            .filter(|a| a.required.unwrap_or(false) && !args.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Malformed(format!(
                "Missing required arguments for prompt '{}': {}",
                prompt.name,
                missing.join(", ")
            )))
        }
    }

    /// Takes a single, pre-existing network adapter and runs a session for it.
    /// This is the core logic block used by both `serve` and `tcp_listen`.
    pub async fn handle_connection<A>(&self, adapter: A) -> Result<()>
    where
        A: NetworkAdapter,
    {
        let session = ServerSession::new(Arc::new(self.clone()));
        session.run(adapter).await
    }

    /// Starts the TCP listener and enters the main server loop.
    ///
    /// For each incoming client connection, a new asynchronous task handles that
    /// connection's entire lifecycle, so multiple clients are served concurrently.
    /// Runs until the process is terminated or accepting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound to `addr`.
    pub async fn tcp_listen<A>(self, addr: &str) -> Result<()>
    where
        A: NetworkAdapter + From<TcpStream>,
    {
        let listener = TcpListener::bind(addr).await?;
        info!("[Server] Listening on {}", listener.local_addr()?);
        self.serve_listener::<A>(listener).await
    }

    /// Like `tcp_listen`, for a listener the caller already bound.
    pub async fn serve_listener<A>(self, listener: TcpListener) -> Result<()>
    where
        A: NetworkAdapter + From<TcpStream>,
    {
        let server = Arc::new(self);
        loop {
            let (stream, client_addr) = listener.accept().await?;
            info!("[Server] Accepted connection from: {}", client_addr);
            let server_clone = Arc::clone(&server);

            tokio::spawn(async move {
                let adapter = A::from(stream);
                if let Err(e) = server_clone.handle_connection(adapter).await {
                    error!("[Server] Session failed for {}: {}", client_addr, e);
                }
            });
        }
    }
}
