//! Defines the ServerSession, which wires a `Server`'s handlers onto one connection.

use super::server::Server;
use crate::error::{Error, Result};
use crate::network_adapter::NetworkAdapter;
use crate::session::{RequestContext, Session, SessionRole};
use crate::types::{
    methods, CallToolParams, CallToolResult, CompleteParams, CompleteResult, EmptyParams,
    ErrorData, GetPromptParams, GetPromptResult, InitializeRequestParams, InitializeResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ReadResourceResult, SetLevelParams, INVALID_REQUEST,
    LATEST_PROTOCOL_VERSION,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Represents a single client connection and the server state it dispatches into.
pub struct ServerSession {
    session: Session,
    server: Arc<Server>,
    initialized: Arc<AtomicBool>,
}

impl ServerSession {
    pub fn new(server: Arc<Server>) -> Self {
        let session = Session::new(SessionRole::Server, server.config.clone());
        let this = Self {
            session,
            server,
            initialized: Arc::new(AtomicBool::new(false)),
        };
        this.register_handlers();
        this
    }

    /// The underlying session, for observing in-flight calls or closing the connection.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn run<A: NetworkAdapter>(&self, adapter: A) -> Result<()> {
        self.session.run(adapter).await
    }

    fn register_handlers(&self) {
        let server = self.server.clone();
        let initialized = self.initialized.clone();
        self.session
            .register_request_handler(methods::INITIALIZE, move |ctx, params| {
                let server = server.clone();
                let initialized = initialized.clone();
                async move {
                    let params: InitializeRequestParams = decode_params(params)?;
                    if initialized.swap(true, Ordering::AcqRel) {
                        return Err(Error::Remote(ErrorData::new(
                            INVALID_REQUEST,
                            "Client sent 'initialize' request twice.",
                        )));
                    }
                    info!(
                        "[Server] Initializing session for {} {} (protocol {})",
                        params.client_info.name, params.client_info.version, params.protocol_version
                    );
                    ctx.session().set_peer_capabilities(params.capabilities);
                    let result = InitializeResult {
                        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                        capabilities: server.capabilities(),
                        server_info: server.info(),
                        instructions: server.instructions.clone(),
                    };
                    Ok(serde_json::to_value(result)?)
                }
            });
        self.session
            .register_request_handler(methods::PING, |_ctx, _params| async { Ok(json!({})) });
        self.session
            .register_notification_handler(methods::INITIALIZED, |_params| {
                debug!("[Server] Client finished initialization");
            });

        self.route(methods::TOOLS_LIST, list_tools);
        self.route(methods::TOOLS_CALL, call_tool);
        self.route(methods::RESOURCES_LIST, list_resources);
        self.route(methods::RESOURCES_TEMPLATES_LIST, list_resource_templates);
        self.route(methods::RESOURCES_READ, read_resource);
        self.route(methods::PROMPTS_LIST, list_prompts);
        self.route(methods::PROMPTS_GET, get_prompt);
        self.route(methods::COMPLETION_COMPLETE, complete);
        self.route(methods::LOGGING_SET_LEVEL, set_level);
    }

    /// Registers a typed handler that only runs once the session is initialized.
    fn route<P, R, F, Fut>(&self, method: &str, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<Server>, RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let server = self.server.clone();
        let initialized = self.initialized.clone();
        let handler = Arc::new(handler);
        self.session
            .register_request_handler(method, move |ctx, params| {
                let server = server.clone();
                let initialized = initialized.clone();
                let handler = handler.clone();
                async move {
                    if !initialized.load(Ordering::Acquire) {
                        return Err(Error::Remote(ErrorData::new(
                            INVALID_REQUEST,
                            format!("Received '{}' before 'initialize'", ctx.method()),
                        )));
                    }
                    let params: P = decode_params(params)?;
                    let result = handler(server, ctx, params).await?;
                    Ok(serde_json::to_value(result)?)
                }
            });
    }
}

fn decode_params<P: DeserializeOwned>(params: Value) -> Result<P> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| Error::Malformed(format!("invalid params: {}", e)))
}

// --- Method Handlers ---

async fn list_tools(
    server: Arc<Server>,
    _ctx: RequestContext,
    _: EmptyParams,
) -> Result<ListToolsResult> {
    Ok(ListToolsResult {
        tools: server.tools.values().map(|(tool, _)| tool.clone()).collect(),
    })
}

async fn call_tool(
    server: Arc<Server>,
    ctx: RequestContext,
    params: CallToolParams,
) -> Result<CallToolResult> {
    let Some((_, handler)) = server.tools.get(&params.name) else {
        return Err(Error::Malformed(format!("Unknown tool: {}", params.name)));
    };
    let arguments = if params.arguments.is_null() { json!({}) } else { params.arguments };
    match handler(ctx, arguments).await {
        Ok(result) => Ok(result),
        // Tool failures are reported to the model as results, not protocol errors.
        Err(e) => {
            warn!("[Server] Tool '{}' failed: {}", params.name, e);
            Ok(CallToolResult::error(format!(
                "Error executing tool {}: {}",
                params.name, e
            )))
        }
    }
}

async fn list_resources(
    server: Arc<Server>,
    _ctx: RequestContext,
    _: EmptyParams,
) -> Result<ListResourcesResult> {
    Ok(ListResourcesResult {
        resources: server.resources.values().map(|(r, _)| r.clone()).collect(),
    })
}

async fn list_resource_templates(
    server: Arc<Server>,
    _ctx: RequestContext,
    _: EmptyParams,
) -> Result<ListResourceTemplatesResult> {
    Ok(ListResourceTemplatesResult {
        resource_templates: server.templates.iter().map(|t| t.template.clone()).collect(),
    })
}

async fn read_resource(
    server: Arc<Server>,
    ctx: RequestContext,
    params: ReadResourceParams,
) -> Result<ReadResourceResult> {
    if let Some((_, handler)) = server.resources.get(&params.uri) {
        return handler(ctx, params.uri).await;
    }
    for entry in &server.templates {
        if let Some(vars) = entry.matcher.matches(&params.uri) {
            return (entry.handler)(ctx, params.uri, vars).await;
        }
    }
    Err(Error::NotFound(format!("Unknown resource: {}", params.uri)))
}

async fn list_prompts(
    server: Arc<Server>,
    _ctx: RequestContext,
    _: EmptyParams,
) -> Result<ListPromptsResult> {
    Ok(ListPromptsResult {
        prompts: server.prompts.values().map(|(p, _)| p.clone()).collect(),
    })
}

async fn get_prompt(
    server: Arc<Server>,
    ctx: RequestContext,
    params: GetPromptParams,
) -> Result<GetPromptResult> {
    let Some((prompt, handler)) = server.prompts.get(&params.name) else {
        return Err(Error::Malformed(format!("Unknown prompt: {}", params.name)));
    };
    let arguments = params.arguments.unwrap_or_default();
    Server::check_prompt_arguments(prompt, &arguments)?;
    handler(ctx, arguments).await
}

async fn complete(
    server: Arc<Server>,
    _ctx: RequestContext,
    params: CompleteParams,
) -> Result<CompleteResult> {
    Ok(server
        .completions
        .complete(&params.into())
        .map(CompleteResult::from)
        .unwrap_or_default())
}

async fn set_level(
    _server: Arc<Server>,
    ctx: RequestContext,
    params: SetLevelParams,
) -> Result<Value> {
    info!("[Server] Client set log level to {:?}", params.level);
    ctx.session().set_log_level(params.level);
    Ok(json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_adapter::MemoryAdapter;
    use crate::types::{Tool, METHOD_NOT_FOUND};
    use crate::types::{ClientCapabilities, Implementation};
    use std::time::Duration;

    async fn start(server: Server) -> Session {
        let (client_end, server_end) = MemoryAdapter::pair();
        let server_session = ServerSession::new(Arc::new(server));
        tokio::spawn(async move { server_session.run(server_end).await });
        let client = Session::new(SessionRole::Client, Default::default());
        client.spawn(client_end);
        client
    }

    fn init_params() -> Value {
        serde_json::to_value(InitializeRequestParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "test".to_string(),
                version: "0".to_string(),
            },
        })
        .unwrap()
    }

    fn echo_server() -> Server {
        Server::new("test").register_tool(
            Tool {
                name: "echo".to_string(),
                ..Default::default()
            },
            |_ctx, args| async move {
                let text = args["text"].as_str().unwrap_or("").to_string();
                Ok(CallToolResult::text(text))
            },
        )
    }

    #[tokio::test]
    async fn test_requests_before_initialize_are_rejected() {
        let client = start(echo_server()).await;

        // ping is allowed at any time
        assert_eq!(client.invoke(methods::PING, Value::Null).await.unwrap(), json!({}));

        match client.invoke(methods::TOOLS_LIST, json!({})).await {
            Err(Error::Remote(data)) => assert_eq!(data.code, INVALID_REQUEST),
            other => panic!("unexpected {:?}", other),
        }

        let init = client.invoke(methods::INITIALIZE, init_params()).await.unwrap();
        assert_eq!(init["serverInfo"]["name"], "test");
        assert!(init["capabilities"]["tools"].is_object());

        let tools = client.invoke(methods::TOOLS_LIST, json!({})).await.unwrap();
        assert_eq!(tools["tools"][0]["name"], "echo");

        // A second initialize is refused.
        assert!(client.invoke(methods::INITIALIZE, init_params()).await.is_err());
    }

    #[tokio::test]
    async fn test_tool_call_and_unknown_names() {
        let client = start(echo_server()).await;
        client.invoke(methods::INITIALIZE, init_params()).await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.invoke(
                methods::TOOLS_CALL,
                json!({ "name": "echo", "arguments": { "text": "hi" } }),
            ),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result["content"][0]["text"], "hi");
        assert_eq!(result["isError"], false);

        match client.invoke(methods::TOOLS_CALL, json!({ "name": "nope" })).await {
            Err(Error::Remote(data)) => assert_eq!(data.code, crate::types::INVALID_PARAMS),
            other => panic!("unexpected {:?}", other),
        }
        match client.invoke("resources/subscribe", json!({})).await {
            Err(Error::Remote(data)) => assert_eq!(data.code, METHOD_NOT_FOUND),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_completion_is_empty_not_an_error() {
        let client = start(echo_server()).await;
        client.invoke(methods::INITIALIZE, init_params()).await.unwrap();
        let result = client
            .invoke(
                methods::COMPLETION_COMPLETE,
                json!({
                    "ref": { "type": "ref/prompt", "name": "nothing" },
                    "argument": { "name": "x", "value": "" }
                }),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({ "completion": { "values": [] } }));
    }
}
