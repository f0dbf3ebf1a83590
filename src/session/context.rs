//! The handle a request handler receives for talking back to the caller.

use super::{CallOptions, Session};
use crate::error::{Error, Result};
use crate::interaction::{check_elicit_result, Elicitation};
use crate::types::{
    methods, ClientCapabilities, CreateMessageParams, CreateMessageResult, ElicitRequestParams,
    ElicitResult, ListRootsResult, LogLevel, LoggingMessageParams, ProgressParams, ProgressToken,
    RequestId,
};
use crate::SchemaDescriptor;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Scoped to one inbound request. Sub-requests issued through it are linked to the
/// request, and progress notifications carry the caller's progress token.
#[derive(Clone)]
pub struct RequestContext {
    session: Session,
    request_id: RequestId,
    method: String,
    progress_token: Option<ProgressToken>,
}

impl RequestContext {
    pub(crate) fn new(
        session: Session,
        request_id: RequestId,
        method: String,
        progress_token: Option<ProgressToken>,
    ) -> Self {
        Self {
            session,
            request_id,
            method,
            progress_token,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends `notifications/progress`. Does nothing if the caller did not ask for progress.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let Some(token) = self.progress_token.clone() else {
            return;
        };
        let params = ProgressParams {
            progress_token: token,
            progress,
            total,
            message,
        };
        if let Ok(params) = serde_json::to_value(params) {
            let _ = self.session.notify(methods::PROGRESS, params);
        }
    }

    /// Sends `notifications/message` unless `level` is below the session's minimum.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if level < self.session.log_level() {
            return;
        }
        let message = message.into();
        debug!("[Session] {:?} log from {}: {}", level, self.method, message);
        let params = LoggingMessageParams {
            level,
            logger: None,
            data: Value::String(message),
        };
        if let Ok(params) = serde_json::to_value(params) {
            let _ = self.session.notify(methods::MESSAGE, params);
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message)
    }

    /// Sends a request to the peer as a sub-request of this call and waits for it.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value> {
        self.session
            .call(
                method,
                params,
                CallOptions {
                    parent: Some(self.request_id.clone()),
                    timeout: self.session.config().request_timeout,
                    progress: false,
                },
            )
            .await
    }

    fn require(&self, capability: &str, advertised: fn(&ClientCapabilities) -> bool) -> Result<()> {
        match self.session.peer_capabilities() {
            Some(caps) if advertised(caps) => Ok(()),
            _ => Err(Error::Unsupported(format!(
                "peer does not support {}",
                capability
            ))),
        }
    }

    /// Asks the caller to fill in a form. An `accept` is checked against
    /// `requested_schema` (after defaults) before it is returned.
    pub async fn elicit(
        &self,
        message: impl Into<String>,
        requested_schema: Value,
    ) -> Result<ElicitResult> {
        self.require("elicitation", |caps| caps.elicitation.is_some())?;
        let params = ElicitRequestParams {
            message: message.into(),
            requested_schema: requested_schema.clone(),
        };
        let raw = self
            .invoke(methods::ELICITATION_CREATE, serde_json::to_value(params)?)
            .await?;
        let result: ElicitResult = serde_json::from_value(raw)
            .map_err(|e| Error::Malformed(format!("elicitation result: {}", e)))?;
        check_elicit_result(&requested_schema, result)
    }

    /// Elicits a form described by `T`'s schema and decodes the accepted content into `T`.
    pub async fn elicit_as<T>(&self, message: impl Into<String>) -> Result<Elicitation<T>>
    where
        T: SchemaDescriptor + DeserializeOwned,
    {
        let result = self.elicit(message, T::schema()).await?;
        Elicitation::from_result(result)
    }

    /// Asks the caller to generate a message.
    pub async fn sample(&self, params: CreateMessageParams) -> Result<CreateMessageResult> {
        self.require("sampling", |caps| caps.sampling.is_some())?;
        let raw = self
            .invoke(methods::SAMPLING_CREATE_MESSAGE, serde_json::to_value(params)?)
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Asks the caller for its filesystem roots.
    pub async fn list_roots(&self) -> Result<ListRootsResult> {
        self.require("roots", |caps| caps.roots.is_some())?;
        let raw = self
            .invoke(methods::ROOTS_LIST, Value::Object(Default::default()))
            .await?;
        Ok(serde_json::from_value(raw)?)
    }
}
