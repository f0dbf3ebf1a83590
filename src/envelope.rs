//! Classifies raw JSON-RPC messages into the four envelope kinds a session routes.

use crate::error::{Error, Result};
use crate::types::{ErrorData, RequestId};
use serde_json::{Map, Value};

/// One decoded unit of communication.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Response {
        id: RequestId,
        result: Value,
    },
    Error {
        id: RequestId,
        error: ErrorData,
    },
    Notification {
        method: String,
        params: Value,
    },
}

/// A frame that could not be decoded, with whatever could be salvaged from it so
/// that the session can still answer or resolve the request it belongs to.
#[derive(Debug)]
pub struct Undecodable {
    /// The frame's id, when present and well formed.
    pub id: Option<RequestId>,
    /// Whether the frame carried a `method` key, i.e. was meant as a request.
    pub has_method: bool,
    pub error: Error,
}

impl Undecodable {
    fn new(id: Option<RequestId>, has_method: bool, error: Error) -> Self {
        Self {
            id,
            has_method,
            error,
        }
    }
}

impl Envelope {
    /// Decodes a parsed JSON value. Missing `params` become `Value::Null`.
    pub fn from_value(value: Value) -> Result<Envelope> {
        Self::decode(value).map_err(|u| u.error)
    }

    pub fn parse(raw: &str) -> Result<Envelope> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Like `parse`, but keeps the id and shape of a frame that fails to decode.
    pub fn parse_frame(raw: &str) -> std::result::Result<Envelope, Undecodable> {
        let value =
            serde_json::from_str(raw).map_err(|e| Undecodable::new(None, false, e.into()))?;
        Self::decode(value)
    }

    fn decode(value: Value) -> std::result::Result<Envelope, Undecodable> {
        let Value::Object(mut obj) = value else {
            return Err(Undecodable::new(
                None,
                false,
                Error::Malformed("message is not a JSON object".to_string()),
            ));
        };
        let has_method = obj.contains_key("method");

        let id = match obj.remove("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value::<RequestId>(raw).map_err(|e| {
                Undecodable::new(None, has_method, Error::Malformed(format!("invalid id: {}", e)))
            })?),
        };
        let method = take_method(&mut obj).map_err(|e| Undecodable::new(id.clone(), true, e))?;

        match (id, method) {
            (Some(id), Some(method)) => Ok(Envelope::Request {
                id,
                method,
                params: obj.remove("params").unwrap_or(Value::Null),
            }),
            (None, Some(method)) => Ok(Envelope::Notification {
                method,
                params: obj.remove("params").unwrap_or(Value::Null),
            }),
            (Some(id), None) => {
                if let Some(error) = obj.remove("error") {
                    match serde_json::from_value::<ErrorData>(error) {
                        Ok(error) => Ok(Envelope::Error { id, error }),
                        Err(e) => Err(Undecodable::new(
                            Some(id),
                            false,
                            Error::Malformed(format!("invalid error object: {}", e)),
                        )),
                    }
                } else if let Some(result) = obj.remove("result") {
                    Ok(Envelope::Response { id, result })
                } else {
                    let error = Error::Malformed(format!(
                        "message {} has neither method, result nor error",
                        id
                    ));
                    Err(Undecodable::new(Some(id), false, error))
                }
            }
            (None, None) => Err(Undecodable::new(
                None,
                false,
                Error::Malformed("message has neither id nor method".to_string()),
            )),
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Envelope::Request { id, .. }
            | Envelope::Response { id, .. }
            | Envelope::Error { id, .. } => Some(id),
            Envelope::Notification { .. } => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Envelope::Request { method, .. } | Envelope::Notification { method, .. } => {
                Some(method)
            }
            _ => None,
        }
    }
}

fn take_method(obj: &mut Map<String, Value>) -> Result<Option<String>> {
    match obj.remove("method") {
        None => Ok(None),
        Some(Value::String(method)) => Ok(Some(method)),
        Some(other) => Err(Error::Malformed(format!("method must be a string, got {}", other))),
    }
}
