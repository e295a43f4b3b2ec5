use bytes::Bytes;
use infergate_core::ServiceError;
use serde_json::json;

/// One call's raw chunks plus their JSON metadata document.
#[derive(Clone, Debug, Default)]
pub struct InferRequest {
    pub raw_input: Vec<Bytes>,
    pub meta: String,
}

impl InferRequest {
    pub fn new(raw_input: Vec<Bytes>, meta: impl Into<String>) -> Self {
        Self {
            raw_input,
            meta: meta.into(),
        }
    }
}

/// The engine result serialized as a JSON document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferReply {
    pub json: String,
}

impl InferReply {
    /// Error document sent in place of a result under
    /// [`crate::StreamErrorPolicy::Respond`].
    pub fn from_error(err: &ServiceError) -> Self {
        let json = json!({
            "error": {
                "kind": err.kind(),
                "message": err.to_string(),
            }
        });
        Self {
            json: json.to_string(),
        }
    }
}
