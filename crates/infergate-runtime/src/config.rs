use std::str::FromStr;

use infergate_core::{TensorBackend, DEFAULT_PREDICT_OP};

/// What a stream does when one item fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamErrorPolicy {
    /// Yield the error as the stream's last item.
    #[default]
    Terminate,
    /// Yield an error document for the item and keep going.
    Respond,
}

impl FromStr for StreamErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terminate" => Ok(StreamErrorPolicy::Terminate),
            "respond" => Ok(StreamErrorPolicy::Respond),
            _ => Err(format!(
                "unknown stream error policy: {s} (expected terminate or respond)"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicerConfig {
    /// Engine operation every call dispatches to.
    pub predict_op: String,
    pub tensor_backend: TensorBackend,
    pub stream_errors: StreamErrorPolicy,
}

impl Default for ServicerConfig {
    fn default() -> Self {
        Self {
            predict_op: DEFAULT_PREDICT_OP.to_string(),
            tensor_backend: TensorBackend::default(),
            stream_errors: StreamErrorPolicy::default(),
        }
    }
}

impl ServicerConfig {
    pub fn with_predict_op(mut self, predict_op: impl Into<String>) -> Self {
        self.predict_op = predict_op.into();
        self
    }

    pub fn with_tensor_backend(mut self, tensor_backend: TensorBackend) -> Self {
        self.tensor_backend = tensor_backend;
        self
    }

    pub fn with_stream_errors(mut self, stream_errors: StreamErrorPolicy) -> Self {
        self.stream_errors = stream_errors;
        self
    }
}
