use thiserror::Error;

use crate::DType;

/// Failure to turn raw chunks plus metadata into a [`crate::TensorBatch`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid tensor metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("unknown dtype `{0}`")]
    UnknownDType(String),

    #[error("batch contains no chunks")]
    EmptyBatch,

    #[error("shape {0:?} overflows the addressable element count")]
    ShapeOverflow(Vec<usize>),

    #[error("zero-element shape {shape:?} expands past {limit} positions")]
    EmptyExtent { shape: Vec<usize>, limit: usize },

    #[error("chunk {index}: {len} bytes is not a multiple of the {dtype} element width ({width})")]
    ByteLength {
        index: usize,
        len: usize,
        dtype: DType,
        width: usize,
    },

    #[error("chunk {index}: {len} bytes differs from the first chunk ({expected} bytes)")]
    InconsistentChunks {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("chunk {index}: {got} elements do not fill shape {shape:?} ({expected} elements)")]
    ElementCount {
        index: usize,
        got: usize,
        expected: usize,
        shape: Vec<usize>,
    },

    #[error("chunk {index}: byte {offset} is not a valid bool ({value:#04x})")]
    InvalidBool {
        index: usize,
        offset: usize,
        value: u8,
    },

    #[error("tensor layout: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

/// The configured engine cannot serve the configured predict operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineContractError {
    #[error("engine `{engine}` does not expose `{operation}`")]
    MissingOperation { engine: String, operation: String },

    #[error("`{operation}` is not an invocable operation of engine `{engine}`")]
    NotInvocable { engine: String, operation: String },
}

/// Call-scoped failure of a unary call or a stream item.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("predict failed: {0:#}")]
    Predict(anyhow::Error),

    #[error("failed to encode engine result: {0}")]
    Encode(serde_json::Error),

    #[error("servicer is stopped")]
    Stopped,

    #[error("call cancelled")]
    Cancelled,

    /// The inbound side of a stream failed before an item could be read.
    #[error("inbound stream failed: {0:#}")]
    Transport(anyhow::Error),
}

impl ServiceError {
    /// Stable identifier of the error kind, used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Decode(_) => "decode",
            ServiceError::Predict(_) => "predict",
            ServiceError::Encode(_) => "encode",
            ServiceError::Stopped => "stopped",
            ServiceError::Cancelled => "cancelled",
            ServiceError::Transport(_) => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_name_the_chunk() {
        let err = DecodeError::ByteLength {
            index: 3,
            len: 7,
            dtype: DType::F32,
            width: 4,
        };
        assert_eq!(
            err.to_string(),
            "chunk 3: 7 bytes is not a multiple of the float32 element width (4)"
        );
    }

    #[test]
    fn service_error_kinds() {
        assert_eq!(ServiceError::Stopped.kind(), "stopped");
        assert_eq!(ServiceError::from(DecodeError::EmptyBatch).kind(), "decode");
        assert_eq!(
            ServiceError::Predict(anyhow::anyhow!("boom")).to_string(),
            "predict failed: boom"
        );
    }
}
