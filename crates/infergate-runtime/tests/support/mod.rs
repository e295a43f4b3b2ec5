#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use infergate_core::{Engine, MemberKind, TensorBackend, TensorBatch};
use infergate_runtime::InferRequest;

/// Echoes its input; rejects batches holding a negative `f32`.
pub struct Recorder {
    pub calls: Arc<AtomicUsize>,
    pub expect_backend: TensorBackend,
}

impl Recorder {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
                expect_backend: TensorBackend::Native,
            },
            calls,
        )
    }
}

impl Engine for Recorder {
    type Output = TensorBatch;

    fn name(&self) -> &str {
        "recorder"
    }

    fn describe(&self, member: &str) -> Option<MemberKind> {
        match member {
            "batch_predict" | "forward" => Some(MemberKind::Operation),
            "version" => Some(MemberKind::Value),
            _ => None,
        }
    }

    fn invoke(&self, _operation: &str, batch: TensorBatch) -> Result<TensorBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if batch.backend() != self.expect_backend {
            bail!("unexpected backend {:?}", batch.backend());
        }
        let values = batch.values::<f32>().context("recorder expects float32")?;
        if values.iter().any(|v| *v < 0.0) {
            bail!("negative input");
        }
        Ok(batch)
    }
}

pub fn bytes_from_slice<T>(slice: &[T]) -> Bytes {
    let byte_len = std::mem::size_of_val(slice);
    let ptr = slice.as_ptr().cast::<u8>();
    let bytes = unsafe { std::slice::from_raw_parts(ptr, byte_len) };
    Bytes::copy_from_slice(bytes)
}

/// One chunk per item, each a `float32` vector of `values.len()` elements.
pub fn f32_request(items: &[&[f32]]) -> InferRequest {
    let len = items.first().map_or(0, |item| item.len());
    InferRequest::new(
        items.iter().map(|item| bytes_from_slice(item)).collect(),
        format!(r#"{{"shape":[{len}],"dtype":"float32"}}"#),
    )
}

/// A request whose single chunk is one byte short of a whole `float32`.
pub fn truncated_request() -> InferRequest {
    InferRequest::new(
        vec![Bytes::from_static(&[0u8; 3])],
        r#"{"shape":[1],"dtype":"float32"}"#,
    )
}
