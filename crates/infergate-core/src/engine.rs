use anyhow::{bail, Result};
use serde::Serialize;

use crate::{EngineContractError, TensorBatch};

/// Operation name dispatched to when none is configured.
pub const DEFAULT_PREDICT_OP: &str = "batch_predict";

/// What an engine member is, as reported by [`Engine::describe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    /// Invocable with a [`TensorBatch`].
    Operation,
    /// A plain attribute; present but not invocable.
    Value,
}

/// Capability contract for anything the servicer can dispatch to.
///
/// The servicer calls [`Engine::describe`] once, at construction, to confirm the
/// configured operation exists and is invocable; afterwards it only calls
/// [`Engine::invoke`]. Calls may arrive concurrently from several RPCs.
pub trait Engine: Send + Sync + 'static {
    type Output: Serialize + Send + 'static;

    fn name(&self) -> &str;
    fn describe(&self, member: &str) -> Option<MemberKind>;
    fn invoke(&self, operation: &str, batch: TensorBatch) -> Result<Self::Output>;
}

/// Engines with a single `batch_predict` operation.
pub trait BatchPredict: Send + Sync + 'static {
    type Output: Serialize + Send + 'static;

    fn batch_predict(&self, batch: TensorBatch) -> Result<Self::Output>;
}

/// Exposes a [`BatchPredict`] implementation as an [`Engine`] with the members
/// `batch_predict` (operation) and `name` (value).
pub struct Predictor<P> {
    name: String,
    inner: P,
}

impl<P: BatchPredict> Predictor<P> {
    pub fn new(name: impl Into<String>, inner: P) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: BatchPredict> Engine for Predictor<P> {
    type Output = P::Output;

    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self, member: &str) -> Option<MemberKind> {
        match member {
            DEFAULT_PREDICT_OP => Some(MemberKind::Operation),
            "name" => Some(MemberKind::Value),
            _ => None,
        }
    }

    fn invoke(&self, operation: &str, batch: TensorBatch) -> Result<Self::Output> {
        if operation != DEFAULT_PREDICT_OP {
            bail!("engine `{}` has no operation `{operation}`", self.name);
        }
        self.inner.batch_predict(batch)
    }
}

/// Confirms `engine` exposes `operation` as something invocable.
pub fn check_contract<E: Engine>(engine: &E, operation: &str) -> Result<(), EngineContractError> {
    match engine.describe(operation) {
        Some(MemberKind::Operation) => Ok(()),
        Some(MemberKind::Value) => Err(EngineContractError::NotInvocable {
            engine: engine.name().to_string(),
            operation: operation.to_string(),
        }),
        None => Err(EngineContractError::MissingOperation {
            engine: engine.name().to_string(),
            operation: operation.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementBuffer, Shape};

    struct Count;

    impl BatchPredict for Count {
        type Output = usize;

        fn batch_predict(&self, batch: TensorBatch) -> Result<usize> {
            Ok(batch.batch_size())
        }
    }

    #[test]
    fn predictor_contract() {
        let engine = Predictor::new("count", Count);
        assert!(check_contract(&engine, DEFAULT_PREDICT_OP).is_ok());
        assert_eq!(
            check_contract(&engine, "name"),
            Err(EngineContractError::NotInvocable {
                engine: "count".into(),
                operation: "name".into(),
            })
        );
        assert_eq!(
            check_contract(&engine, "predict"),
            Err(EngineContractError::MissingOperation {
                engine: "count".into(),
                operation: "predict".into(),
            })
        );
    }

    #[test]
    fn predictor_dispatches_batch_predict() -> Result<()> {
        let engine = Predictor::new("count", Count);
        let batch = TensorBatch::from_buffer(Shape::from_slice(&[3]), ElementBuffer::U8(vec![1, 2, 3]))?;
        assert_eq!(engine.invoke(DEFAULT_PREDICT_OP, batch.clone())?, 3);
        assert!(engine.invoke("name", batch).is_err());
        Ok(())
    }
}
