use infergate_core::{check_contract, codec, Engine, EngineContractError, ServiceError};
use tracing::{debug, info, warn};

use crate::{Identity, InferReply, InferRequest, Lifecycle, PostProcess, ServicerConfig};

/// Decodes requests, dispatches them to the engine and encodes the results.
///
/// Construction checks the engine contract, so a servicer only ever exists in
/// the `Ready` state or, after [`InferenceServicer::stop`], in `Stopped`.
pub struct InferenceServicer<E: Engine, P = Identity> {
    engine_name: String,
    lifecycle: Lifecycle<E>,
    config: ServicerConfig,
    post: P,
}

impl<E: Engine> InferenceServicer<E> {
    pub fn new(engine: E, config: ServicerConfig) -> Result<Self, EngineContractError> {
        Self::with_post_processing(engine, config, Identity)
    }
}

impl<E, P> InferenceServicer<E, P>
where
    E: Engine,
    P: PostProcess<E::Output>,
{
    pub fn with_post_processing(
        engine: E,
        config: ServicerConfig,
        post: P,
    ) -> Result<Self, EngineContractError> {
        check_contract(&engine, &config.predict_op)?;

        let engine_name = engine.name().to_string();
        info!(
            engine = %engine_name,
            operation = %config.predict_op,
            backend = ?config.tensor_backend,
            "servicer ready"
        );

        Ok(Self {
            engine_name,
            lifecycle: Lifecycle::ready(engine),
            config,
            post,
        })
    }

    pub fn config(&self) -> &ServicerConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }

    /// Decode, predict and post-process one request.
    pub fn predict(&self, request: InferRequest) -> Result<E::Output, ServiceError> {
        let engine = self.lifecycle.acquire()?;

        let batch = codec::decode_request(request.raw_input, &request.meta)?
            .into_backend(self.config.tensor_backend)?;
        debug!(
            engine = %self.engine_name,
            dtype = %batch.dtype(),
            shape = ?batch.shape().dims(),
            "dispatching batch"
        );

        let output = engine
            .invoke(&self.config.predict_op, batch)
            .map_err(ServiceError::Predict)?;

        Ok(self.post.apply(output))
    }

    /// Unary call: [`InferenceServicer::predict`] then JSON-encode the result.
    pub fn infer(&self, request: InferRequest) -> Result<InferReply, ServiceError> {
        self.predict(request)
            .and_then(|output| serde_json::to_string(&output).map_err(ServiceError::Encode))
            .map(|json| InferReply { json })
            .inspect_err(|err| warn!(kind = err.kind(), error = %err, "inference call failed"))
    }

    /// Releases the engine. Repeated calls are no-ops; always returns `true`
    /// since the servicer is settled in `Stopped` afterwards.
    pub fn stop(&self) -> bool {
        if self.lifecycle.stop() {
            info!(engine = %self.engine_name, "engine released, servicer stopped");
        } else {
            debug!(engine = %self.engine_name, "stop on an already stopped servicer");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use infergate_core::{BatchPredict, Predictor, TensorBatch};

    struct Rows;

    impl BatchPredict for Rows {
        type Output = usize;

        fn batch_predict(&self, batch: TensorBatch) -> Result<usize> {
            Ok(batch.batch_size())
        }
    }

    #[test]
    fn refuses_to_start_without_the_operation() {
        let config = ServicerConfig::default().with_predict_op("predict");
        let err = InferenceServicer::new(Predictor::new("rows", Rows), config).err();
        assert!(matches!(
            err,
            Some(EngineContractError::MissingOperation { .. })
        ));
    }

    #[test]
    fn stop_always_reports_settled() {
        let servicer =
            InferenceServicer::new(Predictor::new("rows", Rows), ServicerConfig::default())
                .expect("contract holds");
        assert!(!servicer.is_stopped());
        assert!(servicer.stop());
        assert!(servicer.stop());
        assert!(servicer.is_stopped());
    }
}
