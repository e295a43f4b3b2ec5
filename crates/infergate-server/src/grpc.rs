use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use infergate_core::{Engine, ServiceError};
use infergate_proto::infergate::v1 as pb;
use infergate_runtime::{stream_infer, InferReply, InferRequest, InferenceServicer, PostProcess};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

type ReplyStream = Pin<Box<dyn Stream<Item = Result<pb::InferResponse, Status>> + Send>>;

pub struct GrpcSvc<E: Engine, P> {
    servicer: Arc<InferenceServicer<E, P>>,
    // Cancelled on server shutdown; every stream gets a child token.
    shutdown: CancellationToken,
}

impl<E: Engine, P> GrpcSvc<E, P> {
    pub fn new(servicer: Arc<InferenceServicer<E, P>>, shutdown: CancellationToken) -> Self {
        Self { servicer, shutdown }
    }
}

#[tonic::async_trait]
impl<E, P> pb::inference_adapter_server::InferenceAdapter for GrpcSvc<E, P>
where
    E: Engine,
    P: PostProcess<E::Output>,
{
    async fn infer(
        &self,
        req: Request<pb::InferRequest>,
    ) -> std::result::Result<Response<pb::InferResponse>, Status> {
        let request = from_proto(req.into_inner());
        let servicer = Arc::clone(&self.servicer);

        let reply = tokio::task::spawn_blocking(move || servicer.infer(request))
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "inference task failed");
                Status::internal(format!("inference task failed: {e}"))
            })?
            .map_err(to_status)?;

        Ok(Response::new(to_proto(reply)))
    }

    type StreamInferStream = ReplyStream;

    async fn stream_infer(
        &self,
        req: Request<Streaming<pb::InferRequest>>,
    ) -> std::result::Result<Response<Self::StreamInferStream>, Status> {
        let inbound = req.into_inner().map(|item| {
            item.map(from_proto)
                .map_err(|status| ServiceError::Transport(status.into()))
        });

        let replies = stream_infer(
            Arc::clone(&self.servicer),
            inbound,
            self.shutdown.child_token(),
        )
        .map_err(to_status)?;

        let outbound = replies.map(|item| item.map(to_proto).map_err(to_status));
        Ok(Response::new(Box::pin(outbound)))
    }

    async fn stop(
        &self,
        _req: Request<pb::StopRequest>,
    ) -> std::result::Result<Response<pb::StopResponse>, Status> {
        let status = self.servicer.stop();
        Ok(Response::new(pb::StopResponse { status }))
    }
}

fn from_proto(req: pb::InferRequest) -> InferRequest {
    InferRequest::new(req.raw_input.into_iter().map(Bytes::from).collect(), req.meta)
}

fn to_proto(reply: InferReply) -> pb::InferResponse {
    pb::InferResponse { json: reply.json }
}

pub fn to_status(err: ServiceError) -> Status {
    let message = err.to_string();
    match err {
        ServiceError::Decode(_) => Status::invalid_argument(message),
        ServiceError::Predict(_) | ServiceError::Encode(_) => Status::internal(message),
        ServiceError::Stopped => Status::failed_precondition(message),
        ServiceError::Cancelled => Status::cancelled(message),
        ServiceError::Transport(inner) => inner
            .downcast::<Status>()
            .unwrap_or_else(|_| Status::unavailable(message)),
    }
}
