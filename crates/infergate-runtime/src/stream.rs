use std::sync::Arc;

use futures::{Stream, StreamExt};
use infergate_core::{Engine, ServiceError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{InferReply, InferRequest, InferenceServicer, PostProcess, StreamErrorPolicy};

/// Maps `requests` lazily to replies, one per request and in request order.
///
/// Each item runs the unary pipeline on the blocking pool; the next item is
/// not pulled until the current reply has been yielded. Once `cancel` fires
/// the stream yields [`ServiceError::Cancelled`] and ends without decoding
/// further items. A stopped servicer fails the call up front, and a stop
/// observed mid-stream ends it with [`ServiceError::Stopped`] whatever the
/// error policy.
pub fn stream_infer<E, P, S>(
    servicer: Arc<InferenceServicer<E, P>>,
    requests: S,
    cancel: CancellationToken,
) -> Result<impl Stream<Item = Result<InferReply, ServiceError>> + Send + 'static, ServiceError>
where
    E: Engine,
    P: PostProcess<E::Output>,
    S: Stream<Item = Result<InferRequest, ServiceError>> + Send + 'static,
{
    if servicer.is_stopped() {
        return Err(ServiceError::Stopped);
    }
    let policy = servicer.config().stream_errors;

    Ok(async_stream::stream! {
        tokio::pin!(requests);
        let mut index = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = requests.next() => Some(item),
            };
            let Some(item) = next.filter(|_| !cancel.is_cancelled()) else {
                debug!(index, "stream cancelled");
                yield Err(ServiceError::Cancelled);
                break;
            };
            let Some(item) = item else {
                debug!(items = index, "stream drained");
                break;
            };

            let request = match item {
                Ok(request) => request,
                Err(err) => {
                    warn!(index, error = %err, "inbound stream failed");
                    yield Err(err);
                    break;
                }
            };

            let worker = Arc::clone(&servicer);
            let outcome = match tokio::task::spawn_blocking(move || worker.infer(request)).await {
                Ok(outcome) => outcome,
                Err(err) => Err(ServiceError::Predict(
                    anyhow::Error::new(err).context("predict task failed"),
                )),
            };

            match outcome {
                Ok(reply) => {
                    yield Ok(reply);
                }
                Err(ServiceError::Stopped) => {
                    yield Err(ServiceError::Stopped);
                    break;
                }
                Err(err) => match policy {
                    StreamErrorPolicy::Terminate => {
                        debug!(index, kind = err.kind(), "terminating stream on failed item");
                        yield Err(err);
                        break;
                    }
                    StreamErrorPolicy::Respond => {
                        yield Ok(InferReply::from_error(&err));
                    }
                },
            }
            index += 1;
        }
    })
}
