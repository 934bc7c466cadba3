//! Streaming plumbing: usage recording and backpressure.
//!
//! [`RecordingStream`] wraps a provider stream, holding the concurrency
//! permit for the stream's lifetime and settling exactly once — on the
//! terminal `Done` event, on the first error, or when the provider
//! stream ends. Settling attributes cost to the reported usage, updates
//! health, and appends a ledger record from a spawned task (ledger
//! persistence is async and `poll_next` cannot await).
//!
//! [`bounded`] adds a bounded channel between producer and consumer so
//! a fast provider cannot fill unbounded memory when the consumer is
//! slow; when the channel is full the producer stops polling the
//! provider until the consumer catches up.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use pin_project_lite::pin_project;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::ledger::UsageRecord;
use crate::provider::ProviderUsage;
use crate::queue::Permit;
use crate::telemetry;
use crate::types::StreamEvent;
use crate::Result;

use super::GatewayContext;

/// Default number of items buffered between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

pin_project! {
    /// Stream adapter that records usage and releases the permit when
    /// the underlying stream settles.
    pub(crate) struct RecordingStream<S> {
        #[pin]
        inner: S,
        ctx: Arc<GatewayContext>,
        permit: Option<Permit>,
        component: String,
        persona: Option<String>,
        started: Instant,
        settled: bool,
    }
}

impl<S> RecordingStream<S> {
    pub(crate) fn new(
        inner: S,
        ctx: Arc<GatewayContext>,
        permit: Permit,
        component: String,
        persona: Option<String>,
        started: Instant,
    ) -> Self {
        Self {
            inner,
            ctx,
            permit: Some(permit),
            component,
            persona,
            started,
            settled: false,
        }
    }
}

enum Outcome {
    Success(Option<crate::types::Usage>),
    Failure(String),
}

fn settle(
    ctx: &Arc<GatewayContext>,
    permit: &mut Option<Permit>,
    settled: &mut bool,
    component: &str,
    persona: &Option<String>,
    started: Instant,
    outcome: Outcome,
) {
    if *settled {
        return;
    }
    *settled = true;
    permit.take();

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let record = match outcome {
        Outcome::Success(usage) => {
            ctx.health.record_success();
            metrics::counter!(telemetry::REQUESTS_TOTAL,
                "component" => component.to_owned(), "status" => "ok")
            .increment(1);
            if let Some(usage) = usage {
                metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "prompt")
                    .increment(usage.prompt_tokens);
                metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "completion")
                    .increment(usage.completion_tokens);
            }
            UsageRecord::success(component, usage.unwrap_or_default(), elapsed_ms)
        }
        Outcome::Failure(message) => {
            metrics::counter!(telemetry::REQUESTS_TOTAL,
                "component" => component.to_owned(), "status" => "error")
            .increment(1);
            UsageRecord::failure(component, message, elapsed_ms)
        }
    };
    let record = match persona {
        Some(p) => record.persona(p.clone()),
        None => record,
    };
    let ledger = Arc::clone(&ctx.ledger);
    tokio::spawn(async move {
        if let Err(e) = ledger.record(record).await {
            warn!(error = %e, "failed to record streaming usage");
        }
    });
}

impl<S> Stream for RecordingStream<S>
where
    S: Stream<Item = Result<StreamEvent>>,
{
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(StreamEvent::Done { usage }))) => {
                // Re-attribute cost to provider-reported counts.
                let usage = usage.map(|u| {
                    this.ctx.config.attribute_cost(&ProviderUsage {
                        prompt_tokens: u.prompt_tokens,
                        completion_tokens: u.completion_tokens,
                        total_tokens: u.total_tokens,
                    })
                });
                settle(
                    this.ctx,
                    this.permit,
                    this.settled,
                    this.component,
                    this.persona,
                    *this.started,
                    Outcome::Success(usage),
                );
                Poll::Ready(Some(Ok(StreamEvent::Done { usage })))
            }
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Err(e))) => {
                settle(
                    this.ctx,
                    this.permit,
                    this.settled,
                    this.component,
                    this.persona,
                    *this.started,
                    Outcome::Failure(e.to_string()),
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                settle(
                    this.ctx,
                    this.permit,
                    this.settled,
                    this.component,
                    this.persona,
                    *this.started,
                    Outcome::Success(None),
                );
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wrap a stream in a bounded channel for backpressure.
///
/// Spawns a producer task that reads from `inner` and sends items
/// through a bounded `mpsc` channel. When the channel is full, the
/// producer stops polling the provider until the consumer reads. If
/// the consumer drops the stream, the producer stops.
pub(crate) fn bounded<T: Send + 'static>(
    inner: Pin<Box<dyn Stream<Item = Result<T>> + Send>>,
    buffer_size: usize,
) -> Pin<Box<dyn Stream<Item = Result<T>> + Send>> {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut inner = inner;
        while let Some(item) = inner.next().await {
            if tx.send(item).await.is_err() {
                break; // receiver dropped
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
