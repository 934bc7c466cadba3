//! Tests for streaming generation: chunk delivery, usage recording,
//! mid-stream failure semantics, and admission control.

use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};

use heimdallr::{
    ErrorKind, GatewayError, GenerateRequest, Heimdallr, Provider, ProviderCall, ProviderResponse,
    RateLimitConfig, Result, StreamEvent, Usage,
};

/// Streams a fixed set of chunks, then `Done` with usage.
struct StreamingProvider {
    chunks: Vec<&'static str>,
    calls: AtomicU32,
}

impl StreamingProvider {
    fn new(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Provider for StreamingProvider {
    fn name(&self) -> &str {
        "streaming"
    }

    async fn generate(&self, _call: &ProviderCall) -> Result<ProviderResponse> {
        unimplemented!("streaming tests never call generate")
    }

    async fn generate_stream(
        &self,
        _call: &ProviderCall,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut events: Vec<Result<StreamEvent>> = self
            .chunks
            .iter()
            .map(|c| Ok(StreamEvent::Content(c.to_string())))
            .collect();
        events.push(Ok(StreamEvent::Done {
            usage: Some(Usage {
                prompt_tokens: 5,
                completion_tokens: 15,
                total_tokens: 20,
                estimated_cost: 0.0,
            }),
        }));
        Ok(Box::pin(stream::iter(events)))
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Emits one chunk, then a mid-stream error.
struct BrokenStreamProvider;

#[async_trait]
impl Provider for BrokenStreamProvider {
    fn name(&self) -> &str {
        "broken-stream"
    }

    async fn generate(&self, _call: &ProviderCall) -> Result<ProviderResponse> {
        unimplemented!()
    }

    async fn generate_stream(
        &self,
        _call: &ProviderCall,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        Ok(Box::pin(stream::iter(vec![
            Ok(StreamEvent::Content("partial".to_string())),
            Err(GatewayError::Stream("connection reset".to_string())),
        ])))
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Wait for the spawned ledger-record task to land.
async fn settled_requests(gateway: &heimdallr::Gateway, expected: u64) -> bool {
    for _ in 0..50 {
        if gateway.usage_stats().today.total_requests >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn stream_delivers_chunks_then_done() {
    let provider = StreamingProvider::new(vec!["Once", " upon", " a time"]);
    let gateway = Heimdallr::builder()
        .provider(provider.clone())
        .build()
        .await
        .unwrap();

    let mut stream = gateway
        .stream_generate(GenerateRequest::new("tell a story").component("story"))
        .await
        .unwrap();

    let mut content = String::new();
    let mut usage = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Content(chunk) => content.push_str(&chunk),
            StreamEvent::Done { usage: u } => usage = u,
            other => panic!("unexpected stream event: {other:?}"),
        }
    }
    assert_eq!(content, "Once upon a time");
    let usage = usage.expect("done event carries usage");
    assert_eq!(usage.total_tokens, 20);
    assert!(usage.estimated_cost > 0.0, "cost attributed by the gateway");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_usage_lands_in_the_ledger() {
    let provider = StreamingProvider::new(vec!["hi"]);
    let gateway = Heimdallr::builder()
        .provider(provider)
        .build()
        .await
        .unwrap();

    let mut stream = gateway
        .stream_generate(GenerateRequest::new("hi").component("chat"))
        .await
        .unwrap();
    while stream.next().await.is_some() {}

    assert!(settled_requests(&gateway, 1).await);
    let stats = gateway.usage_stats();
    assert_eq!(stats.today.total_tokens, 20);
    assert_eq!(stats.top_components[0].component, "chat");
}

#[tokio::test]
async fn delivered_chunks_survive_mid_stream_failure() {
    let gateway = Heimdallr::builder()
        .provider(Arc::new(BrokenStreamProvider))
        .build()
        .await
        .unwrap();

    let mut stream = gateway
        .stream_generate(GenerateRequest::new("hi"))
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, StreamEvent::Content("partial".to_string()));

    let second = stream.next().await.unwrap();
    assert!(matches!(second, Err(GatewayError::Stream(_))));

    // The failed stream is still a settled, failed request.
    assert!(settled_requests(&gateway, 1).await);
    assert_eq!(gateway.usage_stats().today.failed_requests, 1);
}

#[tokio::test]
async fn streams_count_against_rate_limits() {
    let provider = StreamingProvider::new(vec!["x"]);
    let gateway = Heimdallr::builder()
        .provider(provider)
        .rate_limits(RateLimitConfig::new().requests_per_minute(1))
        .build()
        .await
        .unwrap();

    let mut stream = gateway
        .stream_generate(GenerateRequest::new("one"))
        .await
        .unwrap();
    while stream.next().await.is_some() {}

    let err = gateway
        .stream_generate(GenerateRequest::new("two"))
        .await
        .err()
        .expect("second stream should be rejected");
    assert!(matches!(err, GatewayError::RequestRejected { .. }));
}

#[tokio::test]
async fn stream_open_failure_surfaces_classified_error() {
    struct RefusingProvider;

    #[async_trait]
    impl Provider for RefusingProvider {
        fn name(&self) -> &str {
            "refusing"
        }

        async fn generate(&self, _call: &ProviderCall) -> Result<ProviderResponse> {
            unimplemented!()
        }

        async fn generate_stream(
            &self,
            _call: &ProviderCall,
        ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
            Err(GatewayError::provider(ErrorKind::InvalidRequest, "bad model"))
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }
    }

    let gateway = Heimdallr::builder()
        .provider(Arc::new(RefusingProvider))
        .build()
        .await
        .unwrap();

    let err = gateway
        .stream_generate(GenerateRequest::new("hi"))
        .await
        .err()
        .expect("stream open should fail");
    assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));

    assert!(settled_requests(&gateway, 1).await);
    assert_eq!(gateway.usage_stats().today.failed_requests, 1);
}

#[tokio::test]
async fn streams_release_their_concurrency_slot() {
    let provider = StreamingProvider::new(vec!["x"]);
    let gateway = Heimdallr::builder()
        .provider(provider.clone())
        .concurrency_limit(1)
        .build()
        .await
        .unwrap();

    // Drain two streams in sequence through a single slot; a leaked
    // permit would deadlock the second acquire.
    for _ in 0..2 {
        let mut stream = gateway
            .stream_generate(GenerateRequest::new("hi"))
            .await
            .unwrap();
        while stream.next().await.is_some() {}
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}
