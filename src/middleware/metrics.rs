//! Request counting and latency sampling.

use std::sync::Arc;
use std::time::Instant;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Layer;
use crate::request::Request;
use crate::stats::Stats;

/// Counts every request and response and feeds each request's duration to
/// the latency tracker.
pub struct Metrics {
    stats: Arc<Stats>,
}

impl Metrics {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self { stats }
    }
}

impl Layer for Metrics {
    fn wrap(self, inner: BoxedHandler) -> BoxedHandler {
        Arc::new(MetricsHandler { stats: self.stats, inner })
    }
}

struct MetricsHandler {
    stats: Arc<Stats>,
    inner: BoxedHandler,
}

impl ErasedHandler for MetricsHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let guard = InFlight::start(Arc::clone(&self.stats));
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let res = inner.call(req).await;
            drop(guard);
            res
        })
    }
}

/// Finishes the request on drop, so a panicking or cancelled handler still
/// yields exactly one response count and one latency sample.
struct InFlight {
    stats: Arc<Stats>,
    start: Instant,
}

impl InFlight {
    fn start(stats: Arc<Stats>) -> Self {
        stats.request_started();
        Self { stats, start: Instant::now() }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.stats.request_finished(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::FutureExt;
    use http::StatusCode;

    use super::*;
    use crate::config::TrackerConfig;
    use crate::{App, Response, Router};

    fn get(path: &str) -> Request {
        Request::from_http(http::Request::builder().uri(path).body(Bytes::new()).unwrap())
    }

    async fn hello(_req: Request) -> &'static str {
        "hello, world"
    }

    async fn slow(_req: Request) -> Response {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Response::status(StatusCode::ACCEPTED)
    }

    async fn boom(_req: Request) -> Response {
        panic!("aaaaugh")
    }

    fn stats() -> Arc<Stats> {
        Arc::new(Stats::new(TrackerConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn counts_requests_and_responses() {
        let stats = stats();
        let app = App::new(Router::new().get("/hello", hello)).layer(Metrics::new(Arc::clone(&stats)));

        let res = app.call(get("/hello")).await;
        assert_eq!(res.body(), b"hello, world");

        // Unrouted requests are still traffic.
        let res = app.call(get("/missing")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        assert_eq!(stats.requests(), 2);
        assert_eq!(stats.responses(), 2);
        assert_eq!(stats.latency().sample_count(), 2);
    }

    #[tokio::test]
    async fn records_handler_latency() {
        let stats = stats();
        let app = App::new(Router::new().get("/slow", slow)).layer(Metrics::new(Arc::clone(&stats)));

        let res = app.call(get("/slow")).await;
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert!(stats.snapshot().latency.p50 >= 5.0);
    }

    #[tokio::test]
    async fn panicking_handler_still_finishes_the_request() {
        let stats = stats();
        let app = App::new(Router::new().get("/boom", boom)).layer(Metrics::new(Arc::clone(&stats)));

        let outcome = std::panic::AssertUnwindSafe(app.call(get("/boom"))).catch_unwind().await;
        assert!(outcome.is_err());

        assert_eq!(stats.requests(), 1);
        assert_eq!(stats.responses(), 1);
        assert_eq!(stats.latency().sample_count(), 1);
    }

    #[tokio::test]
    async fn in_flight_requests_show_as_the_difference() {
        let stats = stats();
        let gate = Arc::new(tokio::sync::Notify::new());
        let held = Arc::clone(&gate);
        let router = Router::new().get("/held", move |_req: Request| {
            let held = Arc::clone(&held);
            async move {
                held.notified().await;
                "released"
            }
        });
        let app = Arc::new(App::new(router).layer(Metrics::new(Arc::clone(&stats))));

        let pending = tokio::spawn({
            let app = Arc::clone(&app);
            async move { app.call(get("/held")).await }
        });
        while stats.requests() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stats.requests() - stats.responses(), 1);

        gate.notify_one();
        let res = pending.await.unwrap();
        assert_eq!(res.body(), b"released");
        assert_eq!(stats.requests(), stats.responses());
    }
}
