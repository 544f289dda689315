//! One-call operational wrapping of a router.
//!
//! [`wrap`] stacks the standard layers around an application router, inner
//! to outer:
//!
//! ```text
//! AccessLog → Recovery → Debug → Metrics → Router
//! ```
//!
//! - [`Metrics`] sits closest to the router, so only application traffic is
//!   counted and timed.
//! - [`Debug`] answers `/debug/*` before metrics see the request.
//! - [`Recovery`] covers the debug endpoints and the application.
//! - [`AccessLog`] is outermost and logs every request, including recovered
//!   panics and debug scrapes.

use std::io;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::info;

use crate::app::App;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::latency::Rotator;
use crate::middleware::debug::{dump_on_signal, SignalDump};
use crate::middleware::{AccessLog, AccessLogWriter, Debug, Metrics, Recovery};
use crate::router::Router;
use crate::stats::Stats;
use crate::vars::Vars;

/// Handles to the background state behind a wrapped [`App`].
///
/// Dropping it stops latency rotation and the signal dump; call
/// [`shutdown`](Self::shutdown) instead to also flush the access log.
pub struct Operations<W> {
    stats: Arc<Stats>,
    vars: Arc<Vars>,
    rotator: Rotator,
    access_log: Option<AccessLogWriter<W>>,
    dump: Option<SignalDump>,
}

/// Wraps `router` with metrics, debug endpoints, panic recovery and an access
/// log written to `out`.
///
/// # Errors
///
/// Fails if `config` is invalid or the signal dump cannot be installed.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use vigil::config::ServiceConfig;
/// use vigil::{service, Request, Router, Server};
///
/// # async fn run() -> vigil::Result<()> {
/// let router = Router::new().get("/", |_req: Request| async { "hello" });
/// let (app, ops) = service::wrap(router, tokio::io::stdout(), &ServiceConfig::default())?;
///
/// Server::bind("0.0.0.0:3000").serve(app).await?;
/// ops.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub fn wrap<W>(router: Router, out: W, config: &ServiceConfig) -> Result<(App, Operations<W>)>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    config.validate()?;

    let stats = Arc::new(Stats::new(config.latency.clone())?);
    let vars = Arc::new(Vars::with_defaults(Arc::clone(&stats)));
    let dump = if config.debug.dump_on_signal {
        Some(dump_on_signal(Arc::clone(&vars))?)
    } else {
        None
    };
    let rotator = Rotator::spawn(Arc::clone(stats.latency()), config.latency.rotation_period());

    let mut app = App::new(router).layer(Metrics::new(Arc::clone(&stats)));
    if config.debug.enabled {
        app = app.layer(Debug::new(Arc::clone(&vars), Arc::clone(&stats)));
    }
    app = app.layer(Recovery::new());

    let access_log = if config.access_log.enabled {
        let (log, writer) = AccessLog::new(out, &config.access_log);
        app = app.layer(log);
        Some(writer)
    } else {
        None
    };

    info!(
        windows = config.latency.windows,
        rotation_period_secs = config.latency.rotation_period_secs,
        access_log = config.access_log.enabled,
        debug = config.debug.enabled,
        "operations middleware installed"
    );

    let ops = Operations { stats, vars, rotator, access_log, dump };
    Ok((app, ops))
}

impl<W> Operations<W> {
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn vars(&self) -> &Arc<Vars> {
        &self.vars
    }

    /// Stops the background tasks and flushes the access log.
    ///
    /// Returns the access-log writer, or `None` when access logging is
    /// disabled.
    pub async fn shutdown(self) -> io::Result<Option<W>> {
        self.rotator.stop();
        if let Some(dump) = self.dump {
            dump.stop();
        }
        match self.access_log {
            Some(writer) => writer.stop().await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Method, StatusCode};

    use super::*;
    use crate::config::AccessLogConfig;
    use crate::{Request, Response, StatsSnapshot};

    fn get(path: &str) -> Request {
        Request::from_http(http::Request::builder().uri(path).body(Bytes::new()).unwrap())
            .with_remote_addr("192.0.2.1:4000".parse().unwrap())
    }

    async fn hello(_req: Request) -> &'static str {
        "hello"
    }

    async fn boom(_req: Request) -> Response {
        panic!("aaaaugh")
    }

    fn router() -> Router {
        Router::new().get("/hello", hello).get("/boom", boom)
    }

    #[tokio::test]
    async fn full_stack_counts_recovers_and_logs() {
        let (app, ops) = wrap(router(), Vec::new(), &ServiceConfig::default()).unwrap();

        assert_eq!(app.call(get("/hello")).await.body(), b"hello");
        let res = app.call(get("/boom")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let res = app.call(get("/debug/stats")).await;
        let snapshot: StatsSnapshot = serde_json::from_slice(res.body()).unwrap();
        // Debug scrapes are not application traffic; the recovered panic is.
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.responses, 2);
        assert_eq!(ops.stats().latency().sample_count(), 2);

        drop(app);
        let out = String::from_utf8(ops.shutdown().await.unwrap().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("192.0.2.1 - - ["));
        assert!(lines[0].contains("\"GET /hello HTTP/1.1\" 200 5"));
        assert!(lines[1].contains("\"GET /boom HTTP/1.1\" 500"));
        assert!(lines[2].contains("\"GET /debug/stats HTTP/1.1\" 200"));
    }

    #[tokio::test]
    async fn disabled_sections_are_left_out() {
        let mut config = ServiceConfig::default();
        config.debug.enabled = false;
        config.access_log.enabled = false;
        let (app, ops) = wrap(router(), Vec::new(), &config).unwrap();

        let res = app.call(get("/debug/vars")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        // With the debug layer gone the probe is ordinary traffic.
        assert_eq!(ops.stats().requests(), 1);

        assert!(ops.shutdown().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vars_are_shared_with_the_debug_endpoint() {
        let (app, ops) = wrap(router(), Vec::new(), &ServiceConfig::default()).unwrap();
        ops.vars().publish("version", || "1.2.3".into()).unwrap();

        let res = app.call(get("/debug/vars")).await;
        let doc: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(doc["version"], "1.2.3");
        assert!(doc["http"].is_object());

        let req = Request::from_http(
            http::Request::builder().method(Method::PUT).uri("/debug/vars").body(Bytes::new()).unwrap(),
        );
        assert_eq!(app.call(req).await.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn dropping_operations_stops_background_tasks() {
        let mut config = ServiceConfig::default();
        config.debug.dump_on_signal = true;
        let (app, ops) = wrap(router(), Vec::new(), &config).unwrap();
        let vars = Arc::clone(ops.vars());
        // Operations, the debug layer, the dump task and this test.
        assert_eq!(Arc::strong_count(&vars), 4);

        drop(ops);
        for _ in 0..100 {
            if Arc::strong_count(&vars) == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(Arc::strong_count(&vars), 2);
        drop(app);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = ServiceConfig::default();
        config.access_log = AccessLogConfig { enabled: true, buffer: 0 };
        assert!(matches!(
            wrap(router(), Vec::new(), &config),
            Err(crate::Error::Config(_))
        ));
    }
}
