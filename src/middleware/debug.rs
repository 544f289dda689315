//! Debug endpoints.
//!
//! | Path | Body |
//! |---|---|
//! | `GET /debug/vars` | every published [`Vars`] entry as one JSON object |
//! | `GET /debug/stats` | the `http` stats alone: `{"Requests", "Responses", "Latency"}` |
//! | `GET /debug/cmdline` | process arguments, NUL-separated |
//! | `GET /debug/pprof/cmdline` | same as `/debug/cmdline`, for pprof-style scrapers |
//!
//! Everything else falls through to the wrapped handler, so mount this layer
//! outside [`Metrics`](crate::middleware::Metrics) to keep probes and scrapes
//! out of the application's own numbers.

use std::future::ready;
use std::sync::Arc;

use http::{Method, StatusCode};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Layer;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::stats::Stats;
use crate::vars::Vars;

pub const VARS_PATH: &str = "/debug/vars";
pub const STATS_PATH: &str = "/debug/stats";
pub const CMDLINE_PATH: &str = "/debug/cmdline";
pub const PPROF_CMDLINE_PATH: &str = "/debug/pprof/cmdline";

/// Serves the debug endpoints in front of the wrapped handler.
pub struct Debug {
    vars: Arc<Vars>,
    stats: Arc<Stats>,
}

impl Debug {
    pub fn new(vars: Arc<Vars>, stats: Arc<Stats>) -> Self {
        Self { vars, stats }
    }
}

impl Layer for Debug {
    fn wrap(self, inner: BoxedHandler) -> BoxedHandler {
        Arc::new(DebugHandler { vars: self.vars, stats: self.stats, inner })
    }
}

struct DebugHandler {
    vars: Arc<Vars>,
    stats: Arc<Stats>,
    inner: BoxedHandler,
}

impl ErasedHandler for DebugHandler {
    fn call(&self, req: Request) -> BoxFuture {
        if !matches!(req.path(), VARS_PATH | STATS_PATH | CMDLINE_PATH | PPROF_CMDLINE_PATH) {
            return self.inner.call(req);
        }
        if req.method() != Method::GET {
            let res = Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("allow", "GET")
                .no_body();
            return Box::pin(ready(res));
        }

        let res = match req.path() {
            VARS_PATH => json(self.vars.render()),
            STATS_PATH => match serde_json::to_vec(&self.stats.snapshot()) {
                Ok(body) => json(body),
                Err(e) => {
                    error!("serialising stats snapshot: {e}");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            _ => Response::text(std::env::args().collect::<Vec<_>>().join("\0")),
        };
        Box::pin(ready(res))
    }
}

fn json(body: Vec<u8>) -> Response {
    Response::builder().bytes(ContentType::Json, body)
}

/// Background task logging the whole [`Vars`] document at `info` every time
/// the process receives `SIGUSR1`. Dropping it stops the task.
pub struct SignalDump {
    handle: JoinHandle<()>,
}

impl SignalDump {
    pub fn stop(self) {
        // Drop does the work.
    }
}

impl Drop for SignalDump {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts the `SIGUSR1` dump. On non-Unix targets the task never fires.
///
/// # Errors
///
/// Fails if the signal handler cannot be installed.
pub fn dump_on_signal(vars: Arc<Vars>) -> std::io::Result<SignalDump> {
    #[cfg(unix)]
    let handle = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = signal(SignalKind::user_defined1())?;
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                info!(target: "vigil::debug", vars = %vars.to_json(), "diagnostics dump");
            }
        })
    };

    #[cfg(not(unix))]
    let handle = tokio::spawn(async move {
        let _vars = vars;
        std::future::pending::<()>().await
    });

    Ok(SignalDump { handle })
}
