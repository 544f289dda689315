//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Each layer wraps the handler tree built so far and
//! returns a new one:
//!
//! | Layer | Concern |
//! |---|---|
//! | [`Metrics`] | request/response counters, latency samples |
//! | [`Debug`] | `/debug/vars`, `/debug/stats`, `/debug/cmdline` |
//! | [`Recovery`] | panics → `500` with a loggable panic id |
//! | [`AccessLog`] | one combined-log-format line per request |
//!
//! [`service::wrap`](crate::service::wrap) stacks all four in the
//! recommended order.

pub mod access_log;
pub mod debug;
mod metrics;
mod recovery;

pub use access_log::{AccessLog, AccessLogWriter, Clock, SystemClock};
pub use debug::Debug;
pub use metrics::Metrics;
pub use recovery::Recovery;

use crate::handler::BoxedHandler;

/// Wraps a handler in another handler.
pub trait Layer {
    fn wrap(self, inner: BoxedHandler) -> BoxedHandler;
}
