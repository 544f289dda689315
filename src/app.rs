//! A router plus its middleware stack.

use crate::handler::{BoxedHandler, ErasedHandler};
use crate::middleware::Layer;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The handler tree served by a [`Server`](crate::Server).
///
/// Each [`layer`](Self::layer) call wraps everything added before it, so the
/// last layer added sees requests first:
///
/// ```rust
/// # use std::sync::Arc;
/// use vigil::middleware::{Metrics, Recovery};
/// use vigil::{App, Router, Stats};
/// # let stats = Arc::new(Stats::new(Default::default()).unwrap());
///
/// // Recovery → Metrics → Router
/// let app = App::new(Router::new())
///     .layer(Metrics::new(stats))
///     .layer(Recovery::new());
/// ```
pub struct App {
    handler: BoxedHandler,
}

impl App {
    pub fn new(router: Router) -> Self {
        Self { handler: std::sync::Arc::new(router) }
    }

    pub fn layer(self, layer: impl Layer) -> Self {
        Self { handler: layer.wrap(self.handler) }
    }

    /// Runs one request through the whole stack.
    pub async fn call(&self, req: Request) -> Response {
        self.handler.call(req).await
    }
}

impl From<Router> for App {
    fn from(router: Router) -> Self {
        Self::new(router)
    }
}
