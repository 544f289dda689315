//! # vigil
//!
//! Operational middleware for HTTP services, plus the small hyper-based
//! framework it plugs into.
//!
//! Wrap a [`Router`] with [`service::wrap`] and every request is:
//!
//! - counted on the way in and out, with its duration sampled into a
//!   windowed latency digest ([`latency`]) reporting P50 through P999 over
//!   roughly the last `windows × rotation_period` of traffic
//! - protected from handler panics, which become a `500` with a panic id
//! - written to an Apache combined-format access log off the request path
//!
//! and the process serves `/debug/vars`, `/debug/stats` and `/debug/cmdline`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vigil::config::ServiceConfig;
//! use vigil::{service, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> vigil::Result<()> {
//!     let router = Router::new()
//!         .get("/users/{id}", get_user)
//!         .post("/users", create_user);
//!
//!     let (app, ops) = service::wrap(router, tokio::io::stdout(), &ServiceConfig::default())?;
//!     Server::bind("0.0.0.0:3000").serve(app).await?;
//!     ops.shutdown().await?;
//!     Ok(())
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(http::StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(http::StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .json(req.body().to_vec())
//! }
//! ```
//!
//! ## Logging
//!
//! vigil emits [`tracing`] events and never installs a subscriber; that is
//! up to the binary. Panics are logged at `error`, the signal-triggered vars
//! dump at `info` under the `vigil::debug` target.

mod app;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod stats;

pub mod config;
pub mod fds;
pub mod latency;
pub mod middleware;
pub mod service;
pub mod vars;

pub use app::App;
pub use error::{Error, Result};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use stats::{Stats, StatsSnapshot};
pub use vars::Vars;
