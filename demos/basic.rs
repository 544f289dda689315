//! A small JSON service behind the full operations stack.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl http://localhost:3000/slow
//!   curl http://localhost:3000/boom
//!   curl http://localhost:3000/debug/stats
//!   curl http://localhost:3000/debug/vars
//!   kill -USR1 <pid>     # dumps the vars to the log
//!
//! Pass a YAML file as the first argument to override the defaults.

use std::time::Duration;

use http::StatusCode;
use tracing_subscriber::EnvFilter;
use vigil::config::ServiceConfig;
use vigil::{Request, Response, Router, Server, service};

#[tokio::main]
async fn main() -> vigil::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::load_from_file(path)?,
        None => ServiceConfig {
            debug: vigil::config::DebugConfig { enabled: true, dump_on_signal: true },
            ..ServiceConfig::default()
        },
    };

    let router = Router::new()
        .get("/users/{id}", get_user)
        .post("/users", create_user)
        .get("/slow", slow)
        .get("/boom", boom);

    let (app, ops) = service::wrap(router, tokio::io::stdout(), &config)?;
    ops.vars().publish("version", || env!("CARGO_PKG_VERSION").into())?;

    Server::bind("0.0.0.0:3000").serve(app).await?;
    ops.shutdown().await?;
    Ok(())
}

async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(br#"{"id":"99","name":"new_user"}"#.to_vec())
}

// Somewhere between 10 and 250 ms, to give the quantiles something to show.
async fn slow(_req: Request) -> Response {
    let ms = 10 + rand::random::<u64>() % 240;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Response::text(format!("slept {ms}ms"))
}

async fn boom(_req: Request) -> Response {
    panic!("boom requested")
}
