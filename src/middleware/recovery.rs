//! Panic recovery.
//!
//! A panicking handler would otherwise tear down the connection task and the
//! client would see a reset connection. This layer turns the panic into a
//! `500 Internal Server Error` whose body carries a random panic id, and logs
//! the same id next to the panic message and backtrace so the two can be
//! correlated.
//!
//! Backtraces are captured by a process-wide panic hook, installed the first
//! time the layer is applied. It chains to the hook already in place.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Layer;
use crate::request::Request;
use crate::response::Response;

/// Recovers panics raised anywhere in the wrapped handler.
#[derive(Default)]
pub struct Recovery {
    _priv: (),
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Recovery {
    fn wrap(self, inner: BoxedHandler) -> BoxedHandler {
        install_backtrace_hook();
        Arc::new(RecoveryHandler { inner })
    }
}

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

fn install_backtrace_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // Fails only while the thread is tearing down its locals.
            let _ = LAST_BACKTRACE.try_with(|bt| {
                if let Ok(mut slot) = bt.try_borrow_mut() {
                    *slot = Some(Backtrace::force_capture());
                }
            });
            previous(info);
        }));
    });
}

/// The backtrace of the latest panic on this thread. `catch_unwind` returns
/// on the thread that panicked, so this is the caught panic's.
fn take_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.with(|bt| bt.borrow_mut().take())
}

struct RecoveryHandler {
    inner: BoxedHandler,
}

impl ErasedHandler for RecoveryHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let inner = Arc::clone(&self.inner);
        let method = req.method().clone();
        let path = req.path().to_owned();

        // `inner.call` runs inside the guarded future, so a panic while
        // building the handler's future is caught as well as one raised
        // while polling it.
        let guarded = AssertUnwindSafe(async move { inner.call(req).await }).catch_unwind();
        Box::pin(async move {
            match guarded.await {
                Ok(res) => res,
                Err(payload) => {
                    let id: u64 = rand::random();
                    let backtrace =
                        take_backtrace().map_or_else(|| "unavailable".to_owned(), |bt| bt.to_string());
                    error!(
                        panic = %format!("{id:016x}"),
                        %method,
                        path = %path,
                        reason = panic_message(payload.as_ref()),
                        %backtrace,
                        "handler panicked"
                    );
                    internal_error(id)
                }
            }
        })
    }
}

fn internal_error(id: u64) -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header("x-content-type-options", "nosniff")
        .text(format!("Internal Server Error\n{id:016x}\n"))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "Box<dyn Any>"
    }
}
