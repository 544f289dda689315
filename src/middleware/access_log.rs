//! Access logging in Apache combined log format.
//!
//! Each request produces one line, with the elapsed milliseconds appended:
//!
//! ```text
//! 127.0.0.1 - - [03/Jun/2014:16:45:22 +0000] "GET / HTTP/1.1" 200 13 "-" "curl/8.0" 1007
//! ```
//!
//! Request handling never touches the output. Lines go through a bounded
//! channel to a background task that owns the writer; when the channel is
//! full the line is dropped and counted rather than stalling the request.

use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::AccessLogConfig;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Layer;
use crate::request::Request;

const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Source of wall-clock time for log timestamps and elapsed time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The access-log layer. Cheap to clone; every clone feeds the same writer.
#[derive(Clone)]
pub struct AccessLog {
    tx: mpsc::Sender<String>,
    clock: Arc<dyn Clock>,
    dropped: Arc<AtomicU64>,
}

/// Owns the background task writing log lines.
///
/// Call [`stop`](Self::stop) to flush and get the writer back. Dropping it
/// instead lets the task run until every [`AccessLog`] clone is gone.
pub struct AccessLogWriter<W> {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<io::Result<W>>,
}

impl AccessLog {
    /// Starts a writer task for `out` using the system clock.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<W>(out: W, config: &AccessLogConfig) -> (Self, AccessLogWriter<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_clock(out, config, SystemClock)
    }

    pub fn with_clock<W>(
        out: W,
        config: &AccessLogConfig,
        clock: impl Clock,
    ) -> (Self, AccessLogWriter<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(write_lines(rx, out, stop_rx));

        let log = Self { tx, clock: Arc::new(clock), dropped: Arc::new(AtomicU64::new(0)) };
        let writer = AccessLogWriter { stop: Some(stop_tx), task };
        (log, writer)
    }

    /// Lines discarded because the writer could not keep up (or has stopped).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn submit(&self, line: String) {
        if self.tx.try_send(line).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(dropped, "access log line dropped");
        }
    }
}

impl<W> AccessLogWriter<W> {
    /// Writes every line already queued, flushes, and returns the writer.
    pub async fn stop(mut self) -> io::Result<W> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match (&mut self.task).await {
            Ok(res) => res,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

async fn write_lines<W>(
    mut rx: mpsc::Receiver<String>,
    mut out: W,
    mut stop: oneshot::Receiver<()>,
) -> io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    // Cleared once the `AccessLogWriter` is dropped without stopping.
    let mut stoppable = true;
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => out.write_all(line.as_bytes()).await?,
                None => break,
            },
            res = &mut stop, if stoppable => match res {
                Ok(()) => {
                    rx.close();
                    while let Some(line) = rx.recv().await {
                        out.write_all(line.as_bytes()).await?;
                    }
                    break;
                }
                Err(_) => stoppable = false,
            },
        }
    }
    out.flush().await?;
    Ok(out)
}

impl Layer for AccessLog {
    fn wrap(self, inner: BoxedHandler) -> BoxedHandler {
        Arc::new(AccessLogHandler { log: self, inner })
    }
}

struct AccessLogHandler {
    log: AccessLog,
    inner: BoxedHandler,
}

impl ErasedHandler for AccessLogHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let log = self.log.clone();
        let inner = Arc::clone(&self.inner);
        let start = log.clock.now();
        let head = RequestHead::of(&req);

        Box::pin(async move {
            let res = inner.call(req).await;
            let end = log.clock.now();
            let line = head.format(start, end, res.status_code().as_u16(), res.body().len());
            log.submit(line);
            res
        })
    }
}

/// The request fields logged once the response is known.
struct RequestHead {
    remote: Option<IpAddr>,
    request_line: String,
    referer: Option<String>,
    user_agent: Option<String>,
}

impl RequestHead {
    fn of(req: &Request) -> Self {
        Self {
            remote: req.remote_addr().map(|a| a.ip()),
            request_line: format!("{} {} {:?}", req.method(), req.uri(), req.version()),
            referer: req.header("referer").map(str::to_owned),
            user_agent: req.header("user-agent").map(str::to_owned),
        }
    }

    fn format(&self, start: DateTime<Utc>, end: DateTime<Utc>, status: u16, bytes: usize) -> String {
        let remote = self.remote.map_or_else(|| "-".to_owned(), |ip| ip.to_string());
        let elapsed_ms = (end - start).num_milliseconds().max(0);
        format!(
            "{remote} - - [{}] \"{}\" {status} {bytes} \"{}\" \"{}\" {elapsed_ms}\n",
            start.format(TIME_FORMAT),
            escape(&self.request_line),
            self.referer.as_deref().map_or_else(|| "-".to_owned(), escape),
            self.user_agent.as_deref().map_or_else(|| "-".to_owned(), escape),
        )
    }
}

/// Escapes quotes and backslashes so a field cannot break out of its quotes.
fn escape(field: &str) -> String {
    field.replace('\\', "\\\\").replace('"', "\\\"")
}
