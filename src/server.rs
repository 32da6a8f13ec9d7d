//! HTTP server and graceful shutdown.
//!
//! The server reacts to **SIGTERM** or **Ctrl-C** by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Every request is stamped with a deadline at dispatch
//! ([`Server::request_timeout`], 10 s by default). Middleware and handlers
//! pass it to each store call, so one slow dependency cannot pin a worker.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// 10 MiB, the usual cap for url-encoded form bodies.
const DEFAULT_MAX_BODY_BYTES: usize = 10 << 20;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use snippetbox::Server;
    /// let server = Server::bind("127.0.0.1:4000").unwrap();
    /// # let _ = server;
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|_| Error::Address(addr.to_owned()))?;
        Ok(Self {
            addr,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Budget given to each request, counted from the moment its body has
    /// been read.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Largest request body buffered for a handler. Longer bodies are
    /// answered with `413 Payload Too Large` without reaching the chain.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Binds, then serves `handler` until SIGTERM or Ctrl-C.
    ///
    /// Returns only after a full graceful shutdown: the signal, followed by
    /// every in-flight connection completing.
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with_shutdown(listener, handler, shutdown_signal()).await
    }

    /// Serves `handler` on an already bound `listener` until `signal`
    /// resolves. The address given to [`bind`](Server::bind) is not used.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let handler = handler.into_boxed_handler();
        let timeout = self.request_timeout;
        let limit = self.max_body_bytes;

        info!(addr = %listener.local_addr()?, "snippetbox listening");

        // Every connection task lives here so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Shutdown is checked first so a queued backlog cannot
                // delay it.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = handler.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            dispatch(handler.clone(), req, remote_addr, timeout, limit)
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            warn!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set does not grow
                // without bound.
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("connection task failed: {e}");
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("snippetbox stopped");
        Ok(())
    }
}

/// Buffers one request body, up to `limit` bytes, and runs the handler on it.
///
/// Never fails from hyper's point of view: every outcome, including an
/// unreadable body, is a response.
async fn dispatch(
    handler: BoxedHandler,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    timeout: Duration,
    limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(peer = %remote_addr, limit, "request body too large");
            let mut res = Response::error(http::StatusCode::PAYLOAD_TOO_LARGE);
            res.headers_mut().insert(http::header::CONNECTION, http::HeaderValue::from_static("close"));
            return Ok(res.into_inner());
        }
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::error(http::StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let req = Request::from_parts(parts, body, remote_addr, Instant::now() + timeout);
    Ok(handler.call(req).await.into_inner())
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// other platforms only Ctrl-C is available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
