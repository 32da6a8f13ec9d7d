//! Panic recovery.
//!
//! [`Recover`] must be the first middleware of the outermost chain. A panic
//! anywhere below it (handler, decoder, another middleware) is caught, logged
//! with the stack captured at the panic site, and turned into a single
//! `500 Internal Server Error` carrying `Connection: close`. The panic never
//! reaches hyper, so the connection task and the worker thread survive.
//!
//! The stack is captured by a process-wide panic hook that is active only
//! while a recovery frame is being polled on the current thread. Panics
//! outside a frame fall through to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use futures::FutureExt;
use http::header::CONNECTION;
use http::{HeaderValue, StatusCode};
use tracing::error;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

thread_local! {
    static FRAMES: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if FRAMES.with(Cell::get) > 0 {
                LAST_TRACE.with(|t| *t.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as inside a recovery frame while alive.
struct FrameGuard;

impl FrameGuard {
    fn enter() -> Self {
        FRAMES.with(|f| f.set(f.get() + 1));
        Self
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|f| f.set(f.get().saturating_sub(1)));
    }
}

/// Polls the downstream future inside a recovery frame.
struct Framed(BoxFuture);

impl Future for Framed {
    type Output = Response;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Response> {
        let _frame = FrameGuard::enter();
        self.get_mut().0.as_mut().poll(cx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Converts downstream panics into a `500` response.
#[derive(Clone, Copy, Debug)]
pub struct Recover;

impl Recover {
    pub fn new() -> Self {
        install_hook();
        Self
    }
}

impl Default for Recover {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Recover {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let method = req.method().clone();
        let uri = req.uri().clone();
        // Built on first poll so a panic while constructing the rest of the
        // chain happens inside the frame too.
        let downstream = Framed(Box::pin(async move { next.run(req).await }));

        Box::pin(async move {
            match AssertUnwindSafe(downstream).catch_unwind().await {
                Ok(res) => res,
                Err(payload) => {
                    let trace = LAST_TRACE
                        .with(|t| t.borrow_mut().take())
                        .map(|b| b.to_string())
                        .unwrap_or_default();
                    error!(
                        %method,
                        %uri,
                        trace = %trace,
                        "panic: {}",
                        panic_message(payload.as_ref())
                    );

                    let mut res = Response::error(StatusCode::INTERNAL_SERVER_ERROR);
                    res.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
                    res
                }
            }
        })
    }
}
