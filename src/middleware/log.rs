//! Structured request logging.

use std::net::SocketAddr;

use http::{Method, StatusCode, Version};
use tokio::time::Instant;
use tracing::info;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Emits one `info` line per request: status, remote address, protocol,
/// method, URI (with query) and elapsed time.
///
/// The line is written when the request's log entry is dropped, so requests
/// that never produce a response (a downstream panic) are logged too, with
/// the `500` the recovery middleware answers them with.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRequest;

impl Middleware for LogRequest {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let mut entry = Entry::begin(&req);
        Box::pin(async move {
            let res = next.run(req).await;
            entry.record(res.status_code());
            res
        })
    }
}

struct Entry {
    method: Method,
    uri: String,
    remote: Option<SocketAddr>,
    proto: Version,
    start: Instant,
    status: Option<StatusCode>,
}

impl Entry {
    fn begin(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.request_uri().to_owned(),
            remote: req.remote_addr(),
            proto: req.version(),
            start: Instant::now(),
            status: None,
        }
    }

    /// Only the first recorded status counts, the same way only the first
    /// header write reaches the client.
    fn record(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        let status = self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let ip = self.remote.map(|a| a.to_string()).unwrap_or_else(|| "-".to_owned());
        info!(
            status = status.as_u16(),
            ip = %ip,
            proto = ?self.proto,
            method = %self.method,
            uri = %self.uri,
            elapsed = ?self.start.elapsed(),
            completed = self.status.is_some(),
            "request"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::middleware::{Chain, Recover};
    use crate::response::Response;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn subscriber(out: &Captured) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(out.clone())
            .with_ansi(false)
            .finish()
    }

    #[tokio::test]
    async fn logs_status_method_uri_and_remote_address() {
        let out = Captured::default();
        let _guard = tracing::subscriber::set_default(subscriber(&out));

        let handler = Chain::new()
            .append(LogRequest)
            .then(|_req: Request| async { Response::error(StatusCode::NOT_FOUND) });
        let req = Request::new(Method::GET, "/missing?page=2".parse().unwrap())
            .with_remote_addr("10.0.0.7:5100".parse().unwrap());

        let res = handler.call(req).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let line = out.text();
        assert!(line.contains("status=404"), "{line}");
        assert!(line.contains("method=GET"), "{line}");
        assert!(line.contains("uri=/missing?page=2"), "{line}");
        assert!(line.contains("ip=10.0.0.7:5100"), "{line}");
        assert!(line.contains("proto=HTTP/1.1"), "{line}");
    }

    #[tokio::test]
    async fn logging_does_not_alter_the_response() {
        let endpoint = |_req: Request| async { Response::html("<p>hi</p>") };
        let plain = Chain::new().then(endpoint).call(Request::new(Method::GET, "/".parse().unwrap())).await;
        let logged = Chain::new()
            .append(LogRequest)
            .then(endpoint)
            .call(Request::new(Method::GET, "/".parse().unwrap()))
            .await;

        assert_eq!(plain.status_code(), logged.status_code());
        assert_eq!(plain.headers(), logged.headers());
        assert_eq!(plain.body(), logged.body());
    }

    #[tokio::test]
    async fn panicking_requests_are_still_logged() {
        let out = Captured::default();
        let _guard = tracing::subscriber::set_default(subscriber(&out));

        let handler = Chain::new()
            .append(Recover::new())
            .append(LogRequest)
            .then(|_req: Request| async {
                if true {
                    panic!("boom");
                }
                Response::text("unreachable")
            });
        handler.call(Request::new(Method::POST, "/explode".parse().unwrap())).await;

        let text = out.text();
        assert!(text.contains("uri=/explode"), "{text}");
        assert!(text.contains("status=500"), "{text}");
        assert!(text.contains("completed=false"), "{text}");
    }

    #[test]
    fn first_recorded_status_wins() {
        let req = Request::new(Method::GET, "/".parse().unwrap());
        let mut entry = Entry::begin(&req);
        entry.record(StatusCode::SEE_OTHER);
        entry.record(StatusCode::OK);
        assert_eq!(entry.status, Some(StatusCode::SEE_OTHER));
    }
}
