use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;

use super::{client_error, App};
use crate::error::server_error;
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Resolves a `/static/{*path}` capture inside `root`. Directory-style
/// requests and anything that could climb out of `root` resolve to nothing.
fn resolve(root: &Path, raw: &str, request_path: &str) -> Option<PathBuf> {
    if raw.is_empty() || request_path.ends_with('/') || raw.contains('\\') {
        return None;
    }
    if !raw.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..") {
        return None;
    }
    let rel = Path::new(raw);
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(root.join(rel))
}

pub(super) async fn serve(app: Arc<App>, req: Request) -> Response {
    let Some(path) = resolve(&app.static_dir, req.param("path").unwrap_or(""), req.path()) else {
        return client_error(StatusCode::NOT_FOUND);
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return client_error(StatusCode::NOT_FOUND),
        Err(e) if e.kind() == ErrorKind::NotFound => return client_error(StatusCode::NOT_FOUND),
        Err(e) => return server_error(req.method(), req.uri(), &e.into()),
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            Response::builder().bytes(ContentType::from_extension(ext), bytes)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => client_error(StatusCode::NOT_FOUND),
        Err(e) => server_error(req.method(), req.uri(), &e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plain_relative_paths_resolve() {
        let root = Path::new("/srv/static");
        assert_eq!(resolve(root, "css/main.css", "/static/css/main.css"), Some(root.join("css/main.css")));
        assert_eq!(resolve(root, "", "/static/"), None);
        assert_eq!(resolve(root, "css/", "/static/css/"), None);
        assert_eq!(resolve(root, "../secret", "/static/../secret"), None);
        assert_eq!(resolve(root, "css/./main.css", "/static/css/./main.css"), None);
        assert_eq!(resolve(root, "/etc/passwd", "/static//etc/passwd"), None);
        assert_eq!(resolve(root, "a\\..\\b", "/static/a\\..\\b"), None);
    }
}
