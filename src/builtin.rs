//! Built-In Collaborator Middleware
//!
//! These are ordinary middleware, plugged into a chain like any other.
//! The body parsers drain the request's bounded body stream and leave the
//! parsed result in the request's `payload` slot; downstream middleware
//! reads it from there. A request without a body stream (no
//! Content-Length) passes through untouched.

use crate::http::{parse_query, Payload, Request, Response};
use crate::routing::{DispatchError, Flow, Middleware};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// JSON body parser.
///
/// Drains the body, parses it as JSON, and stores
/// [`Payload::Json`]. A body that is not valid JSON raises a 400 into
/// the chain.
pub fn json() -> Middleware {
    Middleware::handler(|mut req: Request, res: Response| async move {
        let Some(mut body) = req.take_body() else {
            return (req, res, Ok(Flow::Next));
        };

        let raw = match body.read_to_end().await {
            Ok(raw) => raw,
            Err(err) => {
                let err = DispatchError::new(400, format!("failed to read body: {err}"));
                return (req, res, Err(err));
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => {
                req.payload = Some(Payload::Json(value));
                (req, res, Ok(Flow::Next))
            }
            Err(err) => {
                let err = DispatchError::new(400, format!("invalid JSON body: {err}"));
                (req, res, Err(err))
            }
        }
    })
}

/// Urlencoded form body parser.
///
/// Drains the body and stores the `k=v&k2=v2` pairs as
/// [`Payload::Form`]. Values are not percent-decoded, matching the query
/// parser.
pub fn urlencoded() -> Middleware {
    Middleware::handler(|mut req: Request, res: Response| async move {
        let Some(mut body) = req.take_body() else {
            return (req, res, Ok(Flow::Next));
        };

        match body.read_to_end().await {
            Ok(raw) => {
                let text = String::from_utf8_lossy(&raw);
                req.payload = Some(Payload::Form(parse_query(&text)));
                (req, res, Ok(Flow::Next))
            }
            Err(err) => {
                let err = DispatchError::new(400, format!("failed to read body: {err}"));
                (req, res, Err(err))
            }
        }
    })
}

/// Raw body collector; stores the body bytes verbatim as [`Payload::Raw`].
pub fn raw() -> Middleware {
    Middleware::handler(|mut req: Request, res: Response| async move {
        let Some(mut body) = req.take_body() else {
            return (req, res, Ok(Flow::Next));
        };

        match body.read_to_end().await {
            Ok(raw) => {
                req.payload = Some(Payload::Raw(raw));
                (req, res, Ok(Flow::Next))
            }
            Err(err) => {
                let err = DispatchError::new(400, format!("failed to read body: {err}"));
                (req, res, Err(err))
            }
        }
    })
}

/// Static file middleware rooted at `root`.
///
/// GET requests whose path resolves to a file under the root are served
/// with a content type guessed from the extension; everything else falls
/// through to the next middleware. Paths containing `..` never escape
/// the root.
pub fn serve_static(root: impl Into<PathBuf>) -> Middleware {
    let root = root.into();
    Middleware::handler(move |req: Request, mut res: Response| {
        let root = root.clone();
        async move {
            if req.method() != crate::http::Method::Get {
                return (req, res, Ok(Flow::Next));
            }

            let Some(relative) = sanitize_path(req.path()) else {
                return (req, res, Ok(Flow::Next));
            };
            let mut target = root.join(relative);
            if req.path().ends_with('/') || req.path() == "/" {
                target = target.join("index.html");
            }

            match tokio::fs::read(&target).await {
                Ok(contents) => {
                    debug!(path = %target.display(), "serving static file");
                    res.set("Content-Type", content_type_for(&target));
                    let result = res.send(contents).await;
                    (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
                }
                Err(_) => (req, res, Ok(Flow::Next)),
            }
        }
    })
}

/// Turns a request path into a safe relative path, rejecting any path
/// that tries to climb out of the root.
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(clean)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BodyReader;
    use crate::http::Method;
    use std::net::SocketAddr;

    fn request_with_body(body: &str) -> Request {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let lines = vec![
            "POST /submit HTTP/1.1".to_string(),
            format!("Content-Length: {}", body.len()),
        ];
        let mut req = Request::from_header_lines(&lines, peer).unwrap();

        let mut reader = BodyReader::new(std::io::Cursor::new(body.as_bytes().to_vec()));
        reader.set_limit(body.len() as u64);
        req.attach_body(reader.boxed());
        req
    }

    fn request_without_body(method: &str, path: &str) -> Request {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let line = format!("{method} {path} HTTP/1.1");
        Request::from_header_lines(&[line], peer).unwrap()
    }

    async fn run(mw: Middleware, req: Request) -> (Request, Response, Result<Flow, DispatchError>) {
        let Middleware::Handler(f) = mw else {
            panic!("expected handler middleware");
        };
        f(req, Response::buffered()).await
    }

    #[tokio::test]
    async fn test_json_parser_fills_payload() {
        let req = request_with_body(r#"{"name":"alice","id":7}"#);
        let (req, _, signal) = run(json(), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        let Some(Payload::Json(value)) = &req.payload else {
            panic!("expected JSON payload");
        };
        assert_eq!(value["name"], "alice");
        assert_eq!(value["id"], 7);
    }

    #[tokio::test]
    async fn test_json_parser_rejects_invalid_body() {
        let req = request_with_body("{not json");
        let (_, _, signal) = run(json(), req).await;

        let err = signal.unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn test_json_parser_passes_through_without_body() {
        let req = request_without_body("GET", "/");
        let (req, _, signal) = run(json(), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        assert!(req.payload.is_none());
    }

    #[tokio::test]
    async fn test_urlencoded_parser_fills_form() {
        let req = request_with_body("user=bob&role=admin");
        let (req, _, signal) = run(urlencoded(), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        let Some(Payload::Form(pairs)) = &req.payload else {
            panic!("expected form payload");
        };
        assert_eq!(pairs[0], ("user".to_string(), "bob".to_string()));
        assert_eq!(pairs[1], ("role".to_string(), "admin".to_string()));
    }

    #[tokio::test]
    async fn test_raw_parser_collects_bytes() {
        let req = request_with_body("binary-ish payload");
        let (req, _, signal) = run(raw(), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        let Some(Payload::Raw(bytes)) = &req.payload else {
            panic!("expected raw payload");
        };
        assert_eq!(&bytes[..], b"binary-ish payload");
    }

    #[tokio::test]
    async fn test_serve_static_sends_existing_file() {
        let dir = std::env::temp_dir().join(format!("expresso-static-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hello.txt"), "static hello").unwrap();

        let req = request_without_body("GET", "/hello.txt");
        let (_, res, signal) = run(serve_static(&dir), req).await;

        assert_eq!(signal.unwrap(), Flow::Halt);
        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert!(wire.contains("Content-Type: text/plain\r\n"));
        assert!(wire.ends_with("static hello"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_serve_static_missing_file_falls_through() {
        let dir = std::env::temp_dir();
        let req = request_without_body("GET", "/definitely-not-here-12345.txt");
        let (_, res, signal) = run(serve_static(dir), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        assert!(!res.is_sent());
    }

    #[tokio::test]
    async fn test_serve_static_rejects_parent_traversal() {
        let dir = std::env::temp_dir();
        let req = request_without_body("GET", "/../etc/passwd");
        let (_, res, signal) = run(serve_static(dir), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        assert!(!res.is_sent());
    }

    #[tokio::test]
    async fn test_serve_static_ignores_non_get() {
        let req = request_without_body("POST", "/hello.txt");
        let (req, _, signal) = run(serve_static(std::env::temp_dir()), req).await;

        assert_eq!(signal.unwrap(), Flow::Next);
        assert_eq!(req.method(), Method::Post);
    }
}
