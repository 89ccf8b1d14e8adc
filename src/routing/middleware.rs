//! Middleware Callback Model
//!
//! Middleware callbacks take ownership of the request/response pair and
//! hand it back together with a continuation signal. Threading the pair
//! through by value keeps the callback type object-safe and lets the
//! dispatcher await each step without borrowing across the chain.
//!
//! ## Continuation Signals
//!
//! - `Ok(Flow::Next)`: run the next middleware in the chain
//! - `Ok(Flow::Halt)`: stop the chain, response is (or will be) handled
//! - `Err(e)`: skip remaining normal middleware and jump to the nearest
//!   error middleware
//!
//! Sending the response is an additional implicit stop: the dispatcher
//! checks `Response::is_sent` after every callback.

use crate::http::{Request, Response, ResponseError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// A boxed future, the return type of every middleware callback.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Continuation decision returned by a middleware callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed to the next middleware in the chain.
    Next,
    /// Stop the chain without running anything further.
    Halt,
}

/// What a callback yields: the pair back, plus the continuation signal.
pub type Step = (Request, Response, Result<Flow, DispatchError>);

/// An error raised inside a middleware chain.
///
/// Carries the status and message that reach the wire if no error
/// middleware consumes it first. Internals never cross the wire beyond
/// these two fields.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DispatchError {
    pub status: u16,
    pub message: String,
}

impl DispatchError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ResponseError> for DispatchError {
    fn from(err: ResponseError) -> Self {
        DispatchError::new(500, err.to_string())
    }
}

/// A normal middleware callback.
pub type HandlerFn = Arc<dyn Fn(Request, Response) -> BoxFuture<Step> + Send + Sync>;

/// An error-middleware callback; receives the pending error to consume.
pub type ErrorHandlerFn =
    Arc<dyn Fn(DispatchError, Request, Response) -> BoxFuture<Step> + Send + Sync>;

/// A chain entry: either a normal handler or an error handler.
///
/// The two kinds live in one ordered sequence; which one runs depends on
/// whether an error is pending when the dispatcher reaches it.
#[derive(Clone)]
pub enum Middleware {
    Handler(HandlerFn),
    ErrorHandler(ErrorHandlerFn),
}

impl Middleware {
    /// Wraps an async closure as a normal middleware entry.
    pub fn handler<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        Middleware::Handler(Arc::new(move |req, res| Box::pin(f(req, res))))
    }

    /// Wraps an async closure as an error-middleware entry.
    pub fn error_handler<F, Fut>(f: F) -> Self
    where
        F: Fn(DispatchError, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        Middleware::ErrorHandler(Arc::new(move |err, req, res| Box::pin(f(err, req, res))))
    }

    /// Whether this entry is an error handler.
    pub fn is_error_handler(&self) -> bool {
        matches!(self, Middleware::ErrorHandler(_))
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Middleware::Handler(_) => f.write_str("Middleware::Handler"),
            Middleware::ErrorHandler(_) => f.write_str("Middleware::ErrorHandler"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn request() -> Request {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        Request::from_header_lines(&["GET / HTTP/1.1".to_string()], peer).unwrap()
    }

    #[tokio::test]
    async fn test_handler_yields_pair_and_signal() {
        let mw = Middleware::handler(|req, res| async move { (req, res, Ok(Flow::Next)) });

        let Middleware::Handler(f) = mw else {
            panic!("expected handler variant");
        };
        let (_, _, signal) = f(request(), Response::buffered()).await;
        assert_eq!(signal.unwrap(), Flow::Next);
    }

    #[tokio::test]
    async fn test_error_handler_receives_pending_error() {
        let mw = Middleware::error_handler(|err: DispatchError, req, res| async move {
            assert_eq!(err.status, 418);
            (req, res, Ok(Flow::Halt))
        });

        let Middleware::ErrorHandler(f) = mw else {
            panic!("expected error-handler variant");
        };
        let err = DispatchError::new(418, "teapot");
        let (_, _, signal) = f(err, request(), Response::buffered()).await;
        assert_eq!(signal.unwrap(), Flow::Halt);
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::new(500, "database unavailable");
        assert_eq!(err.to_string(), "database unavailable");
    }

    #[test]
    fn test_response_error_converts_to_500() {
        let err: DispatchError = ResponseError::AlreadySent.into();
        assert_eq!(err.status, 500);
    }
}
