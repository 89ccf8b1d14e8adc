//! Route Table and Middleware Dispatch
//!
//! The router owns everything registered against the application: global
//! and path-scoped middleware, mounted sub-routers, routes, and
//! router-level error middleware. Registration order is preserved and is
//! the evaluation order; among routes, the first match wins.
//!
//! ## Dispatch Walk
//!
//! ```text
//!   mounts (global mw, scoped mw, sub-routers) ──> first matching route
//!        │                                              │
//!        └──── pending error? skip handlers, ───────────┘
//!              run nearest error middleware
//! ```
//!
//! An error raised in any chain skips the remaining normal middleware and
//! runs at the nearest error-middleware entry further down the same walk.
//! An error that survives the walk falls through to the router-level error
//! middleware, and if still unconsumed becomes a minimal status response.
//!
//! Sub-routers see the request path with the mount prefix stripped; the
//! original path is restored when the sub-router returns. Parameters bound
//! by a sub-router merge into the request's parameter map.

use crate::http::{Method, Request, Response};
use crate::routing::middleware::{DispatchError, Flow, Middleware};
use crate::routing::route::Route;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked when a router is mounted into a parent.
pub type MountCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// An entry in the mount list, evaluated before the route table.
enum MountEntry {
    /// Runs for every request.
    Global(Middleware),
    /// Runs when the request path falls under `path`.
    Scoped { path: String, middleware: Middleware },
    /// Delegates to a sub-router with the prefix stripped.
    Router { path: String, router: Router },
}

/// State threaded through one dispatch walk.
struct Walk {
    req: Request,
    res: Response,
    pending: Option<DispatchError>,
    stopped: bool,
}

/// The route table and middleware registry.
#[derive(Default)]
pub struct Router {
    mounts: Vec<MountEntry>,
    routes: Vec<Route>,
    error_handlers: Vec<Middleware>,
    mount_path: String,
    mount_callbacks: Vec<MountCallback>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route for one method, or every method when `method`
    /// is `None`.
    pub fn route(&mut self, method: Option<Method>, pattern: &str, chain: Vec<Middleware>) {
        self.routes.push(Route::new(method, pattern, chain));
    }

    pub fn get(&mut self, pattern: &str, chain: Vec<Middleware>) {
        self.route(Some(Method::Get), pattern, chain);
    }

    pub fn post(&mut self, pattern: &str, chain: Vec<Middleware>) {
        self.route(Some(Method::Post), pattern, chain);
    }

    pub fn put(&mut self, pattern: &str, chain: Vec<Middleware>) {
        self.route(Some(Method::Put), pattern, chain);
    }

    pub fn patch(&mut self, pattern: &str, chain: Vec<Middleware>) {
        self.route(Some(Method::Patch), pattern, chain);
    }

    pub fn delete(&mut self, pattern: &str, chain: Vec<Middleware>) {
        self.route(Some(Method::Delete), pattern, chain);
    }

    /// Registers a wildcard route matching every method.
    pub fn all(&mut self, pattern: &str, chain: Vec<Middleware>) {
        self.route(None, pattern, chain);
    }

    /// Registers middleware that runs for every request.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.mounts.push(MountEntry::Global(middleware));
    }

    /// Registers middleware that runs for requests under `path`.
    pub fn use_path(&mut self, path: &str, middleware: Middleware) {
        self.mounts.push(MountEntry::Scoped {
            path: path.to_string(),
            middleware,
        });
    }

    /// Mounts a sub-router under `path`.
    ///
    /// The sub-router's mount path is set and its mount callbacks fire
    /// immediately. During dispatch it sees request paths with the prefix
    /// stripped.
    pub fn mount(&mut self, path: &str, mut router: Router) {
        router.mount_path = path.to_string();
        for cb in &router.mount_callbacks {
            cb(path);
        }
        self.mounts.push(MountEntry::Router {
            path: path.to_string(),
            router,
        });
    }

    /// Registers router-level error middleware, the last stop for errors
    /// no chain-level error middleware consumed.
    pub fn use_error(&mut self, middleware: Middleware) {
        self.error_handlers.push(middleware);
    }

    /// Registers a callback fired when this router is mounted.
    pub fn on_mount<F>(&mut self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.mount_callbacks.push(Arc::new(callback));
    }

    /// Overrides the mount path without re-mounting.
    pub fn set_mount_path(&mut self, path: &str) {
        self.mount_path = path.to_string();
    }

    /// The path this router is mounted under; empty at the top level.
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Runs the full dispatch walk for one request.
    ///
    /// On return the response is either sent (by some middleware or by
    /// the unhandled-error fallback) or untouched, in which case the
    /// connection handler owns the no-route default.
    pub async fn dispatch(&self, req: Request, res: Response) -> (Request, Response) {
        let mut walk = self
            .walk(Walk {
                req,
                res,
                pending: None,
                stopped: false,
            })
            .await;

        // Router-level error middleware is the last chance to consume a
        // pending error before the minimal fallback response.
        if walk.pending.is_some() && !walk.res.is_sent() {
            walk.stopped = false;
            walk = self.run_chain(&self.error_handlers, walk).await;
        }

        if let Some(err) = walk.pending.take() {
            if !walk.res.is_sent() {
                warn!(status = err.status, "unhandled middleware error");
                walk.res.status(err.status);
                if let Err(send_err) = walk.res.send(err.message).await {
                    warn!(error = %send_err, "failed to send error response");
                }
            }
        }

        (walk.req, walk.res)
    }

    /// Walks mounts then routes. Boxed for recursion into sub-routers.
    fn walk<'a>(&'a self, mut state: Walk) -> Pin<Box<dyn Future<Output = Walk> + Send + 'a>> {
        Box::pin(async move {
            for entry in &self.mounts {
                if state.stopped || state.res.is_sent() {
                    return state;
                }
                match entry {
                    MountEntry::Global(mw) => {
                        state = self.run_chain(std::slice::from_ref(mw), state).await;
                    }
                    MountEntry::Scoped { path, middleware } => {
                        if strip_mount_prefix(state.req.path(), path).is_some() {
                            state = self
                                .run_chain(std::slice::from_ref(middleware), state)
                                .await;
                        }
                    }
                    MountEntry::Router { path, router } => {
                        let Some(rest) = strip_mount_prefix(state.req.path(), path) else {
                            continue;
                        };
                        let rest = rest.to_string();
                        let original = state.req.path().to_string();
                        debug!(mount = %path, inner = %rest, "delegating to sub-router");

                        state.req.set_path(rest);
                        state = router.walk(state).await;

                        // A pending error gets one pass at this
                        // sub-router's own error middleware (still under
                        // the stripped path) before bubbling up.
                        if state.pending.is_some() && !state.res.is_sent() {
                            state.stopped = false;
                            state = router.run_chain(&router.error_handlers, state).await;
                        }

                        state.req.set_path(original);
                    }
                }
            }

            if state.stopped || state.res.is_sent() {
                return state;
            }

            for route in &self.routes {
                let Some(params) = route.matches(state.req.method(), state.req.path()) else {
                    continue;
                };
                for (name, value) in params {
                    state.req.insert_param(name, value);
                }
                return self.run_chain(route.middleware(), state).await;
            }

            state
        })
    }

    /// Executes one middleware chain with the error-jump semantics.
    ///
    /// While no error is pending, error-handler entries are skipped; once
    /// one is pending, normal handlers are skipped until an error handler
    /// consumes it. A sent response stops the chain after any callback.
    async fn run_chain(&self, chain: &[Middleware], mut state: Walk) -> Walk {
        for middleware in chain {
            if state.stopped || state.res.is_sent() {
                state.stopped = true;
                return state;
            }

            let signal = match (middleware, state.pending.take()) {
                (Middleware::Handler(f), None) => {
                    let (req, res, signal) = f(state.req, state.res).await;
                    state.req = req;
                    state.res = res;
                    signal
                }
                (Middleware::Handler(_), Some(err)) => {
                    // error pending: jump over normal middleware
                    state.pending = Some(err);
                    continue;
                }
                (Middleware::ErrorHandler(f), Some(err)) => {
                    let (req, res, signal) = f(err, state.req, state.res).await;
                    state.req = req;
                    state.res = res;
                    signal
                }
                (Middleware::ErrorHandler(_), None) => continue,
            };

            match signal {
                Ok(Flow::Next) => {}
                Ok(Flow::Halt) => {
                    state.stopped = true;
                    return state;
                }
                Err(err) => state.pending = Some(err),
            }
        }

        state
    }
}

/// Strips a mount prefix from a request path.
///
/// Matches only at a segment boundary: `/api` covers `/api` and
/// `/api/users` but not `/apiary`. An exhausted path becomes `/` so the
/// sub-router still sees a rooted path. A prefix of `/` or empty covers
/// everything.
fn strip_mount_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() || prefix == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("mounts", &self.mounts.len())
            .field("routes", &self.routes.len())
            .field("error_handlers", &self.error_handlers.len())
            .field("mount_path", &self.mount_path)
            .finish()
    }
}
