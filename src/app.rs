//! Application Facade and Server Loop
//!
//! `App` is what user code touches: verb helpers, middleware
//! registration, view engines, and typed configuration, all front-ends
//! over the router. `bind` consumes the `App` and returns a `Server`,
//! which makes route mutation after listen impossible by construction.
//!
//! ## Admission Control
//!
//! The accept loop holds a semaphore of `max_workers` permits and
//! acquires one *before* accepting; a saturated server leaves new
//! connections in the kernel backlog instead of spawning unbounded
//! tasks. Each permit travels into the connection task and is released
//! when the task finishes.

use crate::connection::{handle_connection, ConnectionStats};
use crate::http::Method;
use crate::routing::{Middleware, Router, Step};
use crate::ws::UpgradeRegistry;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Typed application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upper bound on concurrently handled connections.
    pub max_workers: usize,
    /// Directory view templates are resolved under.
    pub views: PathBuf,
    /// Default template extension when a view name carries none.
    pub view_engine: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            views: PathBuf::from("views"),
            view_engine: None,
        }
    }
}

/// Default worker ceiling: four per core, never fewer than two.
pub fn default_workers() -> usize {
    (num_cpus::get() * 4).max(2)
}

/// Errors from view rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The view name resolves to an extension with no registered engine.
    #[error("no view engine registered for extension {0:?}")]
    NoEngine(String),

    /// The view name has no extension and no default engine is set.
    #[error("view {0:?} has no extension and no default view engine is configured")]
    NoExtension(String),

    /// The engine callback failed.
    #[error("view engine failed: {0}")]
    Engine(String),
}

/// A template-engine callback: template path + data in, rendered text out.
pub type ViewEngine =
    Arc<dyn Fn(&Path, &serde_json::Value) -> Result<String, String> + Send + Sync>;

/// The application: router, configuration, view engines, and the shared
/// upgrade registry.
pub struct App {
    router: Router,
    config: AppConfig,
    engines: HashMap<String, ViewEngine>,
    registry: Arc<UpgradeRegistry>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            router: Router::new(),
            config,
            engines: HashMap::new(),
            registry: Arc::new(UpgradeRegistry::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The registry upgraded WebSocket connections land in.
    pub fn upgrade_registry(&self) -> Arc<UpgradeRegistry> {
        self.registry.clone()
    }

    /// Registers a single-handler route; the common case.
    fn verb<F, Fut>(&mut self, method: Option<Method>, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.router
            .route(method, path, vec![Middleware::handler(handler)]);
    }

    pub fn get<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.verb(Some(Method::Get), path, handler);
    }

    pub fn post<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.verb(Some(Method::Post), path, handler);
    }

    pub fn put<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.verb(Some(Method::Put), path, handler);
    }

    pub fn patch<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.verb(Some(Method::Patch), path, handler);
    }

    pub fn delete<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.verb(Some(Method::Delete), path, handler);
    }

    /// Registers a handler for every method on `path`.
    pub fn all<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(crate::http::Request, crate::http::Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Step> + Send + 'static,
    {
        self.verb(None, path, handler);
    }

    /// Registers a route with a full middleware chain.
    pub fn route(&mut self, method: Option<Method>, path: &str, chain: Vec<Middleware>) {
        self.router.route(method, path, chain);
    }

    /// Registers middleware that runs for every request.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.router.use_middleware(middleware);
    }

    /// Registers middleware scoped to requests under `path`.
    pub fn use_path(&mut self, path: &str, middleware: Middleware) {
        self.router.use_path(path, middleware);
    }

    /// Mounts a sub-router under `path`.
    pub fn mount(&mut self, path: &str, router: Router) {
        self.router.mount(path, router);
    }

    /// Registers application-level error middleware.
    pub fn use_error(&mut self, middleware: Middleware) {
        self.router.use_error(middleware);
    }

    /// Registers a view engine for a template extension.
    pub fn engine<F>(&mut self, extension: &str, callback: F)
    where
        F: Fn(&Path, &serde_json::Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.engines
            .insert(extension.trim_start_matches('.').to_string(), Arc::new(callback));
    }

    /// Renders a view to a string; the caller decides how to send it.
    ///
    /// The extension comes from the view name, falling back to the
    /// configured default; the template path resolves under the views
    /// directory.
    pub fn render(&self, name: &str, data: &serde_json::Value) -> Result<String, RenderError> {
        let (file, extension) = match name.rsplit_once('.') {
            Some((_, ext)) => (name.to_string(), ext.to_string()),
            None => {
                let ext = self
                    .config
                    .view_engine
                    .clone()
                    .ok_or_else(|| RenderError::NoExtension(name.to_string()))?;
                (format!("{name}.{ext}"), ext)
            }
        };

        let engine = self
            .engines
            .get(&extension)
            .ok_or(RenderError::NoEngine(extension))?;
        let path = self.config.views.join(file);
        engine(&path, data).map_err(RenderError::Engine)
    }

    /// Binds a listener and freezes the application into a `Server`.
    ///
    /// Consuming `self` is what guarantees no route registration can
    /// happen once the server is reachable.
    pub async fn bind(self, addr: impl ToSocketAddrs) -> std::io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, workers = self.config.max_workers, "server bound");

        Ok(Server {
            listener,
            limiter: Arc::new(Semaphore::new(self.config.max_workers)),
            router: Arc::new(self.router),
            registry: self.registry,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    /// Binds `0.0.0.0:port` and runs the accept loop.
    pub async fn listen(self, port: u16) -> std::io::Result<()> {
        let server = self.bind(("0.0.0.0", port)).await?;
        server.run().await;
        Ok(())
    }
}

/// A bound, immutable application driving the accept loop.
pub struct Server {
    listener: TcpListener,
    limiter: Arc<Semaphore>,
    router: Arc<Router>,
    registry: Arc<UpgradeRegistry>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.stats.clone()
    }

    pub fn upgrade_registry(&self) -> Arc<UpgradeRegistry> {
        self.registry.clone()
    }

    /// Accept loop: acquire a permit, accept, spawn.
    ///
    /// Runs until the listener fails fatally; individual accept errors
    /// are logged and retried.
    pub async fn run(self) {
        loop {
            let Ok(permit) = self.limiter.clone().acquire_owned().await else {
                break;
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let router = self.router.clone();
                    let registry = self.registry.clone();
                    let stats = self.stats.clone();

                    tokio::spawn(async move {
                        handle_connection(stream, addr, router, registry, stats).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
