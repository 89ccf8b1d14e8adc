//! Routing and Middleware Engine
//!
//! This module implements the Express-style dispatch model: ordered
//! middleware chains, a first-match route table, mounted sub-routers,
//! and error middleware.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Router                               │
//! │                                                             │
//! │  mounts (in registration order)        routes (in order)    │
//! │  ┌──────────────────────────┐          ┌────────────────┐   │
//! │  │ global middleware        │          │ GET  /users    │   │
//! │  │ scoped middleware /admin │  ──────> │ GET  /users/:id│   │
//! │  │ sub-router at /api ──────┼──┐       │ *    /health   │   │
//! │  └──────────────────────────┘  │       └────────────────┘   │
//! │                                ▼                            │
//! │                   ┌──────────────────────┐                  │
//! │                   │ Router (prefix       │                  │
//! │                   │ stripped from path)  │                  │
//! │                   └──────────────────────┘                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Continuation Model
//!
//! Every middleware callback owns the request/response pair for the
//! duration of its call and yields it back with a signal: continue, stop,
//! or an error. Errors jump over normal middleware to the nearest error
//! middleware; a sent response always stops the chain.
//!
//! ## Example
//!
//! ```ignore
//! use expresso::routing::{Flow, Middleware, Router};
//!
//! let mut router = Router::new();
//! router.get("/users/:id", vec![Middleware::handler(|req, mut res| async move {
//!     let id = req.param("id").unwrap().to_string();
//!     let result = res.send(id).await;
//!     (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
//! })]);
//! ```

pub mod middleware;
pub mod route;
pub mod router;

// Re-export commonly used types
pub use middleware::{BoxFuture, DispatchError, Flow, Middleware, Step};
pub use route::{Route, Segment};
pub use router::{MountCallback, Router};
