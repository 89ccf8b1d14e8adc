//! Route Patterns and Matching
//!
//! A route pairs a method (or a wildcard matching every method) with a
//! path pattern and the middleware chain to run on a match. Patterns are
//! split into segments at registration time, so matching a request is a
//! single zip over pre-parsed segments.

use crate::http::Method;
use crate::routing::middleware::Middleware;
use std::collections::HashMap;

/// One pre-parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly (case-sensitive).
    Literal(String),
    /// Binds any non-empty request segment under this name (`:id`).
    Param(String),
}

/// A registered route: method filter, pattern, middleware chain.
pub struct Route {
    /// `None` matches every method.
    method: Option<Method>,
    segments: Vec<Segment>,
    middleware: Vec<Middleware>,
}

/// Splits a path into its non-empty segments.
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Route {
    /// Parses `pattern` into segments and builds the route.
    ///
    /// Segments starting with `:` become named parameters; everything
    /// else is a literal. Parameter names are derived here, once.
    pub fn new(method: Option<Method>, pattern: &str, middleware: Vec<Middleware>) -> Self {
        let segments = path_segments(pattern)
            .map(|seg| match seg.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(seg.to_string()),
            })
            .collect();

        Self {
            method,
            segments,
            middleware,
        }
    }

    /// The middleware chain to run when this route matches.
    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    /// Tests this route against a request, binding path parameters on a
    /// match.
    ///
    /// Matching requires the same segment count, literal equality for
    /// literal segments, and a non-empty request segment for each
    /// parameter. Returns the bound parameters, empty when the pattern
    /// has none.
    pub fn matches(&self, method: Method, path: &str) -> Option<HashMap<String, String>> {
        if let Some(own) = self.method {
            if own != method {
                return None;
            }
        }

        let request_segments: Vec<&str> = path_segments(path).collect();
        if request_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(&request_segments) {
            match pattern {
                Segment::Literal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }

        Some(params)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("segments", &self.segments)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
