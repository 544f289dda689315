//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is itself an
//! [`ErasedHandler`], which is what lets middleware wrap the whole routing
//! table (the debug layer, for instance, answers its paths before routing).

use std::collections::HashMap;
use std::future::ready;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and hand it to [`App::new`](crate::App::new) or
/// [`service::wrap`](crate::service::wrap).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Whether some other method has a route for `path`.
    fn matches_other_method(&self, method: &Method, path: &str) -> bool {
        self.routes.iter().any(|(m, tree)| m != method && tree.at(path).is_ok())
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl ErasedHandler for Router {
    fn call(&self, mut req: Request) -> BoxFuture {
        if let Some((handler, params)) = self.lookup(req.method(), req.path()) {
            req.params = params;
            return handler.call(req);
        }
        let status = if self.matches_other_method(req.method(), req.path()) {
            StatusCode::METHOD_NOT_ALLOWED
        } else {
            StatusCode::NOT_FOUND
        };
        Box::pin(ready(Response::status(status)))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn request(method: Method, path: &str) -> Request {
        Request::from_http(
            http::Request::builder().method(method).uri(path).body(Bytes::new()).unwrap(),
        )
    }

    async fn user(req: Request) -> String {
        format!("user {}", req.param("id").unwrap_or("?"))
    }

    async fn created(_req: Request) -> StatusCode {
        StatusCode::CREATED
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let router = Router::new().get("/users/{id}", user).post("/users", created);

        let res = router.call(request(Method::GET, "/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"user 42");

        let res = router.call(request(Method::POST, "/users")).await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn unknown_path_is_404_and_wrong_method_is_405() {
        let router = Router::new().get("/users/{id}", user);

        let res = router.call(request(Method::GET, "/nope")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let res = router.call(request(Method::DELETE, "/users/1")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new().get("/a/{x}", user).get("/a/{y}", user);
    }
}
