//! Test client for in-memory dispatch.

use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use ivy::{BufferedResponse, Endpoint};
use serde::Serialize;

use crate::error::TestError;
use crate::request::TestRequestBuilder;
use crate::response::TestResponse;

/// Sends requests straight into an [`Endpoint`] without a socket.
///
/// The request goes through the endpoint's complete pipeline: a
/// [`Router`](ivy::Router) runs its middlewares, mounts and error handler
/// exactly as it would behind a server.
///
/// # Example
///
/// ```
/// use ivy::{handler, Context, Router};
/// use ivy_test::TestClient;
///
/// # tokio_test::block_on(async {
/// let mut router = Router::new();
/// router.get("/ping", [handler(|ctx: &mut Context| {
///     Box::pin(async move { ctx.send_string("pong") })
/// })]);
///
/// let client = TestClient::new(router);
/// let response = client.get("/ping").send().await;
/// assert_eq!(response.text().unwrap(), "pong");
/// # });
/// ```
#[must_use]
#[derive(Clone)]
pub struct TestClient {
    endpoint: Arc<dyn Endpoint>,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Creates a client for `endpoint`.
    pub fn new<E: Endpoint>(endpoint: E) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            default_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Creates a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Creates a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Creates a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Creates a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// Creates a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Creates a HEAD request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::HEAD, uri)
    }

    /// Creates an OPTIONS request.
    pub fn options(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::OPTIONS, uri)
    }

    /// Creates a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let builder = self
            .default_headers
            .iter()
            .fold(TestRequestBuilder::new(method, uri), |b, (name, value)| {
                b.header(name, value)
            });
        TestClientRequest {
            client: self,
            builder,
        }
    }

    /// Dispatches a prepared request.
    pub async fn send_request(&self, request: ivy::Request) -> Result<TestResponse, TestError> {
        let writer = self.endpoint.serve(request, BufferedResponse::boxed()).await;
        TestResponse::from_http(writer.into_response()).await
    }
}

/// A request builder bound to a [`TestClient`].
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    /// Sets a header on the request.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the Content-Type header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets the Authorization header with a Bearer token.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Sets the Authorization header with HTTP Basic credentials.
    pub fn basic_auth(mut self, user: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        self.builder = self.builder.basic_auth(user, password);
        self
    }

    /// Adds a cookie.
    pub fn cookie(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.cookie(name, value);
        self
    }

    /// Sets the raw request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets the request body as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets the request body as a urlencoded form.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Sends the request and returns the response.
    ///
    /// # Panics
    ///
    /// Panics if the request could not be built. Use
    /// [`try_send`](Self::try_send) to handle that case.
    pub async fn send(self) -> TestResponse {
        self.try_send().await.expect("request should be dispatched")
    }

    /// Sends the request and returns a Result.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.send_request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use ivy::endpoint_fn;
    use serde_json::json;

    fn echo() -> TestClient {
        TestClient::new(endpoint_fn(|req, w| {
            let body = json!({
                "method": req.method().as_str(),
                "path": req.uri().path(),
                "custom": req.headers().get("x-custom").and_then(|v| v.to_str().ok()),
                "content_type": req.headers().get("content-type").and_then(|v| v.to_str().ok()),
            });
            w.write(body.to_string().as_bytes());
        }))
    }

    #[tokio::test]
    async fn test_echo_client() {
        let response = echo().get("/test/path").send().await;
        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["path"], "/test/path");
    }

    #[tokio::test]
    async fn test_default_headers() {
        let client = echo().with_default_header("X-Custom", "default-value");
        let value: serde_json::Value = client.delete("/x").send().await.json().unwrap();
        assert_eq!(value["custom"], "default-value");
        assert_eq!(value["method"], "DELETE");
    }

    #[tokio::test]
    async fn test_json_body_sets_content_type() {
        let value: serde_json::Value = echo()
            .post("/users")
            .json(&json!({"name": "Alice"}))
            .send()
            .await
            .json()
            .unwrap();
        assert_eq!(value["content_type"], "application/json");
    }

    #[tokio::test]
    async fn test_custom_method() {
        let method = Method::from_bytes(b"PURGE").unwrap();
        let value: serde_json::Value = echo().request(method, "/c").send().await.json().unwrap();
        assert_eq!(value["method"], "PURGE");
    }

    #[tokio::test]
    async fn test_try_send_reports_build_errors() {
        let err = echo().get("/").header("bad header", "v").try_send().await.unwrap_err();
        assert!(matches!(err, TestError::InvalidHeader(_)));
    }
}
