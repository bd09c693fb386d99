//! Request ID middleware.
//!
//! Every request leaves this middleware with an `X-Request-ID` header. An
//! id supplied by the client is kept; otherwise one is generated (UUID v7
//! unless a custom generator is configured). The id is:
//!
//! - written to the request header, so [`Context::request_id`] sees it
//! - attached to a child span, so every downstream log event carries it
//! - echoed on the response

use std::fmt;
use std::sync::Arc;

use ivy::{BoxFuture, BoxedHandler, Context, Handler, HandlerResult, REQUEST_ID_HEADER};
use uuid::Uuid;

type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// Middleware that ensures every request has an id.
///
/// # Example
///
/// ```
/// use ivy::Router;
/// use ivy_middleware::RequestId;
///
/// let mut router = Router::new();
/// router.use_middleware([RequestId::new().into_handler()]);
/// ```
#[derive(Clone)]
pub struct RequestId {
    generator: Generator,
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestId {
    /// Creates the middleware with UUID v7 ids.
    #[must_use]
    pub fn new() -> Self {
        Self::with_generator(|| Uuid::now_v7().to_string())
    }

    /// Creates the middleware with a custom id generator.
    #[must_use]
    pub fn with_generator<F>(generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            generator: Arc::new(generator),
        }
    }

    /// Boxes the middleware for registration on a router.
    #[must_use]
    pub fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }

    async fn process(&self, ctx: &mut Context) -> HandlerResult {
        let id = match ctx.request_id() {
            Some(id) => id.to_string(),
            None => {
                let id = (self.generator)();
                ctx.set_request_id(&id)?;
                id
            }
        };

        let span = tracing::debug_span!(parent: ctx.span(), "ivy.request", request_id = %id);
        ctx.set_span(span);
        ctx.set_header(REQUEST_ID_HEADER, id.as_str())?;
        ctx.next().await
    }
}

impl Handler for RequestId {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.process(ctx))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestId").finish_non_exhaustive()
    }
}

/// Request ID middleware with UUID v7 ids.
#[must_use]
pub fn request_id() -> BoxedHandler {
    RequestId::new().into_handler()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivy::{handler, Router};
    use ivy_test::TestClient;

    fn echo_id() -> BoxedHandler {
        handler(|ctx: &mut Context| {
            Box::pin(async move {
                let id = ctx.request_id().unwrap_or("none").to_string();
                ctx.send_string(id)
            })
        })
    }

    fn client(middleware: RequestId) -> TestClient {
        let mut router = Router::new();
        router.use_middleware([middleware.into_handler()]);
        router.get("/", [echo_id()]);
        TestClient::new(router)
    }

    #[tokio::test]
    async fn test_generates_uuid_v7_when_missing() {
        let response = client(RequestId::new()).get("/").send().await;
        let body = response.text().unwrap();
        let id = Uuid::parse_str(&body).unwrap();
        assert_eq!(id.get_version_num(), 7);
        assert_eq!(response.header_str(REQUEST_ID_HEADER), Some(body.as_str()));
    }

    #[tokio::test]
    async fn test_keeps_incoming_id() {
        let response = client(RequestId::new())
            .get("/")
            .header(REQUEST_ID_HEADER, "abc123")
            .send()
            .await;
        response
            .assert_body_eq("abc123")
            .assert_header(REQUEST_ID_HEADER, "abc123");
    }

    #[tokio::test]
    async fn test_custom_generator() {
        let response = client(RequestId::with_generator(|| "fixed-id".to_string()))
            .get("/")
            .send()
            .await;
        response.assert_body_eq("fixed-id");
    }

    #[tokio::test]
    async fn test_invalid_generated_id_is_an_error() {
        let response = client(RequestId::with_generator(|| "bad\nid".to_string()))
            .get("/")
            .send()
            .await;
        response.assert_status(http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
