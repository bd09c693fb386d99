//! HTTP Basic authentication.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use ivy::{BoxFuture, BoxedHandler, Context, Handler, HandlerResult};
use subtle::ConstantTimeEq;

/// Middleware that admits requests carrying known Basic credentials.
///
/// Rejected requests get `401 Unauthorized` with a
/// `WWW-Authenticate: Basic realm="..."` challenge and the chain stops
/// there. Passwords are compared in constant time.
///
/// # Example
///
/// ```
/// use ivy::Router;
/// use ivy_middleware::BasicAuth;
///
/// let mut admin = Router::new();
/// admin.use_middleware([BasicAuth::new("Restricted")
///     .credential("admin", "secret")
///     .into_handler()]);
/// ```
#[derive(Clone)]
#[must_use]
pub struct BasicAuth {
    realm: String,
    credentials: HashMap<String, String>,
}

impl BasicAuth {
    /// Creates the middleware for `realm` with no accepted users.
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            credentials: HashMap::new(),
        }
    }

    /// Accepts `user` with `password`.
    pub fn credential(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials.insert(user.into(), password.into());
        self
    }

    /// Boxes the middleware for registration on a router.
    #[must_use]
    pub fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }

    fn authorized(&self, ctx: &Context) -> bool {
        let Some((user, password)) = ctx.header(AUTHORIZATION).and_then(decode_basic) else {
            return false;
        };
        self.credentials
            .get(&user)
            .is_some_and(|expected| bool::from(password.as_bytes().ct_eq(expected.as_bytes())))
    }

    fn reject(&self, ctx: &mut Context) -> HandlerResult {
        let challenge = format!("Basic realm=\"{}\"", self.realm);
        let challenge = HeaderValue::try_from(challenge)
            .map_err(|e| ivy::Error::InvalidHeader(e.to_string()))?;
        ctx.response_headers_mut().insert(WWW_AUTHENTICATE, challenge);
        ctx.send_status(StatusCode::UNAUTHORIZED)
    }
}

impl Handler for BasicAuth {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if self.authorized(ctx) {
                ctx.next().await
            } else {
                tracing::debug!(realm = %self.realm, "basic auth rejected");
                self.reject(ctx)
            }
        })
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("realm", &self.realm)
            .field("users", &self.credentials.len())
            .finish()
    }
}

/// Basic auth middleware for `realm` accepting `credentials`.
pub fn basic_auth<I, U, P>(realm: impl Into<String>, credentials: I) -> BoxedHandler
where
    I: IntoIterator<Item = (U, P)>,
    U: Into<String>,
    P: Into<String>,
{
    credentials
        .into_iter()
        .fold(BasicAuth::new(realm), |auth, (user, password)| {
            auth.credential(user, password)
        })
        .into_handler()
}

/// Splits `Basic <base64(user:password)>` into its parts.
fn decode_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivy::{handler, Router};
    use ivy_test::TestClient;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn client(reached: Arc<AtomicBool>) -> TestClient {
        let mut router = Router::new();
        router.use_middleware([basic_auth("Restricted", [("admin", "secret")])]);
        router.get(
            "/",
            [handler(move |ctx: &mut Context| {
                let reached = Arc::clone(&reached);
                Box::pin(async move {
                    reached.store(true, Ordering::SeqCst);
                    ctx.send_string("welcome")
                })
            })],
        );
        TestClient::new(router)
    }

    #[test]
    fn test_decode_basic() {
        assert_eq!(
            decode_basic("Basic YWRtaW46c2VjcmV0"),
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(
            decode_basic("basic YTpiOmM="),
            Some(("a".to_string(), "b:c".to_string()))
        );
        assert_eq!(decode_basic("Bearer token"), None);
        assert_eq!(decode_basic("Basic !!!"), None);
        assert_eq!(decode_basic("Basic"), None);
    }

    #[tokio::test]
    async fn test_valid_credentials_pass() {
        let reached = Arc::new(AtomicBool::new(false));
        client(Arc::clone(&reached))
            .get("/")
            .basic_auth("admin", "secret")
            .send()
            .await
            .assert_status(StatusCode::OK)
            .assert_body_eq("welcome");
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_credentials_are_challenged() {
        let reached = Arc::new(AtomicBool::new(false));
        client(Arc::clone(&reached))
            .get("/")
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED)
            .assert_header("www-authenticate", "Basic realm=\"Restricted\"");
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let reached = Arc::new(AtomicBool::new(false));
        let client = client(Arc::clone(&reached));
        client
            .get("/")
            .basic_auth("admin", "guess")
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        client
            .get("/")
            .basic_auth("nobody", "secret")
            .send()
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        assert!(!reached.load(Ordering::SeqCst));
    }
}
