//! Mounting endpoints under a path prefix.
//!
//! A mount registers one method-agnostic chain at two patterns: the prefix
//! itself and `prefix/*rest`. The chain ends in a [`Mount`] handler that
//! forwards the request to the mounted endpoint with the prefix stripped.

use std::sync::Arc;

use http::Uri;

use crate::adapter::{forward, Endpoint};
use crate::context::Context;
use crate::error::{Error, HandlerResult};
use crate::handler::{BoxFuture, Handler};

/// Parameter name bound to the path below a mount prefix.
pub(crate) const MOUNT_REST_PARAM: &str = "__ivy_mount_rest";

/// Normalizes a prefix to `/segment/...` with no trailing slash. The root
/// prefix is `/`.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    format!("/{trimmed}")
}

/// The catch-all pattern registered below `prefix`.
pub(crate) fn subtree_pattern(prefix: &str) -> String {
    format!("{}/*{MOUNT_REST_PARAM}", prefix.trim_end_matches('/'))
}

/// Forwards to a mounted endpoint with the mount prefix removed.
pub(crate) struct Mount {
    endpoint: Arc<dyn Endpoint>,
}

impl Mount {
    pub(crate) fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self { endpoint }
    }
}

impl Handler for Mount {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let uri = stripped_uri(ctx)?;
            tracing::trace!(forwarded = %uri, "entering mounted endpoint");
            forward(ctx, &*self.endpoint, uri).await;
            Ok(())
        })
    }
}

/// The request URI as seen below the mount: the path bound to the mount's
/// catch-all, rooted at `/`, with the query kept.
fn stripped_uri(ctx: &Context) -> Result<Uri, Error> {
    let rest = ctx.path_param(MOUNT_REST_PARAM).unwrap_or("");
    let mut path = format!("/{rest}");
    if !rest.is_empty() && ctx.path().ends_with('/') {
        path.push('/');
    }
    if let Some(query) = ctx.uri().query() {
        path.push('?');
        path.push_str(query);
    }
    Uri::try_from(path).map_err(Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/v2"), "/v2");
        assert_eq!(normalize_prefix("v2/"), "/v2");
        assert_eq!(normalize_prefix("/api/v2/"), "/api/v2");
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
    }

    #[test]
    fn test_subtree_pattern() {
        assert_eq!(subtree_pattern("/v2"), format!("/v2/*{MOUNT_REST_PARAM}"));
        assert_eq!(subtree_pattern("/"), format!("/*{MOUNT_REST_PARAM}"));
    }
}
