//! Required query parameter validation.

use std::sync::Arc;

use ivy::{handler, BoxedHandler, Context, Error};

/// Rejects requests that lack any of `names` in the query string.
///
/// The first missing name produces an error with status `400` and the
/// message `missing query-param "name"`. The router's error handler turns it
/// into the response; the default one answers `500`. A parameter that is
/// present with an empty value counts as present.
///
/// ```
/// use ivy::Router;
/// use ivy_middleware::required_query_params;
///
/// let mut router = Router::new();
/// router.use_middleware([required_query_params(["page", "size"])]);
/// ```
pub fn required_query_params<I, S>(names: I) -> BoxedHandler
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Arc<[String]> = names.into_iter().map(Into::into).collect();
    handler(move |ctx: &mut Context| {
        let names = Arc::clone(&names);
        Box::pin(async move {
            let present = ctx.query_params();
            if let Some(missing) = names
                .iter()
                .find(|name| !present.iter().any(|(key, _)| key == *name))
            {
                return Err(Error::bad_request(format!("missing query-param {missing:?}")));
            }
            ctx.next().await
        })
    })
}
