//! A parent router with a mounted sub-router sharing request state.
//!
//! ```text
//! cargo run -p ivy --example sub_router
//! curl localhost:8089/v2/ping
//! curl -u admin:secret localhost:8089/admin/stats
//! ```

use std::time::Duration;

use http::StatusCode;
use ivy::{error_handler, handler, Context, Error, Router, Server, ServerConfig};
use ivy_middleware::{logger, request_id, required_query_params, BasicAuth};
use ivy_telemetry::{init_logging, LogConfig};

fn api() -> Router {
    let mut api = Router::new();
    api.get(
        "/ping",
        [
            handler(|ctx: &mut Context| {
                Box::pin(async move {
                    ctx.store().set("hello", "middleware 1".to_string());
                    ctx.next().await
                })
            }),
            handler(|ctx: &mut Context| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let hello: String = ctx.store().get("hello").unwrap_or_default();
                    let sample: String = ctx.store().get("sample").unwrap_or_default();
                    ctx.send_string(format!("pong (hello = {hello}, sample = {sample})"))
                })
            }),
        ],
    );
    api.get(
        "/greet",
        [
            required_query_params(["name"]),
            handler(|ctx: &mut Context| {
                Box::pin(async move {
                    let name = ctx.query_param("name").unwrap_or_default();
                    ctx.send_json(&serde_json::json!({ "greeting": format!("hello, {name}") }))
                })
            }),
        ],
    );
    api.get(
        "/error",
        [handler(|_ctx: &mut Context| {
            Box::pin(async move { Err(Error::msg("error from sub router")) })
        })],
    );
    api
}

fn admin() -> Router {
    let mut admin = Router::new();
    admin.use_middleware([BasicAuth::new("admin")
        .credential("admin", "secret")
        .into_handler()]);
    admin.get(
        "/stats",
        [handler(|ctx: &mut Context| Box::pin(async move { ctx.send_string("all good") }))],
    );
    admin
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::development())?;

    let mut root = Router::new();
    root.set_error_handler(error_handler(|err, w, _req| {
        w.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        w.write(format!("[error handler]: {err}").as_bytes());
    }));
    root.use_middleware([
        request_id(),
        logger(),
        handler(|ctx: &mut Context| {
            Box::pin(async move {
                ctx.store().set("sample", "SAMPLE".to_string());
                ctx.next().await
            })
        }),
    ]);
    root.get(
        "/_ping",
        [handler(|ctx: &mut Context| Box::pin(async move { ctx.send_string("hi") }))],
    );
    root.mount("/v2", api());
    root.mount("/admin", admin());

    let config = ServerConfig::builder().http_addr("127.0.0.1:8089").build();
    Server::new(config, root)
        .run_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
