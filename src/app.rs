use std::future::Future;

use anyhow::{Context as _, Result};
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gateway_observability::middleware::{record_error, start_span, TRACER_NAME};
use gateway_observability::router::span_attributes;
use gateway_observability::{trace_requests, HttpTracing, McpRequest};
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, Tracer};
use opentelemetry::Context;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{info, warn};

const REQUEST_SPAN_NAME: &str = "mcp-broker.request";

/// 创建网关应用路由
///
/// 所有路由都经过追踪中间件；最外层捕获 panic 并返回 500。
pub fn create_app<T>(tracing: HttpTracing<T>) -> Router
where
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/mcp", post(handle_mcp))
        .layer(axum::middleware::from_fn_with_state(
            tracing,
            trace_requests::<T>,
        ))
        .layer(CatchPanicLayer::new())
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 处理 MCP JSON-RPC 请求
///
/// 请求转发不在网关本身实现，这里只确认请求并返回需要附加到下游调用的追踪头。
async fn handle_mcp(
    Extension(cx): Extension<Context>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(err) => {
            record_error(&cx.span(), &err, "broker");
            warn!("无法解析 MCP 请求: {err}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": Value::Null,
                    "error": { "code": -32700, "message": "Parse error" },
                })),
            )
                .into_response();
        }
    };

    let method = payload
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut request = McpRequest::new(method);
    if let Some(session_id) = headers
        .get(gateway_observability::middleware::SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        request = request.with_session_id(session_id);
    }
    if let Some(tool) = payload
        .pointer("/params/name")
        .and_then(Value::as_str)
    {
        request = request.with_tool_name(tool);
    }

    let tracer = global::tracer(TRACER_NAME);
    let request_cx = start_span(&tracer, &cx, REQUEST_SPAN_NAME, span_attributes(&request));
    info!(method = %request.method, "收到 MCP 请求");
    let downstream = gateway_observability::router::inject_trace_context(&request_cx);
    request_cx.span().end();

    Json(json!({
        "jsonrpc": "2.0",
        "id": payload.get("id").cloned().unwrap_or(Value::Null),
        "result": {
            "method": request.method,
            "propagation": downstream,
        },
    }))
    .into_response()
}

/// 启动 HTTP 服务，直到收到关闭信号
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr().context("获取监听地址失败")?;
    info!("MCP 网关启动在 http://{addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("HTTP 服务收到关闭信号");
        })
        .await
        .context("HTTP 服务运行失败")?;

    info!("HTTP 服务已停止");
    Ok(())
}
