//! 请求日志中间件：每个请求输出一条结构化记录。

use axum::extract::{Request, State, connect_info::ConnectInfo};
use axum::{middleware, response::Response};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{field, info};

#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog {
    pub log_remote_addr: bool,
}

/// Emits method, URL, optional remote address, status and duration once the
/// wrapped handler has produced its response. Time spent streaming the
/// response body afterwards is not included.
pub async fn log_requests(
    State(access_log): State<AccessLog>,
    request: Request,
    next: middleware::Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.uri().clone();
    let remote_addr = if access_log.log_remote_addr {
        remote_addr(&request)
    } else {
        None
    };

    let response = next.run(request).await;

    info!(
        target: "serve::request",
        method = %method,
        url = %url,
        remote_addr = remote_addr.map(field::display),
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn remote_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
