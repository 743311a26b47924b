use anyhow::{anyhow, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use tracing::{error, info, warn};

use crate::pipeline::request::{OutgoingRequest, RequestMode};
use crate::server::server::AppState;

const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

static HOP_BY_HOP: [header::HeaderName; 5] = [
    header::HOST,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::UPGRADE,
];

/// Relay handler: every request that is not a metrics scrape lands here.
pub async fn proxy_request(State(state): State<AppState>, req: Request) -> Response {
    let outgoing = match outgoing_request(&state.upstream, req).await {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("Error: {}", e)).into_response(),
    };
    if !is_forwardable(&state.upstream, &outgoing, |o| state.pipeline.is_trusted_origin(o)) {
        warn!(origin = %outgoing.origin(), "refusing absolute-form target outside upstream and trusted origins");
        return (StatusCode::FORBIDDEN, "Error: target origin not allowed").into_response();
    }
    info!("{} {}", outgoing.method, outgoing.url);

    match state.pipeline.handle(&state.transport, outgoing).await {
        Ok(upstream_response) => match relay_response(upstream_response).await {
            Ok(response) => response,
            Err(e) => {
                error!("reading upstream response failed: {}", e);
                (StatusCode::BAD_GATEWAY, format!("Error: {}", e)).into_response()
            }
        },
        Err(e) => {
            error!("upstream request failed: {}", e);
            (StatusCode::BAD_GATEWAY, format!("Error: {}", e)).into_response()
        }
    }
}

/// Absolute-form targets are forwarded as-is, origin-form paths are joined onto `upstream`.
pub async fn outgoing_request(upstream: &Url, req: Request) -> Result<OutgoingRequest> {
    let (parts, body) = req.into_parts();

    let url = if parts.uri.scheme().is_some() {
        Url::parse(&parts.uri.to_string())?
    } else {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        upstream.join(path_and_query)?
    };

    let body = to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|e| anyhow!("request body: {}", e))?;

    Ok(OutgoingRequest {
        method: parts.method,
        url,
        headers: strip_hop_by_hop(parts.headers),
        mode: RequestMode::default(),
        body: body.to_vec(),
    })
}

/// Only `upstream` and trusted origins are reachable; the relay is not an open forward proxy.
pub fn is_forwardable<F: Fn(&str) -> bool>(upstream: &Url, outgoing: &OutgoingRequest, is_trusted: F) -> bool {
    let origin = outgoing.origin();
    origin == upstream.origin().ascii_serialization() || is_trusted(&origin)
}

async fn relay_response(upstream: reqwest::Response) -> Result<Response> {
    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers().clone());
    let body = upstream.bytes().await?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers
}
