//! HTTP front end.
//!
//! - `GET /ipgeo` looks up the caller's address
//! - `GET /ipgeo/{ip}` looks up the given address
//! - `GET /ipgeo/` has an empty address and is a `400 Bad Request`
//! - everything else is `403 Forbidden`
//!
//! When a host is configured, requests carrying any other Host header are
//! rejected with `403` as well.

use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::info;
use crate::registry::Registry;

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    allowed_host: Arc<str>,
}

/// Build the router. An empty `allowed_host` accepts any Host header.
pub fn router(registry: Arc<Registry>, allowed_host: &str) -> Router {
    let state = AppState {
        registry,
        allowed_host: Arc::from(allowed_host),
    };

    Router::new()
        .route("/ipgeo", get(lookup_client))
        .route("/ipgeo/", get(lookup_empty))
        .route("/ipgeo/{ip}", get(lookup_path))
        .fallback(reject)
        .layer(middleware::from_fn_with_state(state.clone(), check_host))
        .with_state(state)
}

/// Serve the router on the configured address, over TLS if enabled.
pub async fn serve(config: &Config, registry: Arc<Registry>) -> Result<()> {
    let listen = config.listen_addr();
    let addr = listen
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Config(format!("cannot resolve listen address {}", listen)))?;
    let app = router(registry, &config.host).into_make_service_with_connect_info::<SocketAddr>();

    log::info!("Starting server on {}...", addr);
    if config.ssl {
        log::info!("Using certificate {} and key {}", config.cert, config.key);
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&config.cert, &config.key)
            .await?;
        axum_server::bind_rustls(addr, tls).serve(app).await?;
    } else {
        axum_server::bind(addr).serve(app).await?;
    }
    Ok(())
}

async fn check_host(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.allowed_host.is_empty() {
        let raw = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().host())
            .unwrap_or("");
        let host = strip_port(raw);
        if host != &*state.allowed_host {
            log::warn!(
                "Request rejected due to incorrect host: {} (expected {})",
                host,
                state.allowed_host
            );
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        }
    }
    next.run(request).await
}

async fn lookup_client(State(state): State<AppState>, request: Request) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_ip(request.headers(), remote);
    log::info!("Processing request for client IP: {}", client);
    respond(&state.registry, &client)
}

async fn lookup_path(State(state): State<AppState>, Path(ip): Path<String>) -> Response {
    log::info!("Processing request for specific IP: {}", ip);
    respond(&state.registry, &ip)
}

async fn lookup_empty(State(state): State<AppState>) -> Response {
    respond(&state.registry, "")
}

async fn reject(request: Request) -> Response {
    log::warn!("Rejecting request with 403 Forbidden: {}", request.uri().path());
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

fn respond(registry: &Registry, raw: &str) -> Response {
    let ip = match parse_ip(raw) {
        Ok(ip) => ip,
        Err(e) => {
            log::warn!("{}", e);
            return (StatusCode::BAD_REQUEST, "Invalid IP address").into_response();
        }
    };

    match info::lookup(registry, ip) {
        Ok(info) => {
            log::info!(
                "Successfully processed IP {} ({}, {})",
                raw,
                info.country_name,
                info.city
            );
            Json(info).into_response()
        }
        Err(e) => {
            log::error!("Error getting info for IP {}: {}", raw, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error getting IP info: {}", e),
            )
                .into_response()
        }
    }
}

fn parse_ip(raw: &str) -> Result<IpAddr> {
    raw.parse()
        .map_err(|_| Error::InvalidIpAddress(raw.to_string()))
}

/// Caller address: first `X-Forwarded-For` entry, else the peer address.
fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    match (forwarded, remote) {
        (Some(list), _) => list.split(',').next().unwrap_or("").trim().to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => String::new(),
    }
}

/// Host without its port: `example.com:80` -> `example.com`, `[::1]:80` -> `::1`.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((inner, tail)) if tail.starts_with(':') => inner,
            _ => host,
        };
    }
    match host.split_once(':') {
        Some((name, port)) if !port.contains(':') => name,
        _ => host,
    }
}
