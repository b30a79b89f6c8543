//! Router behaviour against fixture-backed databases.

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use ipgeo::registry::{ASN, CITY, COUNTRY, REQUIRED_KINDS};
use ipgeo::{server, DatabaseSpec, FixtureReader, Registry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

fn registry(country: FixtureReader) -> Arc<Registry> {
    let registry = Registry::from_specs(REQUIRED_KINDS.map(|kind| {
        DatabaseSpec::new(kind, "http://db.test", format!("/db/{}.mmdb", kind))
    }));
    registry
        .restore(ASN, Box::new(FixtureReader::new("Example Net")))
        .unwrap();
    registry
        .restore(CITY, Box::new(FixtureReader::new("Springfield")))
        .unwrap();
    registry.restore(COUNTRY, Box::new(country)).unwrap();
    Arc::new(registry)
}

fn app(host: &str) -> Router {
    server::router(registry(FixtureReader::new("United States")), host)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_lookup_specific_ip() {
    let (status, body) = send(app(""), get("/ipgeo/8.8.8.8")).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ip"], "8.8.8.8");
    assert_eq!(json["version"], "IPv4");
    assert_eq!(json["network"], "8.8.8.0/24");
    assert_eq!(json["asn"], "AS11");
    assert_eq!(json["org"], "Example Net");
    assert_eq!(json["city"], "Springfield");
    assert_eq!(json["country_code_iso3"], "USA");
    assert_eq!(json["in_eu"], false);
}

#[tokio::test]
async fn test_lookup_client_ip_from_forwarded_header() {
    let request = Request::builder()
        .uri("/ipgeo")
        .header("X-Forwarded-For", "2001:db8::1, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(""), request).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ip"], "2001:db8::1");
    assert_eq!(json["version"], "IPv6");
}

#[tokio::test]
async fn test_lookup_client_ip_from_peer_address() {
    let mut request = get("/ipgeo");
    let peer: SocketAddr = "192.0.2.44:40000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    let (status, body) = send(app(""), request).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ip"], "192.0.2.44");
}

#[tokio::test]
async fn test_invalid_ip() {
    let (status, body) = send(app(""), get("/ipgeo/not-an-ip")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid IP address");
}

#[tokio::test]
async fn test_empty_ip_segment_is_bad_request() {
    let (status, body) = send(app(""), get("/ipgeo/")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid IP address");
}

#[tokio::test]
async fn test_lookup_error_is_500() {
    let app = server::router(registry(FixtureReader::failing()), "");
    let (status, body) = send(app, get("/ipgeo/1.1.1.1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error getting IP info: country lookup error"));
}

#[tokio::test]
async fn test_other_paths_forbidden() {
    for uri in ["/", "/favicon.ico", "/ipgeo/1.1.1.1/extra", "/other/1.1.1.1"] {
        let (status, body) = send(app(""), get(uri)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body, "Forbidden");
    }
}

#[tokio::test]
async fn test_host_filter() {
    let allowed = Request::builder()
        .uri("/ipgeo/8.8.8.8")
        .header("Host", "geo.example.com:5324")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app("geo.example.com"), allowed).await;
    assert_eq!(status, StatusCode::OK);

    let wrong = Request::builder()
        .uri("/ipgeo/8.8.8.8")
        .header("Host", "evil.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app("geo.example.com"), wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Forbidden");
}
