//! Permissive CORS and content-type headers stamped on every response.
//!
//! Browser clients call the services cross-origin, so each response carries a
//! wildcard origin plus the methods and headers its route group accepts.
//! Preflight requests are answered by the routes themselves.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

pub const DEFAULT_ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// CORS policy for one group of routes.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    pub allow_methods: HeaderValue,
    pub allow_headers: HeaderValue,
}

impl CorsPolicy {
    /// Policy for routes that accept `method` plus `OPTIONS` preflight.
    pub fn for_method(method: &'static str) -> Self {
        let methods = match method {
            "GET" => "GET, OPTIONS",
            "PUT" => "PUT, OPTIONS",
            "DELETE" => "DELETE, OPTIONS",
            _ => "POST, OPTIONS",
        };
        Self {
            allow_methods: HeaderValue::from_static(methods),
            allow_headers: HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS),
        }
    }
}

pub async fn cors_headers_middleware(
    State(policy): State<CorsPolicy>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        policy.allow_methods.clone(),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        policy.allow_headers.clone(),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    response
}
