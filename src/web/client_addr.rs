use super::headers::XForwardedFor;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use headers::HeaderMapExt;
use std::convert::Infallible;
use std::net::SocketAddr;

const FALLBACK_CLIENT_ADDR: &str = "127.0.0.1";

/// Best-effort client address: first `X-Forwarded-For` entry, then the
/// socket peer, then loopback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(client) = parts
            .headers
            .typed_get::<XForwardedFor>()
            .and_then(|xff| xff.client().map(str::to_string))
        {
            return Ok(ClientAddr(client));
        }

        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| FALLBACK_CLIENT_ADDR.to_string());
        Ok(ClientAddr(addr))
    }
}
