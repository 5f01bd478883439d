//! Client key derivation for inbound requests.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};

/// Header set by reverse proxies with the originating client chain.
const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Header set by some proxies with the single originating client address.
const X_REAL_IP: &str = "x-real-ip";

/// Key used when nothing identifies the caller.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// The authenticated caller, inserted into request extensions by whatever
/// authentication layer runs ahead of rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// A key that partitions rate limit state between callers.
///
/// Preference order: authenticated user id, proxy-forwarded address,
/// direct peer address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    /// An authenticated user id
    User(String),
    /// A client network address
    Ip(String),
    /// Nothing identified the caller
    Anonymous,
}

impl ClientKey {
    /// Derive the key for a request from its headers and extensions.
    pub fn from_request_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        if let Some(AuthenticatedUser(id)) = extensions.get::<AuthenticatedUser>() {
            if !id.is_empty() {
                return ClientKey::User(id.clone());
            }
        }

        if let Some(addr) = forwarded_for(headers) {
            return ClientKey::Ip(addr);
        }

        if let Some(addr) = header_str(headers, X_REAL_IP) {
            return ClientKey::Ip(addr.to_string());
        }

        if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
            return ClientKey::Ip(addr.ip().to_string());
        }

        ClientKey::Anonymous
    }

    /// The string form stored by the limiter.
    pub fn to_string_key(&self) -> String {
        match self {
            ClientKey::User(id) => format!("user:{}", id),
            ClientKey::Ip(addr) => format!("ip:{}", addr),
            ClientKey::Anonymous => ANONYMOUS_CLIENT.to_string(),
        }
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

/// First address in `X-Forwarded-For`, i.e. the original client.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, X_FORWARDED_FOR)?
        .split(',')
        .map(str::trim)
        .find(|addr| !addr.is_empty())
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
