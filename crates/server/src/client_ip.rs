use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use config::ClientIpConfig;
use http::{Extensions, HeaderMap};

/// Resolves the caller's address: `X-Real-IP`, then `X-Forwarded-For` past the trusted
/// hops, then the socket peer.
pub(crate) fn client_ip(config: &ClientIpConfig, headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    if config.x_real_ip
        && let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    {
        return Some(ip);
    }

    if let Some(hops) = config.x_forwarded_for_trusted_hops
        && let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').rev().nth(hops))
            .and_then(|s| s.trim().parse().ok())
    {
        return Some(ip);
    }

    extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip())
}
