//! Connectivity probe
//!
//! A cheap reachability check run before each network round trip: open a
//! TCP connection to a well-known endpoint with a short timeout. Success
//! means the network path is usable; failure or timeout means the session
//! should fall back to a canned offline reply instead of stalling.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Default probe target, a public DNS resolver
pub const DEFAULT_TARGET: &str = "8.8.8.8:53";

/// Default probe timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Check whether `target` accepts a TCP connection within `timeout`
///
/// The blocking connect runs on the blocking thread pool so the async
/// runtime is never stalled. Any failure (unreachable, refused, timeout,
/// unparseable address) reports `false`; the probe never errors.
pub async fn is_reachable(target: &str, timeout: Duration) -> bool {
    let Ok(addr) = target.parse::<SocketAddr>() else {
        tracing::warn!(target, "unparseable probe target");
        return false;
    };

    let reachable = tokio::task::spawn_blocking(move || {
        TcpStream::connect_timeout(&addr, timeout).is_ok()
    })
    .await
    .unwrap_or(false);

    tracing::debug!(target, reachable, "connectivity probe");
    reachable
}

/// [`is_reachable`] against the default target and timeout
pub async fn internet_available() -> bool {
    is_reachable(DEFAULT_TARGET, DEFAULT_TIMEOUT).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unparseable_target_is_unreachable() {
        assert!(!is_reachable("not-an-address", DEFAULT_TIMEOUT).await);
    }

    #[tokio::test]
    async fn refused_port_is_unreachable() {
        // Port 1 on loopback is essentially never listening; refusal is
        // immediate, well under the timeout
        assert!(!is_reachable("127.0.0.1:1", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn local_listener_is_reachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(is_reachable(&addr.to_string(), DEFAULT_TIMEOUT).await);
    }
}
