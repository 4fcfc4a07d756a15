use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::Result;

/// Build a pooled HTTP client for the given fetch options.
///
/// Two of these exist per scan: one that verifies certificates and one
/// used only for the flagged TLS fallback.
pub fn build_client(config: &FetchConfig, verify_tls: bool) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        // Connection pooling - reuse connections aggressively
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)

        // Timeouts
        .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
        .connect_timeout(Duration::from_secs(config.timeout_seconds.clamp(1, 5)))

        // Compression
        .gzip(true)
        .brotli(true)

        // TLS
        .use_rustls_tls()
        .tls_sni(true)
        .https_only(false)
        .danger_accept_invalid_certs(!verify_tls)

        // Redirects
        .redirect(redirect_policy(config.max_redirects))

        .user_agent(config.user_agent.as_str());

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }
    Ok(builder.build()?)
}

/// Follow up to `max` redirects, then hand back the last 3xx as the answer.
fn redirect_policy(max: usize) -> Policy {
    if max == 0 {
        return Policy::none();
    }
    Policy::custom(move |attempt| {
        // previous() already holds the original URL
        if attempt.previous().len() > max {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}
