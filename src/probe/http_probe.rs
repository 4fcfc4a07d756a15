use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;

use crate::config::FetchConfig;
use crate::error::Result;
use crate::http_client::build_client;
use crate::probe::fetcher::{FetchRequest, Transport, TransportError};
use crate::probe::result::HttpResponse;

/// Production [`Transport`] backed by reqwest.
pub struct ReqwestTransport {
    verified: Client,
    unverified: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            verified: build_client(config, true)?,
            unverified: build_client(config, false)?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: FetchRequest<'_>) -> std::result::Result<HttpResponse, TransportError> {
        let client = if request.verify_tls { &self.verified } else { &self.unverified };

        let mut builder = client.get(request.url).timeout(request.timeout);
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // Bound send + body together so a trickling server can't hold a worker.
        let exchange = async {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let final_url = resp.url().to_string();
            let headers = resp
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect::<Vec<_>>();
            let body = resp.bytes().await?.to_vec();
            Ok::<_, reqwest::Error>(HttpResponse { status, headers, body, final_url })
        };

        match tokio::time::timeout(request.timeout, exchange).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(classify(&e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Map a reqwest error onto the transport taxonomy.
fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    let chain = error_chain(err);
    if err.is_redirect() {
        return TransportError::Redirect(chain);
    }
    let lower = chain.to_lowercase();
    if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") || lower.contains("handshake") {
        return TransportError::Tls(chain);
    }
    if lower.contains("timed out") {
        return TransportError::Timeout;
    }
    TransportError::Connection(chain)
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let transport = ReqwestTransport::new(&FetchConfig::default()).unwrap();
        // port 9 (discard) on loopback is almost never listening
        let result = transport
            .execute(FetchRequest {
                url: "http://127.0.0.1:9/",
                headers: &[],
                timeout: Duration::from_secs(2),
                verify_tls: true,
            })
            .await;
        assert!(matches!(result, Err(TransportError::Connection(_)) | Err(TransportError::Timeout)));
    }
}
