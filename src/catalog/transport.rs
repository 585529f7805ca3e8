use std::time::Duration;

use super::CatalogError;

/// Raw HTTP reply handed back to the catalog client. Status handling
/// (retry, auth refresh, error mapping) is the client's job, not the transport's.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
    /// Seconds from a `Retry-After` header, if the server sent one.
    pub retry_after: Option<u64>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP seam between the catalog client and the network.
pub trait Transport {
    /// GET `url` with a bearer token.
    fn get(&self, url: &str, bearer: &str) -> Result<HttpReply, CatalogError>;

    /// POST a url-encoded form (used for the token endpoint).
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply, CatalogError>;
}

/// `ureq`-backed transport with a fixed per-call timeout.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }

    fn read_reply(mut response: ureq::http::Response<ureq::Body>) -> Result<HttpReply, CatalogError> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| CatalogError::Transport(format!("Failed to read body: {e}")))?;
        Ok(HttpReply {
            status,
            body,
            retry_after,
        })
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, bearer: &str) -> Result<HttpReply, CatalogError> {
        log::trace!("GET {url}");
        let response = self
            .agent
            .get(url)
            .header("Authorization", format!("Bearer {bearer}"))
            .call()
            .map_err(|e| CatalogError::Transport(format!("GET {url}: {e}")))?;
        Self::read_reply(response)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply, CatalogError> {
        log::trace!("POST {url}");
        let response = self
            .agent
            .post(url)
            .send_form(form.iter().copied())
            .map_err(|e| CatalogError::Transport(format!("POST {url}: {e}")))?;
        Self::read_reply(response)
    }
}
