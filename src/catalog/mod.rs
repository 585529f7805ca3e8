pub mod models;
pub mod transport;

use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::CatalogConfig;
use crate::market::Market;
use crate::playlist_ref::PlaylistId;
use models::{ArtistObject, ArtistsResponse, Paging, PlaylistItem, PlaylistObject, TokenResponse};
use transport::{HttpReply, Transport, UreqTransport};

/// Maximum ids per batch artist lookup (API limit).
pub const ARTIST_BATCH_SIZE: usize = 50;

/// Longest we honor a `Retry-After` header before retrying anyway.
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// Fields requested for playlist metadata, so the first page of tracks is not
/// pulled along with it.
const PLAYLIST_FIELDS: &str = "id,name,owner(id,display_name),images,external_urls";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Playlist {0} was not found or is not public")]
    PlaylistUnavailable(String),
    #[error("Catalog API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Catalog authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Unexpected catalog payload: {0}")]
    Decode(String),
}

impl CatalogError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Connection settings for the catalog API.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub api_base: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Retries on 429/5xx before giving up.
    pub max_retries: u32,
    /// Base delay for exponential backoff between transient retries.
    pub retry_backoff: Duration,
    /// Pause between artist batches.
    pub batch_delay: Duration,
    /// Page size for playlist item listing (API max 100).
    pub page_size: u32,
}

impl From<&CatalogConfig> for CatalogSettings {
    fn from(cfg: &CatalogConfig) -> Self {
        Self {
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token_url: cfg.token_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            max_retries: cfg.max_retries,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
            batch_delay: Duration::from_millis(cfg.batch_delay_ms),
            page_size: cfg.page_size.clamp(1, 100),
        }
    }
}

/// Client for the music catalog API.
///
/// Owns its access token. When the API rejects the token (HTTP 401) the client
/// requests a new one, replaces the old one and retries the same call once;
/// a second rejection is returned to the caller.
pub struct CatalogClient<T: Transport = UreqTransport> {
    transport: T,
    settings: CatalogSettings,
    token: Option<String>,
}

impl CatalogClient<UreqTransport> {
    /// Build a client over the network transport.
    pub fn new(config: &CatalogConfig) -> Self {
        let transport = UreqTransport::new(Duration::from_secs(config.timeout_secs));
        Self::with_transport(transport, CatalogSettings::from(config))
    }
}

impl<T: Transport> CatalogClient<T> {
    pub fn with_transport(transport: T, settings: CatalogSettings) -> Self {
        Self {
            transport,
            settings,
            token: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch playlist metadata (name, owner, images, link).
    pub fn playlist(&mut self, id: &PlaylistId, market: Market) -> Result<PlaylistObject> {
        let url = format!(
            "{}/playlists/{}?market={}&fields={}",
            self.settings.api_base, id, market.code(), PLAYLIST_FIELDS
        );
        self.get_json(&url).map_err(|e| playlist_error(e, id))
    }

    /// Fetch every item of a playlist, following `next` cursors until exhausted.
    pub fn playlist_items(&mut self, id: &PlaylistId, market: Market) -> Result<Vec<PlaylistItem>> {
        let mut url = format!(
            "{}/playlists/{}/tracks?market={}&limit={}&offset=0",
            self.settings.api_base,
            id,
            market.code(),
            self.settings.page_size
        );

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            let page: Paging<PlaylistItem> =
                self.get_json(&url).map_err(|e| playlist_error(e, id))?;
            pages += 1;
            log::debug!(
                "Playlist {id} page {pages}: {} items (total {:?})",
                page.items.len(),
                page.total
            );
            items.extend(page.items);

            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        log::info!("Fetched {} playlist items for {id} in {pages} pages", items.len());
        Ok(items)
    }

    /// Resolve artist ids in batches of [`ARTIST_BATCH_SIZE`], pausing between
    /// batches. Ids the catalog doesn't know are skipped.
    pub fn artists(&mut self, ids: &[String]) -> Result<Vec<ArtistObject>> {
        let mut artists = Vec::with_capacity(ids.len());
        let batches = ids.len().div_ceil(ARTIST_BATCH_SIZE);

        for (i, chunk) in ids.chunks(ARTIST_BATCH_SIZE).enumerate() {
            if i > 0 && !self.settings.batch_delay.is_zero() {
                thread::sleep(self.settings.batch_delay);
            }
            let url = format!("{}/artists?ids={}", self.settings.api_base, chunk.join(","));
            let resp: ArtistsResponse = self.get_json(&url)?;
            log::debug!("Artist batch {}/{}: {} ids", i + 1, batches, chunk.len());
            artists.extend(resp.artists.into_iter().flatten());
        }

        Ok(artists)
    }

    fn get_json<R: DeserializeOwned>(&mut self, url: &str) -> Result<R> {
        let reply = self.send_authorized(url)?;
        serde_json::from_str(&reply.body).map_err(|e| CatalogError::Decode(format!("{url}: {e}")))
    }

    /// GET with the current token; on 401 replace the token and retry exactly once.
    fn send_authorized(&mut self, url: &str) -> Result<HttpReply> {
        let reply = self.get_with_retry(url)?;
        if reply.status != 401 {
            return check_status(reply);
        }

        log::info!("Access token rejected, re-authenticating");
        self.token = Some(self.request_token()?);
        let retried = self.get_with_retry(url)?;
        check_status(retried)
    }

    /// GET with bounded retries on transient statuses (429, 5xx).
    fn get_with_retry(&mut self, url: &str) -> Result<HttpReply> {
        let token = self.bearer()?;
        let mut attempt = 0u32;
        loop {
            let reply = self.transport.get(url, &token)?;
            if !is_transient(reply.status) || attempt >= self.settings.max_retries {
                return Ok(reply);
            }

            attempt += 1;
            let wait = self.backoff(attempt, reply.retry_after);
            log::warn!(
                "HTTP {} from catalog, retry {}/{} in {:?}",
                reply.status,
                attempt,
                self.settings.max_retries,
                wait
            );
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
    }

    fn backoff(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        match retry_after {
            Some(secs) => Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)),
            None => {
                let cap = Duration::from_secs(MAX_RETRY_AFTER_SECS);
                2u32.checked_pow(attempt.saturating_sub(1))
                    .and_then(|factor| self.settings.retry_backoff.checked_mul(factor))
                    .map_or(cap, |d| d.min(cap))
            }
        }
    }

    /// Current token, requesting one on first use.
    fn bearer(&mut self) -> Result<String> {
        if let Some(ref token) = self.token {
            return Ok(token.clone());
        }
        let token = self.request_token()?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Client-credentials grant.
    fn request_token(&self) -> Result<String> {
        let (Some(id), Some(secret)) = (
            self.settings.client_id.as_deref(),
            self.settings.client_secret.as_deref(),
        ) else {
            return Err(CatalogError::Auth(
                "missing client id / client secret (set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET)"
                    .to_string(),
            ));
        };

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", id),
            ("client_secret", secret),
        ];
        let reply = self.transport.post_form(&self.settings.token_url, &form)?;
        if !reply.is_success() {
            return Err(CatalogError::Auth(format!(
                "token endpoint returned HTTP {}",
                reply.status
            )));
        }

        let token: TokenResponse = serde_json::from_str(&reply.body)
            .map_err(|e| CatalogError::Decode(format!("token response: {e}")))?;
        log::debug!(
            "Token acquired (client ...{}, expires in {:?}s)",
            tail(id, 6),
            token.expires_in
        );
        Ok(token.access_token)
    }
}

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn check_status(reply: HttpReply) -> Result<HttpReply> {
    if reply.is_success() {
        return Ok(reply);
    }
    let mut body = reply.body;
    if body.len() > 200 {
        let cut = (0..=200).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        body.truncate(cut);
    }
    Err(CatalogError::Status {
        status: reply.status,
        body,
    })
}

/// 403/404 from a playlist endpoint means the playlist is missing or private.
fn playlist_error(err: CatalogError, id: &PlaylistId) -> CatalogError {
    match err.status() {
        Some(403) | Some(404) => CatalogError::PlaylistUnavailable(id.to_string()),
        _ => err,
    }
}

fn tail(s: &str, n: usize) -> &str {
    let start = s.char_indices().rev().nth(n.saturating_sub(1)).map(|(i, _)| i).unwrap_or(0);
    &s[start..]
}
