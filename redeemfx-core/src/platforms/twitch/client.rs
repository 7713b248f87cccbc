// File: redeemfx-core/src/platforms/twitch/client.rs

use std::sync::Arc;
use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use tracing::{trace, warn};
use crate::Error;

pub const DEFAULT_HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// A small wrapper client for calling the Helix endpoints we need.
///
/// The base URL is configurable so the same client can talk to a local
/// mock API during testing.
#[derive(Clone)]
pub struct TwitchHelixClient {
    http: Arc<ReqwestClient>,
    bearer_token: String,
    client_id: String,
    base_url: String,
}

impl TwitchHelixClient {
    /// Create a new `TwitchHelixClient` against the public Helix API.
    ///
    /// - `bearer_token`: an OAuth token with the `channel:manage:redemptions` scope
    /// - `client_id`: the client id the token was issued for
    pub fn new(bearer_token: &str, client_id: &str) -> Self {
        Self::with_base_url(bearer_token, client_id, DEFAULT_HELIX_BASE_URL)
    }

    pub fn with_base_url(bearer_token: &str, client_id: &str, base_url: &str) -> Self {
        Self {
            http: Arc::new(ReqwestClient::new()),
            bearer_token: bearer_token.to_string(),
            client_id: client_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns an `Arc<ReqwestClient>` reference for advanced usage.
    pub fn http_client(&self) -> Arc<ReqwestClient> {
        self.http.clone()
    }

    /// Joins `path` (e.g. "/channel_points/custom_rewards") onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Adds auth headers and sends. Only network/read failures are errors here;
    /// callers decide what a non-2xx status means via [`HelixResponse::success`].
    pub(crate) async fn execute(&self, op: &str, req: RequestBuilder) -> Result<HelixResponse, Error> {
        let resp = req
            .header("Client-Id", self.client_id())
            .header("Authorization", format!("Bearer {}", self.bearer_token()))
            .send()
            .await
            .map_err(|e| Error::Platform(format!("{op} network error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Platform(format!("{op} read body error: {e}")))?;

        trace!("{} => HTTP {} => body length={}", op, status, body.len());
        Ok(HelixResponse { status, body })
    }
}

pub(crate) struct HelixResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HelixResponse {
    pub fn success(self, op: &str) -> Result<String, Error> {
        if !self.status.is_success() {
            warn!("{} => status={} body={}", op, self.status, self.body);
            return Err(Error::Platform(format!(
                "{op}: HTTP {} => {}",
                self.status, self.body
            )));
        }
        Ok(self.body)
    }
}
