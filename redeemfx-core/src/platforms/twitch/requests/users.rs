// ========================================================
// File: redeemfx-core/src/platforms/twitch/requests/users.rs
// ========================================================
use serde::Deserialize;
use tracing::{debug, warn};

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;

pub const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Response from the OAuth `/validate` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub client_id: String,
    pub login: String,
    pub user_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in: u64,
}

/// Response from "Get Users" endpoint.
#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    pub data: Vec<UserData>,
}

#[derive(Debug, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
    /// "partner", "affiliate" or "".
    #[serde(default)]
    pub broadcaster_type: String,
}

impl TwitchHelixClient {
    /// Validates the bearer token. Returns `Ok(None)` when Twitch rejects it.
    pub async fn validate_token(&self, validate_url: &str) -> Result<Option<ValidateResponse>, Error> {
        let resp = self
            .http_client()
            .get(validate_url)
            .header("Authorization", format!("OAuth {}", self.bearer_token()))
            .send()
            .await
            .map_err(|e| Error::Platform(format!("validate_token network error: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("validate_token => token rejected");
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Platform(format!("validate_token: HTTP {status} => {text}")));
        }

        let parsed: ValidateResponse = resp
            .json()
            .await
            .map_err(|e| Error::Platform(format!("validate_token parse error: {e}")))?;
        debug!("validate_token => user_id={} login={}", parsed.user_id, parsed.login);
        Ok(Some(parsed))
    }

    pub async fn get_broadcaster_type(&self, user_id: &str) -> Result<String, Error> {
        let url = format!("{}?id={}", self.endpoint("/users"), urlencoding::encode(user_id));
        debug!("get_broadcaster_type => URL='{}'", url);

        let body = self
            .execute("get_users", self.http_client().get(&url))
            .await?
            .success("get_users")?;

        let parsed: UsersResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Platform(format!("get_users parse error: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|u| u.broadcaster_type)
            .ok_or_else(|| Error::NotFound(format!("No user with id={user_id}")))
    }
}
