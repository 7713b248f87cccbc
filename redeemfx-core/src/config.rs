// File: redeemfx-core/src/config.rs
//
// Session settings, read from a JSON setup file. Every field has a default so
// an absent or partial file is fine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::Error;
use crate::platforms::twitch::client::DEFAULT_HELIX_BASE_URL;
use crate::platforms::twitch::requests::users::VALIDATE_URL;
use crate::platforms::twitch_eventsub::runtime::DEFAULT_EVENTSUB_URL;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub helix_base_url: String,
    pub eventsub_url: String,
    /// Where EventSub subscriptions are created. Defaults to
    /// `{helix_base_url}/eventsub/subscriptions`.
    pub eventsub_subscribe_url: Option<String>,
    pub validate_url: String,

    pub retry_failed_rewards: bool,
    pub max_retries: u32,
    /// Uniform range, in simulation seconds, before a `TryLater` is retried.
    pub retry_delay_secs: (f64, f64),

    /// How long the simulation may sit paused before redemptions that are not
    /// available in menus get refunded.
    pub idle_threshold_secs: f64,

    pub auto_fulfill_default: bool,
    /// Per-title override of `auto_fulfill_default`.
    pub auto_fulfill: HashMap<String, bool>,

    /// Uniform range for the first reconnect delay; doubles per attempt.
    pub reconnect_base_secs: (f64, f64),
    pub reconnect_cap_secs: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            helix_base_url: DEFAULT_HELIX_BASE_URL.to_string(),
            eventsub_url: DEFAULT_EVENTSUB_URL.to_string(),
            eventsub_subscribe_url: None,
            validate_url: VALIDATE_URL.to_string(),
            retry_failed_rewards: true,
            max_retries: 4,
            retry_delay_secs: (2.0, 5.0),
            idle_threshold_secs: 10.0,
            auto_fulfill_default: true,
            auto_fulfill: HashMap::new(),
            reconnect_base_secs: (1.0, 2.0),
            reconnect_cap_secs: 30.0,
        }
    }
}

impl SessionConfig {
    /// `$XDG_CONFIG_HOME/redeemfx/setup.json` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("redeemfx").join("setup.json"))
    }

    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            info!("No setup file at {} => using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_json(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!("Loaded setup file {}", path.display());
        Ok(cfg)
    }

    /// Parses and validates a setup document.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let de = &mut serde_json::Deserializer::from_str(text);
        let cfg: Self = serde_path_to_error::deserialize(de)
            .map_err(|e| Error::Config(format!("at '{}': {}", e.path(), e.inner())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let urls = [
            ("helix_base_url", Some(&self.helix_base_url)),
            ("eventsub_url", Some(&self.eventsub_url)),
            ("eventsub_subscribe_url", self.eventsub_subscribe_url.as_ref()),
            ("validate_url", Some(&self.validate_url)),
        ];
        for (name, raw) in urls {
            if let Some(raw) = raw {
                Url::parse(raw).map_err(|e| Error::Config(format!("{name}: {e}")))?;
            }
        }

        let ranges = [
            ("retry_delay_secs", self.retry_delay_secs),
            ("reconnect_base_secs", self.reconnect_base_secs),
        ];
        for (name, (lo, hi)) in ranges {
            if !(lo >= 0.0 && lo <= hi) {
                return Err(Error::Config(format!("{name} must satisfy 0 <= min <= max")));
            }
        }
        if self.reconnect_cap_secs < self.reconnect_base_secs.1 {
            return Err(Error::Config(
                "reconnect_cap_secs must be at least the reconnect base".into(),
            ));
        }
        Ok(())
    }

    pub fn should_auto_fulfill(&self, title: &str) -> bool {
        self.auto_fulfill
            .get(title)
            .copied()
            .unwrap_or(self.auto_fulfill_default)
    }

    pub fn subscribe_url(&self) -> String {
        match &self.eventsub_subscribe_url {
            Some(u) => u.clone(),
            None => format!(
                "{}/eventsub/subscriptions",
                self.helix_base_url.trim_end_matches('/')
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = SessionConfig::from_json(r#"{ "max_retries": 2, "auto_fulfill": { "Kill": false } }"#)
            .unwrap();
        assert_eq!(cfg.max_retries, 2);
        assert!(cfg.retry_failed_rewards);
        assert!(!cfg.should_auto_fulfill("Kill"));
        assert!(cfg.should_auto_fulfill("Give Spear"));
    }

    #[test]
    fn bad_field_reports_its_path() {
        let err = SessionConfig::from_json(r#"{ "max_retries": "four" }"#).unwrap_err();
        assert!(err.to_string().contains("max_retries"), "got: {err}");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SessionConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg.max_retries, 4);
    }

    #[test]
    fn mock_api_urls_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{ "helix_base_url": "http://localhost:8080/mock", "eventsub_url": "ws://127.0.0.1:8081/ws" }}"#
        )
        .unwrap();

        let cfg = SessionConfig::load(&path).unwrap();
        assert_eq!(cfg.subscribe_url(), "http://localhost:8080/mock/eventsub/subscriptions");
        assert!(cfg.eventsub_url.starts_with("ws://"));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let cfg = SessionConfig {
            eventsub_url: "not a url".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let cfg = SessionConfig {
            retry_delay_secs: (5.0, 2.0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_reconnect_base_is_rejected_when_parsing() {
        let err = SessionConfig::from_json(r#"{ "reconnect_base_secs": [-1.0, -1.0] }"#).unwrap_err();
        assert!(err.to_string().contains("reconnect_base_secs"), "{err}");
    }
}
