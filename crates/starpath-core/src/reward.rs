//! Reward artwork acquisition.
//!
//! A matched task earns a piece of artwork: ideally freshly generated from
//! the task's image prompt, otherwise the stock artwork bundled with the
//! task. Generation failures of any kind -- connection errors, non-success
//! responses, timeouts -- degrade to the stock fallback with a warning log.
//! The engine never sees a reward error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RewardError;

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    const SERVICE: &str = "starpath";

    pub fn get(key: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<(), Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keyring key under which the reward-service token is stored.
pub const API_KEY_NAME: &str = "reward_api_key";

/// Reward artwork: generated bytes, or the id of a bundled stock image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RewardArtifact {
    Generated { bytes: Vec<u8> },
    Stock { artwork_id: String },
}

impl RewardArtifact {
    pub fn is_generated(&self) -> bool {
        matches!(self, RewardArtifact::Generated { .. })
    }
}

/// Capability to turn an image prompt into reward artwork.
///
/// Implementations never fail: any trouble yields the stock fallback.
/// `fetch` may block for up to the implementation's timeout, so call it from
/// a plain thread, not from inside an async task.
pub trait RewardFetcher: Send + Sync {
    fn fetch(&self, prompt: &str, fallback_artwork_id: &str) -> RewardArtifact;
}

/// Always serves the stock artwork. Used offline and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockRewardFetcher;

impl RewardFetcher for StockRewardFetcher {
    fn fetch(&self, _prompt: &str, fallback_artwork_id: &str) -> RewardArtifact {
        RewardArtifact::Stock {
            artwork_id: fallback_artwork_id.to_string(),
        }
    }
}

/// Fetches generated artwork over HTTP from an image-generation endpoint.
pub struct HttpRewardFetcher {
    base_url: String,
    model: String,
    width: u32,
    height: u32,
    timeout: Duration,
    api_key: Option<String>,
}

impl HttpRewardFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: "turbo".into(),
            width: 512,
            height: 512,
            timeout: Duration::from_secs(10),
            api_key: None,
        }
    }

    /// Load the authorization token from the OS keyring, if present.
    pub fn with_keyring_credentials(mut self) -> Self {
        self.api_key = keyring_store::get(API_KEY_NAME).ok().flatten();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_image_params(mut self, model: impl Into<String>, width: u32, height: u32) -> Self {
        self.model = model.into();
        self.width = width;
        self.height = height;
        self
    }

    fn request_url(&self, prompt: &str) -> String {
        format!(
            "{}/{}?model={}&nologo=true&width={}&height={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(prompt),
            self.model,
            self.width,
            self.height,
        )
    }

    fn fetch_bytes(&self, prompt: &str) -> Result<Vec<u8>, RewardError> {
        let url = self.request_url(prompt);
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RewardError::Request(e.to_string()))?;

        let mut request = client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = block_on(request.send())?.map_err(|e| {
            if e.is_timeout() {
                RewardError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                RewardError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RewardError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = block_on(response.bytes())?.map_err(|e| RewardError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl RewardFetcher for HttpRewardFetcher {
    fn fetch(&self, prompt: &str, fallback_artwork_id: &str) -> RewardArtifact {
        match self.fetch_bytes(prompt) {
            Ok(bytes) => RewardArtifact::Generated { bytes },
            Err(e) => {
                tracing::warn!(error = %e, prompt, "reward generation failed, serving stock artwork");
                RewardArtifact::Stock {
                    artwork_id: fallback_artwork_id.to_string(),
                }
            }
        }
    }
}

/// Drive a future to completion from sync code, reusing the surrounding
/// runtime when one exists.
fn block_on<F: std::future::Future>(fut: F) -> Result<F::Output, RewardError> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => {
            let rt = tokio::runtime::Runtime::new().map_err(|e| RewardError::Runtime(e.to_string()))?;
            Ok(rt.block_on(fut))
        }
    }
}
