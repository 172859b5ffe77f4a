//! Outbound vote-status requests.

use async_trait::async_trait;

use super::VoteError;

/// Fetches the raw body of a directory's vote-status endpoint. The
/// reconciler applies its own deadline around the call; implementations
/// should not retry.
#[async_trait]
pub trait VoteChecker: Send + Sync {
    async fn fetch_status(&self, url: &str) -> Result<String, VoteError>;
}

/// reqwest-backed checker used in production.
#[cfg(feature = "vote-check")]
pub struct HttpVoteChecker {
    client: reqwest::Client,
}

#[cfg(feature = "vote-check")]
impl HttpVoteChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "vote-check")]
impl Default for HttpVoteChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "vote-check")]
#[async_trait]
impl VoteChecker for HttpVoteChecker {
    async fn fetch_status(&self, url: &str) -> Result<String, VoteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| VoteError::CheckFailed(err.to_string()))?;
        if !response.status().is_success() {
            return Err(VoteError::CheckFailed(format!(
                "status {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|err| VoteError::CheckFailed(err.to_string()))
    }
}
