//! One-shot HTTP pulls of the leaderboard, used as the fallback transport.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::{
    dto::leaderboard::LeaderboardSnapshot,
    error::{PayloadError, PullError, PullResult},
};

/// Turns a response body into a snapshot.
type Decoder = fn(Value) -> Result<LeaderboardSnapshot, PayloadError>;

/// Path of the current period snapshot.
pub const CURRENT_LEADERBOARD_PATH: &str = "api/leaderboard";
/// Path of archived period snapshots, keyed by the `endDate` query parameter.
pub const HISTORICAL_LEADERBOARD_PATH: &str = "api/leaderboard/historical";

/// Abstraction over the request/response leaderboard endpoints.
pub trait PullSource: Send + Sync {
    /// Fetch the snapshot of the current period.
    fn fetch_current(&self) -> BoxFuture<'static, PullResult<LeaderboardSnapshot>>;

    /// Fetch the snapshot of the period that ended at `end_date`.
    fn fetch_historical(&self, end_date: &str)
    -> BoxFuture<'static, PullResult<LeaderboardSnapshot>>;
}

/// [`PullSource`] backed by the backend's REST API.
#[derive(Clone)]
pub struct HttpPullSource {
    client: Client,
    base_url: Arc<str>,
}

impl HttpPullSource {
    /// Build a pull source for `backend`, bounding every request by `timeout`.
    pub fn new(backend: &Url, timeout: Duration) -> PullResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| PullError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(backend.as_str().trim_end_matches('/')),
        })
    }

    async fn get_snapshot(
        self,
        path: &'static str,
        query: Option<(&'static str, String)>,
        decode: Decoder,
    ) -> PullResult<LeaderboardSnapshot> {
        let url = format!("{}/{}", self.base_url, path);
        let mut builder = self.client.get(&url);
        if let Some((key, value)) = query {
            builder = builder.query(&[(key, value)]);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| PullError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PullError::RequestStatus {
                path: path.to_string(),
                status,
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|source| PullError::DecodeResponse {
                path: path.to_string(),
                source,
            })?;

        decode(body).map_err(|source| PullError::InvalidPayload {
            path: path.to_string(),
            source,
        })
    }
}

impl PullSource for HttpPullSource {
    fn fetch_current(&self) -> BoxFuture<'static, PullResult<LeaderboardSnapshot>> {
        let source = self.clone();
        Box::pin(source.get_snapshot(
            CURRENT_LEADERBOARD_PATH,
            None,
            LeaderboardSnapshot::from_json_value,
        ))
    }

    fn fetch_historical(
        &self,
        end_date: &str,
    ) -> BoxFuture<'static, PullResult<LeaderboardSnapshot>> {
        let source = self.clone();
        let end_date = end_date.to_string();
        Box::pin(source.get_snapshot(
            HISTORICAL_LEADERBOARD_PATH,
            Some(("endDate", end_date)),
            LeaderboardSnapshot::from_archived_value,
        ))
    }
}
