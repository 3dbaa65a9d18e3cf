//! HTTP implementation of the remote API
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with timeouts and compression
//! - Throttling every call through the shared rate limiter
//! - Classifying failures as transient (5xx, 429, network) or permanent (4xx)

use crate::api::traits::RemoteApi;
use crate::api::types::{AccountId, MatchId, MatchListPage, MatchListQuery, MatchRecord};
use crate::config::ApiConfig;
use crate::crawler::RateLimiter;
use crate::{ApiError, ApiResult};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const MATCHLIST_PATH: &[&str] = &["lol", "match", "v3", "matchlists", "by-account"];
const MATCH_PATH: &[&str] = &["lol", "match", "v3", "matches"];
const SUMMONER_PATH: &[&str] = &["lol", "summoner", "v3", "summoners", "by-name"];

/// Remote API client over HTTP
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct SummonerResponse {
    #[serde(rename = "accountId")]
    account_id: i64,
}

impl HttpApiClient {
    /// Creates a client for the configured API host
    ///
    /// # Arguments
    ///
    /// * `config` - API host, key and timeout settings
    /// * `limiter` - Rate limiter shared with every other client of the same key
    pub fn new(config: &ApiConfig, limiter: Arc<RateLimiter>) -> crate::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| crate::ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

        let client = Client::builder()
            .user_agent(concat!("match-spider/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            limiter,
        })
    }

    fn endpoint(&self, prefix: &[&str], last: &str) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Permanent {
                status: 0,
                message: format!("base-url {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(prefix)
            .push(last);
        Ok(url)
    }

    /// Issues one throttled GET and decodes the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> ApiResult<T> {
        self.limiter.acquire().await;

        tracing::debug!("GET {}", url.path());

        let response = self
            .client
            .get(url.clone())
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Decode(format!("{}: {}", url.path(), e)));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        tracing::debug!("GET {} failed with {}: {}", url.path(), status, body);

        Err(classify_status(status, retry_after, body))
    }
}

/// Maps an HTTP status to the retry taxonomy
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: String) -> ApiError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ApiError::Transient {
            status: Some(status.as_u16()),
            message: body,
            retry_after,
        }
    } else {
        ApiError::Permanent {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ApiError::Transient {
            status: None,
            message: err.to_string(),
            retry_after: None,
        }
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Permanent {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl RemoteApi for HttpApiClient {
    async fn resolve_account_id(&self, name: &str) -> ApiResult<AccountId> {
        let url = self.endpoint(SUMMONER_PATH, name)?;
        let summoner: SummonerResponse = self.get_json(url, &[]).await?;
        Ok(AccountId(summoner.account_id))
    }

    async fn fetch_match_list_page(
        &self,
        account: AccountId,
        begin_index: u32,
        query: MatchListQuery,
    ) -> ApiResult<MatchListPage> {
        let url = self.endpoint(MATCHLIST_PATH, &account.to_string())?;

        let mut params = vec![("beginIndex", begin_index.to_string())];
        if let Some(queue) = query.queue {
            params.push(("queue", queue.to_string()));
        }
        if let Some(season) = query.season {
            params.push(("season", season.to_string()));
        }

        self.get_json(url, &params).await
    }

    async fn fetch_match(&self, match_id: MatchId) -> ApiResult<MatchRecord> {
        let url = self.endpoint(MATCH_PATH, &match_id.to_string())?;
        let body: serde_json::Value = self.get_json(url, &[]).await?;
        match body.get("gameId").and_then(|v| v.as_i64()) {
            Some(id) if id != match_id.0 => Err(ApiError::Inconsistent(format!(
                "requested match {} but received {}",
                match_id, id
            ))),
            _ => Ok(MatchRecord::new(match_id, body)),
        }
    }
}
