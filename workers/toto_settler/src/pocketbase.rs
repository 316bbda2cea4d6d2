//! [`DataService`] backed by a PocketBase-style collection REST API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header::AUTHORIZATION, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{
    num::NonZeroU32,
    sync::{Arc, RwLock},
    time::Instant,
};
use tracing::debug;

use crate::{
    config::{RateLimits, ServiceConfig},
    error::ServiceError,
    metrics::MetricsCollector,
    service::{BetFilter, Credentials, DataService, Listing, MatchFilter, Session},
    types::{Bet, BetPatch, BetRecord, Match, MatchPatch, MatchRecord, NewBet, BETS, MATCHES},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordPage {
    page: u32,
    #[allow(dead_code)]
    per_page: u32,
    total_pages: u32,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub struct PocketBaseClient {
    client: reqwest::Client,
    base_url: String,
    auth_path: String,
    page_size: u32,
    token: RwLock<Option<String>>,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    metrics: MetricsCollector,
}

impl PocketBaseClient {
    pub fn new(config: &ServiceConfig, limits: &RateLimits, metrics: MetricsCollector) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(limits.requests_per_second)
                .ok_or_else(|| anyhow!("Invalid requests_per_second value"))?,
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_path: config.auth_path.clone(),
            page_size: config.page_size.max(1),
            token: RwLock::new(None),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            metrics,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, collection)
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), urlencoding::encode(id))
    }

    fn auth_url(&self) -> String {
        if self.auth_path.starts_with('/') {
            format!("{}{}", self.base_url, self.auth_path)
        } else {
            format!("{}/{}", self.base_url, self.auth_path)
        }
    }

    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    /// Sends a request after waiting for the rate limiter, mapping non-2xx
    /// statuses onto [`ServiceError`].
    async fn execute(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let wait_start = Instant::now();
        self.rate_limiter.until_ready().await;
        self.metrics.record_rate_limit_wait(wait_start.elapsed());

        let tracker = self.metrics.record_request_start();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracker.finish(false);
                let err = ServiceError::from(e);
                self.metrics.record_error(err.to_string());
                return Err(err);
            }
        };

        let status = response.status();
        if status.is_success() {
            tracker.finish(true);
            return Ok(response);
        }

        tracker.finish(false);
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        let err = ServiceError::from_status(status, message);
        self.metrics.record_error(err.to_string());
        Err(err)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let request = match self.token() {
            Some(token) => request.header(AUTHORIZATION, token),
            None => request,
        };
        self.execute(request).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        let url = response.url().to_string();
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Transient(format!("unreadable response from {}: {}", url, e)))
    }

    async fn list_records(
        &self,
        collection: &'static str,
        filter: Option<String>,
        sort: Option<&str>,
    ) -> Result<Vec<Value>, ServiceError> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![("page", page.to_string()), ("perPage", self.page_size.to_string())];
            if let Some(filter) = &filter {
                query.push(("filter", filter.clone()));
            }
            if let Some(sort) = sort {
                query.push(("sort", sort.to_string()));
            }

            let response = self
                .send(self.client.get(self.collection_url(collection)).query(&query))
                .await?;
            let body: RecordPage = Self::read_json(response).await?;

            let done = body.items.is_empty() || body.page >= body.total_pages;
            items.extend(body.items);
            if done {
                break;
            }
            page += 1;
        }

        debug!(collection, count = items.len(), pages = page, "listed records");
        Ok(items)
    }

    /// Decodes each item on its own so one malformed record never hides the rest.
    /// Rejected items are counted here and handed back to the caller.
    fn decode_all<R, T>(&self, collection: &'static str, items: Vec<Value>) -> Listing<T>
    where
        R: DeserializeOwned,
        T: TryFrom<R, Error = ServiceError>,
    {
        let mut records = Vec::with_capacity(items.len());
        let mut rejected = Vec::new();

        for item in items {
            match decode::<R, T>(collection, item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("rejected record: {}", e);
                    self.metrics.record_invalid_record();
                    rejected.push(e);
                }
            }
        }

        Listing::new(records).with_rejected(rejected)
    }
}

fn decode<R, T>(collection: &'static str, item: Value) -> Result<T, ServiceError>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = ServiceError>,
{
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let record: R =
        serde_json::from_value(item).map_err(|e| ServiceError::invalid_record(collection, id, e.to_string()))?;
    T::try_from(record)
}

#[async_trait]
impl DataService for PocketBaseClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ServiceError> {
        let body = json!({
            "identity": credentials.identity,
            "password": credentials.password,
        });

        // Any client error from the login endpoint means the credentials were refused.
        let response = self
            .execute(self.client.post(self.auth_url()).json(&body))
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(m) | ServiceError::Conflict(m) | ServiceError::Validation(m) => {
                    ServiceError::Auth(m)
                }
                other => other,
            })?;

        let auth: AuthResponse = Self::read_json(response).await?;
        if auth.token.is_empty() {
            return Err(ServiceError::Auth("login response carried no token".to_string()));
        }

        self.set_token(Some(auth.token.clone()));
        Ok(Session {
            token: auth.token,
            issued_at: Utc::now(),
        })
    }

    async fn list_matches(&self, filter: &MatchFilter) -> Result<Listing<Match>, ServiceError> {
        let items = self.list_records(MATCHES, filter.expression(), filter.sort()).await?;
        Ok(self.decode_all::<MatchRecord, Match>(MATCHES, items))
    }

    async fn get_match(&self, id: &str) -> Result<Match, ServiceError> {
        let response = self.send(self.client.get(self.record_url(MATCHES, id))).await?;
        decode::<MatchRecord, Match>(MATCHES, Self::read_json(response).await?)
    }

    async fn update_match(&self, id: &str, patch: &MatchPatch) -> Result<Match, ServiceError> {
        let response = self
            .send(self.client.patch(self.record_url(MATCHES, id)).json(patch))
            .await?;
        decode::<MatchRecord, Match>(MATCHES, Self::read_json(response).await?)
    }

    async fn list_bets(&self, filter: &BetFilter) -> Result<Listing<Bet>, ServiceError> {
        let items = self.list_records(BETS, filter.expression(), None).await?;
        Ok(self.decode_all::<BetRecord, Bet>(BETS, items))
    }

    async fn update_bet(&self, id: &str, patch: &BetPatch) -> Result<Bet, ServiceError> {
        let response = self.send(self.client.patch(self.record_url(BETS, id)).json(patch)).await?;
        decode::<BetRecord, Bet>(BETS, Self::read_json(response).await?)
    }

    async fn create_bet(&self, bet: &NewBet) -> Result<Bet, ServiceError> {
        let response = self.send(self.client.post(self.collection_url(BETS)).json(bet)).await?;
        decode::<BetRecord, Bet>(BETS, Self::read_json(response).await?)
    }
}
