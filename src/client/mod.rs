//! Upstream HTTP client (C1)
//!
//! Authenticates with OAuth2 client-credentials, caches the bearer token,
//! and exposes the two paged export endpoints the rest of the pipeline
//! consumes. Schema normalization of loosely-typed upstream fields happens
//! in `schema` before a payload ever reaches the rest of the crate.

pub mod schema;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, TokenResponse, TokenUrl};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use schema::{NormalizedChat, NormalizedContact};

const TOKEN_REFRESH_SKEW: Duration = Duration::seconds(60);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Offset-based pagination info, normalized from whatever shape the
/// upstream response uses.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub total: i64,
    pub exported: i64,
    pub has_next_page: bool,
}

#[derive(Debug, Clone)]
pub struct ContactsPage {
    pub data: Vec<NormalizedContact>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct ChatsPage {
    pub data: Vec<NormalizedChat>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default)]
pub struct ContactsParams {
    pub offset: i64,
    pub limit: i64,
    pub updated_from: Option<NaiveDate>,
    pub updated_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatsParams {
    pub offset: i64,
    pub limit: i64,
    pub date_range_from: Option<NaiveDate>,
    pub date_range_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct ContactsWire {
    contacts: Vec<NormalizedContact>,
    exported: i64,
    total: i64,
    #[allow(dead_code)]
    #[serde(default)]
    trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatsWire {
    chats: Vec<NormalizedChat>,
    exported: i64,
    total: i64,
}

/// Client for the upstream conversational-messaging platform.
pub struct UpstreamClient {
    http: HttpClient,
    oauth: BasicClient,
    base_url: String,
    token: RwLock<Option<CachedToken>>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Arc<Self>> {
        let http = HttpClient::builder()
            .connect_timeout(StdDuration::from_secs(10))
            .timeout(StdDuration::from_secs(60))
            .build()
            .map_err(Error::Reqwest)?;

        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| Error::Configuration(format!("invalid token url: {e}")))?;
        let auth_url = AuthUrl::new(config.token_url.clone())
            .map_err(|e| Error::Configuration(format!("invalid token url: {e}")))?;

        let oauth = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        Ok(Arc::new(Self {
            http,
            oauth,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }))
    }

    /// Returns a valid bearer token, refreshing it if fewer than
    /// `TOKEN_REFRESH_SKEW` remain, per `spec.md` §4.1.
    async fn valid_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at - Utc::now() > TOKEN_REFRESH_SKEW {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Utc::now() > TOKEN_REFRESH_SKEW {
                return Ok(token.access_token.clone());
            }
        }

        let result = self
            .oauth
            .exchange_client_credentials()
            .request_async(async_http_client)
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;

        let expires_in = result
            .expires_in()
            .map(|d| Duration::from_std(d).unwrap_or(Duration::seconds(0)))
            .unwrap_or(Duration::minutes(55));

        let token = CachedToken {
            access_token: result.access_token().secret().clone(),
            expires_at: Utc::now() + expires_in,
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// `GET /contacts/export`
    pub async fn get_contacts(&self, params: &ContactsParams) -> Result<ContactsPage> {
        let token = self.valid_token().await?;
        let mut request = self
            .http
            .get(format!("{}/contacts/export", self.base_url))
            .bearer_auth(&token)
            .query(&[("offset", params.offset), ("limit", params.limit)]);
        if let Some(from) = params.updated_from {
            request = request.query(&[("updated_from", from.format("%Y-%m-%d").to_string())]);
        }
        if let Some(to) = params.updated_to {
            request = request.query(&[("updated_to", to.format("%Y-%m-%d").to_string())]);
        }

        let wire: ContactsWire = self.execute(request, "/contacts/export").await?;
        let has_next_page = params.offset + wire.contacts.len() as i64 < wire.total;

        Ok(ContactsPage {
            data: wire.contacts,
            pagination: Pagination {
                total: wire.total,
                exported: wire.exported,
                has_next_page,
            },
        })
    }

    /// `GET /chats/export`
    pub async fn get_chats(&self, params: &ChatsParams) -> Result<ChatsPage> {
        let token = self.valid_token().await?;
        let mut request = self
            .http
            .get(format!("{}/chats/export", self.base_url))
            .bearer_auth(&token)
            .query(&[("offset", params.offset), ("limit", params.limit)]);
        if let Some(from) = params.date_range_from {
            request = request.query(&[("date_range_from", from.format("%Y-%m-%d").to_string())]);
        }
        if let Some(to) = params.date_range_to {
            request = request.query(&[("date_range_to", to.format("%Y-%m-%d").to_string())]);
        }

        let wire: ChatsWire = self.execute(request, "/chats/export").await?;
        let has_next_page = params.offset + wire.chats.len() as i64 < wire.total;

        Ok(ChatsPage {
            data: wire.chats,
            pagination: Pagination {
                total: wire.total,
                exported: wire.exported,
                has_next_page,
            },
        })
    }

    async fn execute<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T> {
        let response = request.send().await.map_err(Error::Reqwest)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                body,
            });
        }

        let body = response.text().await.map_err(Error::Reqwest)?;
        serde_json::from_str(&body).map_err(|e| Error::Schema(format!("{endpoint}: {e}")))
    }
}
