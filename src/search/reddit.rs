//! Reddit search over the OAuth API.
//!
//! Sessions authenticate lazily with the client-credentials grant and refresh
//! the bearer token shortly before it expires. HTTP failures are mapped onto
//! [`UpstreamError`] so the backoff policy can act on them:
//!
//! | response | classification |
//! |---|---|
//! | 429 | `RateLimited`, hint from `Retry-After` or `x-ratelimit-reset` |
//! | `RATELIMIT` error in a JSON body | `RateLimited` with the free-text message |
//! | 5xx | `Server` |
//! | 401, 403, 404, 451 | `AccessDenied` |
//! | connect / timeout / decode failure | `Network` |

use super::{ItemDetails, ItemRef, SearchProvider, SearchQuery, SearchSession};
use crate::config::RedditConfig;
use crate::error::{Error, Result, UpstreamError};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Refresh the bearer token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Reddit search provider
#[derive(Clone, Debug)]
pub struct RedditProvider {
    config: RedditConfig,
}

impl RedditProvider {
    /// Provider using the given API settings
    pub fn new(config: RedditConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SearchProvider for RedditProvider {
    async fn open_session(&self) -> Result<Box<dyn SearchSession>> {
        let client_id = self
            .config
            .client_id
            .clone()
            .ok_or_else(|| Error::ConfigurationMissing {
                key: "REDDIT_CLIENT_ID".to_string(),
            })?;
        let client_secret =
            self.config
                .client_secret
                .clone()
                .ok_or_else(|| Error::ConfigurationMissing {
                    key: "REDDIT_CLIENT_SECRET".to_string(),
                })?;

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = Credentials {
            client_id,
            client_secret,
        };
        tracing::info!(api_base = %self.config.api_base, "Reddit session opened");

        // The first token is fetched by the first API call, under the caller's backoff policy
        Ok(Box::new(RedditSession {
            client,
            config: self.config.clone(),
            credentials,
            token: Mutex::new(None),
        }))
    }

    fn name(&self) -> &str {
        "reddit"
    }
}

struct Credentials {
    client_id: String,
    client_secret: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Deserialize)]
struct Thing {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    score: i64,
    upvote_ratio: Option<f64>,
    #[serde(default)]
    created_utc: f64,
}

impl From<PostData> for ItemDetails {
    fn from(post: PostData) -> Self {
        let created_utc = chrono::DateTime::from_timestamp(post.created_utc as i64, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default();
        ItemDetails {
            id: post.id,
            scope: post.subreddit,
            title: post.title,
            url: post.url,
            text: post.selftext,
            score: post.score,
            upvote_ratio: post.upvote_ratio,
            created_utc,
        }
    }
}

async fn fetch_token(
    client: &reqwest::Client,
    config: &RedditConfig,
    credentials: &Credentials,
) -> std::result::Result<AccessToken, UpstreamError> {
    let response = client
        .post(&config.auth_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(transport_error)?;
    // Rejected credentials must not read as an inaccessible unit
    let response = check_status(response).await.map_err(|e| match e {
        UpstreamError::AccessDenied { status } => {
            UpstreamError::Other(format!("token request rejected (HTTP {})", status))
        }
        other => other,
    })?;

    let token: TokenResponse = response.json().await.map_err(transport_error)?;
    Ok(AccessToken {
        value: token.access_token,
        expires_at: Instant::now() + Duration::from_secs(token.expires_in),
    })
}

struct RedditSession {
    client: reqwest::Client,
    config: RedditConfig,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl RedditSession {
    async fn bearer(&self) -> std::result::Result<String, UpstreamError> {
        let mut token = self.token.lock().await;
        let fresh = token
            .as_ref()
            .is_some_and(|t| t.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN);
        if !fresh {
            tracing::debug!("Refreshing Reddit access token");
            *token = Some(fetch_token(&self.client, &self.config, &self.credentials).await?);
        }
        token
            .as_ref()
            .map(|t| t.value.clone())
            .ok_or_else(|| UpstreamError::Other("session closed".to_string()))
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, UpstreamError> {
        let bearer = self.bearer().await?;
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(bearer)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: Value = response.json().await.map_err(transport_error)?;

        if let Some(message) = rate_limit_message(&body) {
            return Err(UpstreamError::RateLimited {
                retry_after: None,
                message,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl SearchSession for RedditSession {
    async fn search(&self, query: &SearchQuery) -> std::result::Result<Vec<ItemRef>, UpstreamError> {
        let path = format!("/r/{}/search", query.scope);
        let wanted = query.limit.map_or(usize::MAX, |l| l as usize);
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        while items.len() < wanted {
            let page_size = (wanted - items.len()).min(self.config.page_size as usize);
            let mut params = vec![
                ("q", query.query.clone()),
                ("limit", page_size.to_string()),
                ("t", query.time_filter.clone()),
                ("sort", query.sort.clone()),
                ("restrict_sr", "1".to_string()),
                ("raw_json", "1".to_string()),
            ];
            if let Some(cursor) = &after {
                params.push(("after", cursor.clone()));
            }

            let body = self.get_json(&path, &params).await?;
            let listing: Listing = serde_json::from_value(body)
                .map_err(|e| UpstreamError::Other(format!("unexpected search response: {}", e)))?;

            let page_len = listing.data.children.len();
            items.extend(listing.data.children.into_iter().map(|child| ItemRef {
                id: child.data.id,
                scope: if child.data.subreddit.is_empty() {
                    query.scope.clone()
                } else {
                    child.data.subreddit
                },
            }));

            match listing.data.after {
                Some(next) if page_len > 0 => after = Some(next),
                _ => break,
            }
        }

        items.truncate(wanted);
        tracing::debug!(scope = %query.scope, query = %query.query, results = items.len(), "Search complete");
        Ok(items)
    }

    async fn load_details(&self, item: &ItemRef) -> std::result::Result<ItemDetails, UpstreamError> {
        let body = self
            .get_json(
                "/api/info",
                &[("id", format!("t3_{}", item.id)), ("raw_json", "1".to_string())],
            )
            .await?;
        let listing: Listing = serde_json::from_value(body)
            .map_err(|e| UpstreamError::Other(format!("unexpected info response: {}", e)))?;

        listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data.into())
            .ok_or(UpstreamError::AccessDenied { status: 404 })
    }

    async fn comment_bodies(&self, item: &ItemRef) -> std::result::Result<Vec<String>, UpstreamError> {
        let body = self
            .get_json(
                &format!("/comments/{}", item.id),
                &[("raw_json", "1".to_string())],
            )
            .await?;

        let mut bodies = Vec::new();
        if let Some(tree) = body.get(1) {
            collect_comment_bodies(tree, &mut bodies);
        }
        Ok(bodies)
    }

    async fn close(&self) {
        self.token.lock().await.take();
        tracing::debug!("Reddit session closed");
    }
}

/// Depth-first walk of a comment listing; `more` stubs are not followed
fn collect_comment_bodies(listing: &Value, out: &mut Vec<String>) {
    let Some(children) = listing.pointer("/data/children").and_then(Value::as_array) else {
        return;
    };

    for child in children {
        if child.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };
        if let Some(body) = data.get("body").and_then(Value::as_str) {
            out.push(body.to_string());
        }
        if let Some(replies) = data.get("replies")
            && replies.is_object()
        {
            collect_comment_bodies(replies, out);
        }
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Network(e.to_string())
}

async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    match code {
        429 => {
            let retry_after = wait_header(response.headers());
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Too Many Requests".to_string());
            Err(UpstreamError::RateLimited {
                retry_after,
                message,
            })
        }
        401 | 403 | 404 | 451 => Err(UpstreamError::AccessDenied { status: code }),
        500..=599 => Err(UpstreamError::Server { status: code }),
        _ => Err(UpstreamError::Other(format!("HTTP {}", status))),
    }
}

fn wait_header(headers: &HeaderMap) -> Option<Duration> {
    ["retry-after", "x-ratelimit-reset"].iter().find_map(|name| {
        let secs: f64 = headers.get(*name)?.to_str().ok()?.trim().parse().ok()?;
        (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    })
}

fn rate_limit_message(body: &Value) -> Option<String> {
    if let Some(errors) = body.pointer("/json/errors").and_then(Value::as_array) {
        for entry in errors {
            let Some(parts) = entry.as_array() else {
                continue;
            };
            if parts.first().and_then(Value::as_str) == Some("RATELIMIT") {
                let message = parts.get(1).and_then(Value::as_str).unwrap_or("RATELIMIT");
                return Some(message.to_string());
            }
        }
    }

    if body.get("error").and_then(Value::as_u64) == Some(429) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Too Many Requests");
        return Some(message.to_string());
    }
    None
}
