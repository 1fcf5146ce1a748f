//! Google Analytics 4 Data API access.
//!
//! The engine only needs [`ReportBackend`]: given a property, a date window and
//! a `pagePath` partial-match pattern, return the per-path `totalUsers`.
//! [`Ga4Client`] implements it over the REST API using a service account key.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::window::Window;

pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
pub const PAGE_PATH_DIMENSION: &str = "pagePath";
pub const TOTAL_USERS_METRIC: &str = "totalUsers";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const PAGE_SIZE: u64 = 10_000;
const TOKEN_LIFETIME_SECS: i64 = 3600;
// Refresh this long before the token actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ReportError {
    /// The service account key could not be read or parsed
    #[error("invalid credentials file {path}: {message}")]
    Credentials { path: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success status, including rejected filter patterns
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Users counted for one tracked page path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCount {
    pub path: String,
    pub users: u64,
}

pub trait ReportBackend {
    fn run_report(
        &self,
        property_id: &str,
        window: &Window,
        pattern: &str,
    ) -> Result<Vec<PathCount>, ReportError>;
}

impl<B: ReportBackend + ?Sized> ReportBackend for &B {
    fn run_report(
        &self,
        property_id: &str,
        window: &Window,
        pattern: &str,
    ) -> Result<Vec<PathCount>, ReportError> {
        (**self).run_report(property_id, window, pattern)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    date_ranges: Vec<DateRange>,
    dimensions: Vec<Named>,
    metrics: Vec<Named>,
    dimension_filter: FilterExpression,
    limit: u64,
    offset: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
struct Named {
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct FilterExpression {
    filter: Filter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    field_name: &'static str,
    string_filter: StringFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StringFilter {
    match_type: MatchType,
    value: String,
    case_sensitive: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum MatchType {
    PartialRegexp,
}

impl RunReportRequest {
    /// `totalUsers` by `pagePath`, keeping paths the pattern is found in.
    pub fn page_path_users(window: &Window, pattern: &str, offset: u64) -> Self {
        Self {
            date_ranges: vec![DateRange {
                start_date: window.start_str(),
                end_date: window.end_str(),
            }],
            dimensions: vec![Named {
                name: PAGE_PATH_DIMENSION,
            }],
            metrics: vec![Named {
                name: TOTAL_USERS_METRIC,
            }],
            dimension_filter: FilterExpression {
                filter: Filter {
                    field_name: PAGE_PATH_DIMENSION,
                    string_filter: StringFilter {
                        match_type: MatchType::PartialRegexp,
                        value: pattern.to_string(),
                        case_sensitive: true,
                    },
                },
            },
            limit: PAGE_SIZE,
            offset,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
    #[serde(default)]
    row_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<CellValue>,
    #[serde(default)]
    metric_values: Vec<CellValue>,
}

#[derive(Debug, Default, Deserialize)]
struct CellValue {
    #[serde(default)]
    value: String,
}

impl RunReportResponse {
    pub fn path_counts(&self) -> Result<Vec<PathCount>, ReportError> {
        self.rows
            .iter()
            .map(|row| {
                let path = row
                    .dimension_values
                    .first()
                    .map(|v| v.value.clone())
                    .unwrap_or_default();
                let raw = row.metric_values.first().map(|v| v.value.as_str()).ok_or_else(|| {
                    ReportError::MalformedResponse(format!("row for '{}' has no metric value", path))
                })?;
                let users = raw.parse::<u64>().map_err(|e| {
                    ReportError::MalformedResponse(format!(
                        "metric value '{}' for '{}' is not a count: {}",
                        raw, path, e
                    ))
                })?;
                Ok(PathCount { path, users })
            })
            .collect()
    }

    pub fn row_count(&self) -> u64 {
        self.row_count.unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Pulls the human readable message out of a Google API error body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if parsed.error.status.is_empty() => parsed.error.message,
        Ok(parsed) => format!("{} ({})", parsed.error.message, parsed.error.status),
        Err(_) => body.trim().to_string(),
    }
}

/// Requests pages at increasing offsets until the reported row count is reached.
fn collect_pages<F>(mut fetch_page: F) -> Result<Vec<PathCount>, ReportError>
where
    F: FnMut(u64) -> Result<RunReportResponse, ReportError>,
{
    let mut counts = Vec::new();
    let mut offset = 0;
    loop {
        let response = fetch_page(offset)?;
        let page = response.path_counts()?;
        let fetched = page.len() as u64;
        counts.extend(page);
        offset += fetched;
        if fetched == 0 || offset >= response.row_count() {
            return Ok(counts);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let credentials_error = |message: String| ReportError::Credentials {
            path: path.display().to_string(),
            message,
        };
        let content = fs::read_to_string(path).map_err(|e| credentials_error(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| credentials_error(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// Blocking GA4 Data API client authenticated as a service account.
pub struct Ga4Client {
    http: reqwest::blocking::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    api_base: String,
    token: RefCell<Option<AccessToken>>,
}

impl std::fmt::Debug for Ga4Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ga4Client")
            .field("client_email", &self.key.client_email)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl Ga4Client {
    pub fn new(key: ServiceAccountKey, api: &ApiConfig) -> Result<Self, ReportError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ReportError::Auth(format!("unusable private key: {}", e)))?;
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("pagetally/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            key,
            encoding_key,
            api_base: api.base_url.trim_end_matches('/').to_string(),
            token: RefCell::new(None),
        })
    }

    pub fn from_credentials_file(path: &Path, api: &ApiConfig) -> Result<Self, ReportError> {
        info!(action = "load", component = "credentials", file_path = ?path, "Loading service account key");
        let key = ServiceAccountKey::from_file(path)?;
        let client = Self::new(key, api)?;
        info!(
            action = "complete",
            component = "ga4_client",
            client_email = %client.key.client_email,
            "GA4 client initialized"
        );
        Ok(client)
    }

    fn access_token(&self) -> Result<String, ReportError> {
        if let Some(token) = self.token.borrow().as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }
        let token = self.request_token()?;
        let value = token.value.clone();
        *self.token.borrow_mut() = Some(token);
        Ok(value)
    }

    fn request_token(&self) -> Result<AccessToken, ReportError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: ANALYTICS_READONLY_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| ReportError::Auth(format!("failed to sign assertion: {}", e)))?;

        debug!(action = "request", component = "oauth_token", token_uri = %self.key.token_uri, "Requesting access token");
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ReportError::Auth(format!(
                "token endpoint returned {}: {}",
                status,
                body.trim()
            )));
        }

        let token: TokenResponse = response.json()?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS as u64));
        Ok(AccessToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }

    fn run_report_page(
        &self,
        property_id: &str,
        request: &RunReportRequest,
    ) -> Result<RunReportResponse, ReportError> {
        let endpoint = format!("{}/v1beta/properties/{}:runReport", self.api_base, property_id);
        let token = self.access_token()?;
        let response = self.http.post(&endpoint).bearer_auth(token).json(request).send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json()?);
        }

        let message = api_error_message(&response.text().unwrap_or_default());
        Err(match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                self.token.borrow_mut().take();
                ReportError::Auth(message)
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => ReportError::RateLimited(message),
            _ => ReportError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }
}

impl ReportBackend for Ga4Client {
    fn run_report(
        &self,
        property_id: &str,
        window: &Window,
        pattern: &str,
    ) -> Result<Vec<PathCount>, ReportError> {
        collect_pages(|offset| {
            let request = RunReportRequest::page_path_users(window, pattern, offset);
            self.run_report_page(property_id, &request)
        })
    }
}
