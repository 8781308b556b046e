use super::record::IpInfoResponse;
use super::{GeoLocator, GeoRecord, LookupError, PublicIpSource};
use crate::auth::ApiToken;
use crate::config::AppConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::net::IpAddr;
use std::time::Duration;

const USER_AGENT: &str = concat!("yougotmapped/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the ipinfo.io API.
#[derive(Debug, Clone)]
pub struct IpInfoClient {
    base_url: String,
    http: reqwest::Client,
}

impl IpInfoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LookupError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, LookupError> {
        Self::new(config.api_url.clone(), config.http_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map a non-success HTTP status to a lookup failure.
fn status_error(status: StatusCode, address: &str, body: &str) -> LookupError {
    match status.as_u16() {
        401 | 403 => LookupError::Unauthorized(status.as_u16()),
        404 => LookupError::NotFound(address.to_string()),
        429 => LookupError::RateLimited,
        code => {
            let body = body.trim();
            if body.is_empty() {
                LookupError::InvalidResponse(format!("server returned {}", code))
            } else {
                LookupError::InvalidResponse(format!("server returned {} - {}", code, body))
            }
        }
    }
}

fn network_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Network("request timed out".to_string())
    } else {
        LookupError::Network(e.to_string())
    }
}

#[async_trait]
impl GeoLocator for IpInfoClient {
    async fn lookup(&self, address: IpAddr, token: &ApiToken) -> Result<GeoRecord, LookupError> {
        let queried = address.to_string();
        let url = format!("{}/{}/json", self.base_url, queried);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!("Lookup of {} returned {}: {}", queried, status, body);
            return Err(status_error(status, &queried, &body));
        }

        let body: IpInfoResponse = resp
            .json()
            .await
            .map_err(|e| LookupError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        if let Some(err) = body.error() {
            tracing::debug!("Lookup of {} returned error body: {}", queried, err.describe());
            return Err(LookupError::NotFound(queried));
        }

        Ok(body.into_record(&queried))
    }
}

#[async_trait]
impl PublicIpSource for IpInfoClient {
    async fn public_ip(&self) -> Result<IpAddr, LookupError> {
        let url = format!("{}/ip", self.base_url);

        let resp = self.http.get(&url).send().await.map_err(network_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(status_error(status, "self", &body));
        }

        body.trim().parse::<IpAddr>().map_err(|_| {
            LookupError::InvalidResponse(format!("'{}' is not an IP address", body.trim()))
        })
    }
}
