//! IP geolocation.
//!
//! Provides the collaborator traits used by the orchestrator and an HTTP
//! implementation backed by ipinfo.io.

mod client;
mod record;

pub use client::IpInfoClient;
pub use record::{Coordinates, GeoRecord};

use crate::auth::ApiToken;
use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;

/// Why a lookup failed. Callers distinguish authentication problems from
/// missing data and transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),
    #[error("geolocation service rejected the API token (HTTP {0})")]
    Unauthorized(u16),
    #[error("no geolocation data for {0}")]
    NotFound(String),
    #[error("geolocation service rate limit exceeded")]
    RateLimited,
    #[error("unexpected response from geolocation service: {0}")]
    InvalidResponse(String),
}

/// Category of a [`LookupError`], stable across message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupErrorKind {
    Network,
    Unauthorized,
    NotFound,
    RateLimited,
    InvalidResponse,
}

impl LookupError {
    pub fn kind(&self) -> LookupErrorKind {
        match self {
            LookupError::Network(_) => LookupErrorKind::Network,
            LookupError::Unauthorized(_) => LookupErrorKind::Unauthorized,
            LookupError::NotFound(_) => LookupErrorKind::NotFound,
            LookupError::RateLimited => LookupErrorKind::RateLimited,
            LookupError::InvalidResponse(_) => LookupErrorKind::InvalidResponse,
        }
    }
}

/// Address to metadata lookup.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn lookup(&self, address: IpAddr, token: &ApiToken) -> Result<GeoRecord, LookupError>;
}

/// Discovery of the caller's own public address.
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    async fn public_ip(&self) -> Result<IpAddr, LookupError>;
}
