//! Target classification.
//!
//! A target is whatever the user typed: an IP literal or a name that still
//! needs resolving. Classification happens once, here, and is never repeated
//! further down the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target must not be empty")]
    Empty,
}

/// A single user-supplied target, validated non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Target {
    raw: String,
}

impl Target {
    /// Accept a raw target string. Empty and whitespace-only input is rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self, TargetError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TargetError::Empty);
        }
        Ok(Self { raw })
    }

    /// Target standing in for the caller's own public address.
    pub fn from_address(addr: IpAddr) -> Self {
        Self {
            raw: addr.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> TargetKind {
        classify(&self.raw)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::new(s)
    }
}

/// Outcome of classifying a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetKind {
    /// Already an IPv4 or IPv6 literal
    Address(IpAddr),
    /// Anything else; handed to the name resolver
    Name(String),
}

impl TargetKind {
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::Address(_) => "address",
            TargetKind::Name(_) => "name",
        }
    }
}

/// Classify a raw string without any I/O.
///
/// Surrounding whitespace is ignored; nothing else is normalized, so a
/// syntactically invalid address such as `999.1.1.1` is treated as a name and
/// left for the resolver to reject.
pub fn classify(raw: &str) -> TargetKind {
    let trimmed = raw.trim();
    match trimmed.parse::<IpAddr>() {
        Ok(addr) => TargetKind::Address(addr),
        Err(_) => TargetKind::Name(trimmed.to_string()),
    }
}
