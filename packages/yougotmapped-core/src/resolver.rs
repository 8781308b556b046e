//! Domain name resolution using the system resolver.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Default time allowed for a single name lookup.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no address found for '{0}'")]
    NoAddress(String),
    #[error("failed to resolve '{name}': {source}")]
    Lookup {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("resolving '{0}' timed out")]
    TimedOut(String),
}

/// Turns a domain name into a single address.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolveError>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT)
    }
}

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolveError> {
        let lookup = tokio::net::lookup_host((name, 0));
        let addrs = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(addrs)) => addrs.map(|sa| sa.ip()).collect::<Vec<_>>(),
            Ok(Err(e)) => {
                return Err(ResolveError::Lookup {
                    name: name.to_string(),
                    source: e,
                });
            }
            Err(_) => return Err(ResolveError::TimedOut(name.to_string())),
        };

        let chosen = pick_address(&addrs).ok_or_else(|| ResolveError::NoAddress(name.to_string()))?;
        tracing::debug!("Resolved {} -> {} ({} candidates)", name, chosen, addrs.len());
        Ok(chosen)
    }
}

/// Prefer the first IPv4 answer, falling back to the first answer of any family.
fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}
