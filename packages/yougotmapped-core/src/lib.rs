//! yougotmapped Core Library
//!
//! This crate provides everything behind the `yougotmapped` CLI:
//! - Target classification and DNS resolution
//! - IP geolocation through the ipinfo.io API
//! - Ping and traceroute diagnostics, including last-hop geolocation
//! - Ordered aggregation of the results into map points
//! - Interactive HTML map rendering (Leaflet)
//! - API token storage (keyring with file fallback)
//!
//! # Features
//!
//! - `keyring-storage` (default): Use platform keyring for token storage
//! - `file-storage`: Use file-based token storage (for headless Linux)
//! - `browser`: Allow opening the rendered map in the default browser
//!
//! # Example
//!
//! ```no_run
//! use yougotmapped_core::{
//!     auth, config, IpInfoClient, LeafletRenderer, LocateOptions, MapRenderer, Orchestrator,
//!     SystemDiagnostics, SystemResolver, Target,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config();
//!     let token = auth::load_token()?.map(|(token, _source)| token);
//!
//!     let client = IpInfoClient::from_config(&config)?;
//!     let orchestrator = Orchestrator::new(
//!         Box::new(SystemResolver::default()),
//!         Box::new(client.clone()),
//!         Box::new(SystemDiagnostics::from_config(&config)),
//!         Box::new(client),
//!     );
//!
//!     let targets = vec![Target::new("8.8.8.8")?, Target::new("example.com")?];
//!     let options = LocateOptions { ping: true, traceroute: true, concurrency: 1 };
//!     let report = orchestrator.run(targets, token.as_ref(), &options).await?;
//!
//!     if !report.points.is_empty() {
//!         let path = LeafletRenderer::new(&config.map_output).render(&report.points)?;
//!         println!("Map saved to {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod geo;
pub mod map;
pub mod orchestrator;
pub mod resolver;
pub mod target;

// Re-export commonly used types
pub use auth::{ApiToken, TokenSource};
pub use config::{AppConfig, ConfigSource};
pub use diagnostics::{
    DiagnosticResult, DiagnosticsRunner, Hop, PingOutcome, SystemDiagnostics, TraceOutcome,
};
pub use geo::{
    Coordinates, GeoLocator, GeoRecord, IpInfoClient, LookupError, LookupErrorKind, PublicIpSource,
};
pub use map::{LeafletRenderer, MapRenderer, PointRole, RenderError, ResultSet, TaggedPoint};
pub use orchestrator::{
    BatchError, BatchReport, LocateOptions, LocateProgress, LocateStage, Orchestrator,
    ProgressCallback, TargetOutcome, TargetReport,
};
pub use resolver::{NameResolver, SystemResolver};
pub use target::{Target, TargetError, TargetKind};
