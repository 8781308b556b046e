//! yougotmapped - geolocate IP addresses and domains and plot them on a map
//!
//! This binary can:
//! - Look up the location of IPs, domains, or your own public IP
//! - Ping and traceroute each target, mapping the last reachable hop
//! - Write the results to an interactive HTML map
//! - Store the ipinfo.io API token in the platform keyring

mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use yougotmapped_core::{
    auth, config, diagnostics, BatchError, BatchReport, IpInfoClient, LeafletRenderer,
    LocateOptions, LocateProgress, Orchestrator, SystemDiagnostics, SystemResolver, Target,
};

#[derive(Parser)]
#[command(name = "yougotmapped")]
#[command(version)]
#[command(about = "Geolocate IPs and domains and generate an interactive map")]
#[command(long_about = "
yougotmapped looks up where IP addresses and domains live, optionally pings
and traceroutes them, and plots everything on an interactive HTML map.

Quick start:
  1. Store your ipinfo.io token:  yougotmapped token set
  2. Locate a few targets:        yougotmapped locate 8.8.8.8 example.com
  3. Add latency and path info:   yougotmapped locate --diagnose example.com

With no targets, your own public IP is used.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Geolocate targets and render a map
    #[command(alias = "lookup")]
    Locate(LocateArgs),

    /// Manage the ipinfo.io API token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Check which diagnostic tools and credentials are available
    Check,

    /// Show configuration paths and settings
    Config,
}

#[derive(clap::Args)]
pub struct LocateArgs {
    /// IP addresses or domains (leave blank to use your public IP)
    pub targets: Vec<Target>,

    /// Read additional targets from a file, one per line
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Ping each target
    #[arg(long)]
    pub ping: bool,

    /// Traceroute each target and map the last reachable hop
    #[arg(long)]
    pub trace: bool,

    /// Shorthand for --ping --trace
    #[arg(short, long)]
    pub diagnose: bool,

    /// Do not generate a map
    #[arg(long)]
    pub no_map: bool,

    /// Delete the map after generating it
    #[arg(long, conflicts_with = "no_map")]
    pub delete_map: bool,

    /// Open the map in the default browser
    #[arg(long, conflicts_with_all = ["no_map", "delete_map"])]
    pub open: bool,

    /// Map output path (defaults to the configured path)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Number of targets processed at once
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: Option<u16>,
}

#[derive(Subcommand)]
pub enum TokenAction {
    /// Save a token to secure storage (reads stdin when --value is omitted)
    Set {
        #[arg(long)]
        value: Option<String>,
    },
    /// Remove the stored token
    #[command(alias = "delete")]
    Clear,
    /// Show where the token is loaded from
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("yougotmapped={},yougotmapped_core={}", log_level, log_level).into()
            }),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Locate(args) => cmd_locate(&cli, args).await,
        Commands::Token { action } => cmd_token(&cli, action),
        Commands::Check => cmd_check(&cli),
        Commands::Config => cmd_config(&cli),
    }
}

/// Targets from the command line followed by those from `--input`.
fn collect_targets(args: &LocateArgs) -> Result<Vec<Target>> {
    let mut targets = args.targets.clone();
    if let Some(path) = &args.input {
        targets.extend(read_target_file(path)?);
    }
    Ok(targets)
}

fn read_target_file(path: &Path) -> Result<Vec<Target>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets from {}", path.display()))?;
    Ok(parse_target_lines(&content))
}

/// One target per line; blank lines and `#` comments are skipped.
fn parse_target_lines(content: &str) -> Vec<Target> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| Target::new(line).ok())
        .collect()
}

async fn cmd_locate(cli: &Cli, args: &LocateArgs) -> Result<()> {
    let targets = collect_targets(args)?;
    let app_config = config::load_config();
    let token = auth::load_token()?.map(|(token, source)| {
        tracing::debug!("Using API token from {}", source);
        token
    });

    let options = LocateOptions {
        ping: args.ping || args.diagnose,
        traceroute: args.trace || args.diagnose,
        concurrency: args
            .concurrency
            .map(usize::from)
            .unwrap_or(app_config.concurrency),
    };

    let capabilities = diagnostics::detect_capabilities();
    if options.ping || options.traceroute {
        if let Some(warning) = &capabilities.warning {
            tracing::warn!("Limited diagnostics: {}", warning);
            if matches!(cli.format, OutputFormat::Text) {
                eprintln!("Warning: {}", warning);
            }
        }
    }

    let client = IpInfoClient::from_config(&app_config)?;
    let runner = SystemDiagnostics::with_capabilities(
        &capabilities,
        app_config.ping_timeout,
        app_config.traceroute_timeout,
        app_config.max_hops,
    );
    let mut orchestrator = Orchestrator::new(
        Box::new(SystemResolver::default()),
        Box::new(client.clone()),
        Box::new(runner),
        Box::new(client),
    );

    if matches!(cli.format, OutputFormat::Text) && targets.is_empty() {
        println!("Using your public IP...");
    }
    if shows_progress(cli) {
        orchestrator = orchestrator.with_progress(Box::new(|progress: LocateProgress| {
            eprintln!(
                "  [{}/{}] {}...",
                progress.index + 1,
                progress.total,
                progress.message
            );
        }));
    }

    // Interrupted batches are discarded whole; no partial map is written
    let batch = tokio::select! {
        result = orchestrator.run(targets, token.as_ref(), &options) => {
            result.map_err(batch_failed)?
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, discarding batch");
            eprintln!("Interrupted. No report or map was produced.");
            std::process::exit(130);
        }
    };

    let map_path = if args.no_map {
        None
    } else {
        let output = args.output.clone().unwrap_or(app_config.map_output);
        render_map(&batch, &output)?
    };

    let mut map_deleted = false;
    if let Some(path) = &map_path {
        if args.open {
            open_map(path);
        }
        if args.delete_map {
            map_deleted = delete_map(path);
        }
    }

    match cli.format {
        OutputFormat::Text => {
            report::print_text(&batch);
            println!();
            match &map_path {
                Some(path) if args.delete_map => {
                    if map_deleted {
                        println!("Deleted the map.");
                    } else {
                        println!("Map file not found: {}", path.display());
                    }
                }
                Some(path) => println!("Map saved as '{}'", path.display()),
                None if args.no_map => {}
                None => println!("No location data to plot; no map was generated."),
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "targets": batch.targets,
                    "points": batch.points,
                    "used_public_ip": batch.used_public_ip,
                    "generated_at": batch.generated_at,
                    "map": map_path,
                    "map_deleted": map_deleted,
                })
            );
        }
    }

    Ok(())
}

/// Progress lines go to stderr in verbose text mode only.
fn shows_progress(cli: &Cli) -> bool {
    cli.verbose && matches!(cli.format, OutputFormat::Text)
}

/// Batch-level failures end the run; log them once before they propagate.
fn batch_failed(err: BatchError) -> anyhow::Error {
    tracing::error!("Batch aborted: {}", err);
    anyhow::Error::new(err)
}

/// Render the batch's points. Returns `None` when there is nothing to map.
fn render_map(batch: &BatchReport, output: &Path) -> Result<Option<PathBuf>> {
    let title = if batch.points.primary_count() == 1 {
        "IP Geolocation Map".to_string()
    } else {
        format!("IP Geolocation Map ({} locations)", batch.points.primary_count())
    };

    let renderer = LeafletRenderer::new(output).with_title(title);
    batch.render(&renderer).context("Failed to write map")
}

fn delete_map(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to delete map {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(feature = "browser")]
fn open_map(path: &Path) {
    if let Err(e) = yougotmapped_core::map::open_in_browser(path) {
        tracing::warn!("Failed to open browser: {}. Open {} manually.", e, path.display());
    }
}

#[cfg(not(feature = "browser"))]
fn open_map(path: &Path) {
    eprintln!(
        "Opening the map needs the 'browser' feature. Open {} manually.",
        path.display()
    );
}

fn cmd_token(cli: &Cli, action: &TokenAction) -> Result<()> {
    match action {
        TokenAction::Set { value } => {
            let raw = match value {
                Some(v) => v.clone(),
                None => {
                    eprintln!("To use this tool, you need a free API token from ipinfo.io.");
                    eprintln!("Visit: https://ipinfo.io/signup");
                    eprint!("Enter your IPInfo token: ");
                    let mut line = String::new();
                    std::io::stdin()
                        .lock()
                        .read_line(&mut line)
                        .context("Failed to read token from stdin")?;
                    line
                }
            };

            let token = auth::ApiToken::new(&raw).context("No token provided")?;
            let source = auth::save_token(&token)?;

            match cli.format {
                OutputFormat::Text => {
                    println!("Token saved to {}.", source);
                    if std::env::var_os(auth::TOKEN_ENV_VAR).is_some() {
                        println!(
                            "Note: {} is set and takes precedence over the stored token.",
                            auth::TOKEN_ENV_VAR
                        );
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "status": "saved", "storage": source }));
                }
            }
        }
        TokenAction::Clear => {
            auth::delete_token()?;
            match cli.format {
                OutputFormat::Text => println!("Stored token removed."),
                OutputFormat::Json => println!("{}", serde_json::json!({ "status": "cleared" })),
            }
        }
        TokenAction::Status => {
            let loaded = auth::load_token()?;
            match cli.format {
                OutputFormat::Text => {
                    match &loaded {
                        Some((_, source)) => println!("Token: configured (from {})", source),
                        None => {
                            println!("Token: not configured");
                            println!();
                            println!(
                                "Run 'yougotmapped token set' or export {}.",
                                auth::TOKEN_ENV_VAR
                            );
                        }
                    }
                    println!("Storage: {}", auth::get_token_storage_info());
                }
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "configured": loaded.is_some(),
                            "source": loaded.map(|(_, source)| source),
                            "storage_info": auth::get_token_storage_info(),
                        })
                    );
                }
            }
        }
    }
    Ok(())
}

fn cmd_check(cli: &Cli) -> Result<()> {
    let caps = diagnostics::detect_capabilities();
    let token = auth::load_token()?;

    match cli.format {
        OutputFormat::Text => {
            println!("Checking dependencies:");
            for tool in [&caps.ping, &caps.traceroute] {
                match &tool.path {
                    Some(path) => println!("   [OK] {} found at {}", tool.program, path.display()),
                    None => println!("   [MISSING] {} not found", tool.program),
                }
            }
            match &token {
                Some((_, source)) => println!("   [OK] API token found ({})", source),
                None => println!("   [MISSING] API token (get one at https://ipinfo.io/signup)"),
            }
            if let Some(warning) = &caps.warning {
                println!();
                println!("Note: {}", warning);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "capabilities": caps,
                    "token_configured": token.is_some(),
                })
            );
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let app_config = config::load_config();
    let config_path = config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:        {}", config_path);
            println!("API endpoint:       {} (from {})", app_config.api_url, app_config.source);
            println!("HTTP timeout:       {}s", app_config.http_timeout.as_secs());
            println!("Map output:         {}", app_config.map_output.display());
            println!("Ping timeout:       {}s", app_config.ping_timeout.as_secs());
            println!("Traceroute timeout: {}s", app_config.traceroute_timeout.as_secs());
            println!("Max hops:           {}", app_config.max_hops);
            println!("Concurrency:        {}", app_config.concurrency);
            println!("Token storage:      {}", auth::get_token_storage_info());
            println!();
            println!("Environment variables:");
            println!("  {} - API token", auth::TOKEN_ENV_VAR);
            println!("  YOUGOTMAPPED_API_URL - Override API endpoint");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "config_file": config_path,
                    "api_url": app_config.api_url,
                    "api_source": format!("{}", app_config.source),
                    "http_timeout_secs": app_config.http_timeout.as_secs(),
                    "map_output": app_config.map_output,
                    "ping_timeout_secs": app_config.ping_timeout.as_secs(),
                    "traceroute_timeout_secs": app_config.traceroute_timeout.as_secs(),
                    "max_hops": app_config.max_hops,
                    "concurrency": app_config.concurrency,
                    "token_storage": auth::get_token_storage_info(),
                })
            );
        }
    }

    Ok(())
}
