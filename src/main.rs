// Cloud Connector - Main Entry Point
//
// Command line front end for the webhook dispatcher:
// - dispatch: deliver one webhook and print the response body
// - show-config: print the effective configuration

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use cloud_connector::config::Config;
use cloud_connector::webhooks::types::OAUTH2_AUTH_TYPE;
use cloud_connector::{logging, metrics, Auth, DispatchOptions, Dispatcher, TokenCache, Webhook};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cloud Connector: webhook dispatch with OAuth2 token caching
#[derive(Parser, Debug)]
#[command(name = "cloud-connector")]
#[command(author = "Cloud Connector Contributors")]
#[command(version)]
#[command(about = "Deliver webhooks with transparent OAuth2 token caching", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config.toml (defaults to the XDG config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deliver a single webhook and print the response body
    Dispatch(DispatchArgs),
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(ClapArgs, Debug)]
struct DispatchArgs {
    /// Target URL
    #[arg(long, required_unless_present = "webhook_file")]
    url: Option<String>,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "POST")]
    method: String,

    /// Header in "Name: value" form, repeatable
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Request body
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    payload_file: Option<PathBuf>,

    /// Load the whole webhook descriptor from a JSON file
    #[arg(long, conflicts_with_all = ["url", "payload", "payload_file", "auth_endpoint"])]
    webhook_file: Option<PathBuf>,

    /// Auth type tag for the token endpoint
    #[arg(long, default_value = OAUTH2_AUTH_TYPE)]
    auth_type: String,

    /// OAuth2 token endpoint; enables authentication
    #[arg(long)]
    auth_endpoint: Option<String>,

    /// Credential data for the token endpoint (username:password)
    #[arg(long, default_value = "")]
    auth_data: String,

    /// Proxy address, overrides http.proxy from config
    #[arg(long)]
    proxy: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    logging::init(&config.logging, args.verbose)?;

    match args.command {
        Some(Commands::Dispatch(dispatch_args)) => {
            run_dispatch(&config, dispatch_args).await?;
        }
        Some(Commands::ShowConfig) => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", text);
        }
        None => {
            info!("No command specified. Use \"cloud-connector --help\" for usage.");
        }
    }

    Ok(())
}

/// Deliver one webhook built from the command line
async fn run_dispatch(config: &Config, args: DispatchArgs) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let proxy = args.proxy.clone().unwrap_or_else(|| config.http.proxy.clone());
    let webhook = build_webhook(args)?;

    let dispatcher = Dispatcher::new(DispatchOptions::from_config(config), TokenCache::new())
        .context("Failed to create dispatcher")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling dispatch");
            ctrl_c.cancel();
        }
    });

    let result = dispatcher.dispatch(&webhook, &proxy, &cancel).await;

    if config.metrics.enabled {
        if let Err(e) = write_metrics(config) {
            error!("Failed to write metrics: {:#}", e);
        }
    }

    let body = result.context("Webhook dispatch failed")?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body).context("Failed to write response body")?;
    stdout.flush()?;

    Ok(())
}

fn build_webhook(args: DispatchArgs) -> Result<Webhook> {
    let mut webhook = match &args.webhook_file {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read webhook from {}", path.display()))?;
            serde_json::from_str::<Webhook>(&json)
                .with_context(|| format!("Failed to parse webhook JSON from {}", path.display()))?
        }
        None => {
            // clap requires --url unless --webhook-file is given
            let url = args.url.clone().unwrap_or_default();
            let payload = match (&args.payload, &args.payload_file) {
                (Some(text), _) => text.clone().into_bytes(),
                (None, Some(path)) => fs::read(path)
                    .with_context(|| format!("Failed to read payload from {}", path.display()))?,
                (None, None) => Vec::new(),
            };

            let mut webhook = Webhook::new(args.method.clone(), url).with_payload(payload);
            if let Some(endpoint) = &args.auth_endpoint {
                webhook = webhook.with_auth(Auth {
                    auth_type: args.auth_type.clone(),
                    endpoint: endpoint.clone(),
                    data: args.auth_data.clone(),
                });
            }
            webhook
        }
    };

    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        webhook = webhook.with_header(name, value);
    }

    Ok(webhook)
}

/// Split "Name: value" into its parts
fn parse_header(header: &str) -> Result<(String, String)> {
    let (name, value) = header
        .split_once(':')
        .with_context(|| format!("Header {:?} must be in \"Name: value\" form", header))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Header {:?} has an empty name", header);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn write_metrics(config: &Config) -> Result<()> {
    let Some(path) = &config.metrics.textfile else {
        return Ok(());
    };
    let text = metrics::gather_metrics()?;
    fs::write(path, text).with_context(|| format!("Failed to write metrics to {}", path))
}
