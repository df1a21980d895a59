//! billing-sync server
//!
//! Stripe webhook receiver backed by Supabase.

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_sync::config::AppConfig;

/// Stripe webhook reconciliation server
#[derive(Parser, Debug)]
#[command(name = "billing-sync")]
#[command(version)]
#[command(about = "Reconciles Stripe webhook events into subscription records")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// IP address to bind to (IPv4 or IPv6)
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    billing_sync::metrics::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let addr = listen_addr(&args.host, args.port)?;

    tracing::info!(
        version = billing_sync::VERSION,
        "billing-sync starting on {}",
        addr
    );

    billing_sync::server::serve(&config, addr).await?;
    Ok(())
}

/// Bind address from a bare IPv4 or IPv6 host and a port
fn listen_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .with_context(|| format!("invalid listen host {host}"))?;
    Ok(SocketAddr::new(ip, port))
}
