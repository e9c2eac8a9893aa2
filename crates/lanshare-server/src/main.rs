//! Lanshare server binary.
//!
//! # Usage
//!
//! ```bash
//! # Serve the embedded UI on all interfaces
//! lanshare-server --bind 0.0.0.0:8042
//!
//! # Serve a custom UI and advertise a fixed address
//! lanshare-server --static-dir ./web --advertise-ipv4 192.168.1.20
//! ```

use std::{
    net::{Ipv4Addr, Ipv6Addr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use lanshare_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// LAN text and file relay
#[derive(Parser, Debug)]
#[command(name = "lanshare-server")]
#[command(about = "Share text and files between devices on the local network")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8042")]
    bind: String,

    /// Serve static assets from this directory instead of the built-in UI
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Per-connection deadline for reading the request and writing the response
    #[arg(long, default_value = "600")]
    io_timeout_secs: u64,

    /// Maximum request head size in bytes
    #[arg(long, default_value = "1048576")]
    max_header_bytes: usize,

    /// Maximum text form body size in bytes
    #[arg(long, default_value = "10485760")]
    max_form_bytes: usize,

    /// IPv4 address to advertise instead of the discovered one
    #[arg(long)]
    advertise_ipv4: Option<Ipv4Addr>,

    /// IPv6 address to advertise instead of the discovered one
    #[arg(long)]
    advertise_ipv6: Option<Ipv6Addr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Lanshare server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        static_dir: args.static_dir,
        io_timeout: Duration::from_secs(args.io_timeout_secs),
        max_header_bytes: args.max_header_bytes,
        max_form_bytes: args.max_form_bytes,
        advertise_ipv4: args.advertise_ipv4,
        advertise_ipv6: args.advertise_ipv6,
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);
    print_banner(&server);

    server.run().await?;

    Ok(())
}

/// The manage key goes to stdout only, never to the log.
#[allow(clippy::print_stdout)]
fn print_banner(server: &Server) {
    println!("ManageKey: {}", server.capabilities().manage_token());
    println!("ManageUrl: {}", server.manage_url());
}
