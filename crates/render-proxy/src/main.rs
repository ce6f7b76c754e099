// Copyright 2026 Render Proxy Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::{error, info, warn};

use render_proxy::renderer::chromium::find_chromium;
use render_proxy::session::ChromiumLauncher;
use render_proxy::{rest, AssetMirror, ProxyConfig, RenderProxy, SessionManager};

#[derive(Parser)]
#[command(
    name = "render-proxy",
    about = "Render pages in headless Chromium and serve them embeddable",
    version
)]
struct Cli {
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP proxy (default)
    Serve(ServeArgs),
    /// Check that a browser and the asset cache are usable
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

#[derive(clap::Args, Default)]
struct ServeArgs {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Interface to bind (overrides RENDER_PROXY_HOST)
    #[arg(long)]
    host: Option<String>,
    /// Directory for mirrored assets (overrides RENDER_PROXY_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Chromium binary (overrides RENDER_PROXY_CHROMIUM_PATH)
    #[arg(long)]
    chromium_path: Option<PathBuf>,
    /// Navigation timeout in milliseconds
    #[arg(long)]
    navigation_timeout_ms: Option<u64>,
    /// Readiness selector timeout in milliseconds
    #[arg(long)]
    readiness_timeout_ms: Option<u64>,
    /// Per-asset download timeout in milliseconds
    #[arg(long)]
    asset_timeout_ms: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(path) = self.chromium_path {
            config.chromium_path = Some(path);
        }
        if let Some(ms) = self.navigation_timeout_ms {
            config.navigation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.readiness_timeout_ms {
            config.readiness_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.asset_timeout_ms {
            config.asset_timeout = Duration::from_millis(ms);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => serve(args).await,
        Commands::Doctor => doctor().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "render-proxy", &mut std::io::stdout());
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = ProxyConfig::from_env();
    args.apply(&mut config);

    let mirror = AssetMirror::from_config(&config);
    mirror.prepare().await?;
    info!("mirroring assets into {}", mirror.cache_dir().display());

    let launcher = Arc::new(ChromiumLauncher::new(config.chromium_path.clone()));
    let sessions = Arc::new(SessionManager::new(launcher));
    let proxy = Arc::new(RenderProxy::new(Arc::clone(&sessions), mirror, &config));

    let result = rest::start(&config.bind_addr(), proxy, shutdown_signal()).await;

    if let Err(e) = sessions.release().await {
        warn!("failed to shut down rendering engine: {e:#}");
    }
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => error!("failed to listen for ctrl-c: {e}"),
    }
}

async fn doctor() -> Result<()> {
    let config = ProxyConfig::from_env();

    println!("Render Proxy Doctor");
    println!("===================");
    println!();

    let chromium = find_chromium(config.chromium_path.as_deref());
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set RENDER_PROXY_CHROMIUM_PATH."
        ),
    }

    let mirror = AssetMirror::from_config(&config);
    let cache_ok = match mirror.prepare().await {
        Ok(()) => {
            println!("[OK] Asset cache: {}", mirror.cache_dir().display());
            true
        }
        Err(e) => {
            println!(
                "[!!] Asset cache {} is not writable: {e}",
                mirror.cache_dir().display()
            );
            false
        }
    };

    println!("[OK] Listen address: {}", config.bind_addr());
    println!();
    if chromium.is_some() && cache_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
