use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use relaygate_net::load_or_generate_ca;
use relaygate_proxy::{ProxyConfig, ProxyServer, ProxyState};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relaygate", about = "Local intercepting HTTP/HTTPS proxy")]
struct Cli {
    /// Configuration file, written with defaults when missing.
    #[arg(long, default_value = "relaygate.toml")]
    config: PathBuf,

    /// Overrides `tls.ca_cert_dir`.
    #[arg(long = "ca-dir")]
    ca_dir: Option<PathBuf>,

    /// Overrides the listen address, e.g. `127.0.0.1:8087`.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let mut config = ProxyConfig::load_or_create(&cli.config).map_err(|err| err.to_string())?;
    if let Some(dir) = &cli.ca_dir {
        config.tls.ca_cert_dir = dir.to_string_lossy().into_owned();
    }
    let listen = cli.listen.clone().unwrap_or_else(|| config.listen_addr());

    let (ca, paths) = load_or_generate_ca(&config.tls.ca_cert_dir, &config.tls.ca_common_name)
        .map_err(|err| err.to_string())?;
    let state = ProxyState::from_config(&config, Arc::new(ca)).map_err(|err| err.to_string())?;

    tracing::info!(
        config = %cli.config.display(),
        ca = %paths.cert_path.display(),
        "root certificate ready; install it in the client trust store"
    );
    tracing::info!(
        force_secure = config.sites.force_secure.len(),
        intercept = config.sites.intercept.len(),
        strip = config.sites.strip.len(),
        relay_sites = config.relay.sites.len(),
        hosts = state.dialer.resolver().host_count(),
        aliases = state.dialer.resolver().cname_count(),
        "rules loaded"
    );
    tracing::info!(
        request = %state.pipeline.request_filter_names().join(" -> "),
        response = %state.pipeline.response_filter_names().join(" -> "),
        "filter chain"
    );
    if state.relay_pool.is_empty() {
        tracing::info!("no relay identities configured; relay sites are fetched directly");
    } else {
        let ids: Vec<&str> = state
            .relay_pool
            .identities()
            .iter()
            .map(|identity| identity.id.as_str())
            .collect();
        tracing::info!(
            scheme = state.relay_pool.scheme().as_str(),
            ids = %ids.join(","),
            "relay pool ready"
        );
    }

    let listener = TcpListener::bind(&listen)
        .await
        .map_err(|err| format!("bind {listen}: {err}"))?;
    let server = ProxyServer::new(state);

    tokio::select! {
        result = server.serve(listener) => result.map_err(|err| err.to_string()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
