use airbnb_mcp::tools::airbnb_registry;
use airbnb_mcp::{Dispatcher, McpServer};
use airbnb_mcp_core::config::{GatewayConfig, LogFormat, TransportMode};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod middleware;

const DEFAULT_LOG_FILTER: &str =
    "airbnb_mcp=info,airbnb_mcp_core=info,airbnb_mcp_server=info,airbnb_mcp_gateway=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "airbnb-mcp-gateway")]
#[command(about = "Airbnb search and listing tools over MCP (stdio or HTTP)", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "airbnb-mcp.toml")]
    config: PathBuf,

    /// Transport: "stdio" or "http" (overrides MCP_MODE)
    #[arg(short, long)]
    mode: Option<String>,

    /// Host to bind in HTTP mode
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on in HTTP mode
    #[arg(short, long)]
    port: Option<u16>,

    /// Skip robots.txt checks for every request
    #[arg(long)]
    ignore_robots_txt: bool,
}

impl Args {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(mode) = &self.mode {
            config.server.mode = TransportMode::from_env_value(mode);
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.ignore_robots_txt {
            config.airbnb.ignore_robots_txt = true;
        }
    }
}

/// Logs go to stderr; stdout carries protocol frames in stdio mode.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Startup failures are logged before the process exits non-zero.
fn log_startup_failure(stage: &str, err: &anyhow::Error) {
    tracing::error!(stage, error = %format!("{err:#}"), "Gateway failed to start");
}

fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::load(&args.config)?;
    args.apply(&mut config);
    Ok(config)
}

async fn run(config: GatewayConfig) -> Result<()> {
    let (registry, robots) = airbnb_registry(&config.airbnb)?;

    match config.server.mode {
        TransportMode::Http => api::serve(&config, registry, robots).await,
        TransportMode::Stdio => {
            let mut server = McpServer::new(Dispatcher::new(Arc::new(registry)), robots);
            server.start().await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(LogFormat::default());
            log_startup_failure("configuration", &err);
            return Err(err);
        }
    };

    init_tracing(config.logging.format);

    tracing::info!(
        mode = ?config.server.mode,
        version = env!("CARGO_PKG_VERSION"),
        "Starting Airbnb MCP gateway"
    );

    if let Err(err) = run(config).await {
        log_startup_failure("serve", &err);
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "airbnb-mcp-gateway",
            "--mode",
            "http",
            "--port",
            "8081",
            "--ignore-robots-txt",
        ]);
        let mut config = GatewayConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.mode, TransportMode::Http);
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.airbnb.ignore_robots_txt);
    }

    #[test]
    fn test_cli_defaults_leave_config_alone() {
        let args = Args::parse_from(["airbnb-mcp-gateway"]);
        let mut config = GatewayConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.mode, TransportMode::Stdio);
        assert_eq!(config.server.port, 3000);
        assert!(!config.airbnb.ignore_robots_txt);
    }

    #[test]
    fn test_bad_config_is_logged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = \"not a port\"").unwrap();
        let args = Args::parse_from([
            "airbnb-mcp-gateway",
            "--config",
            file.path().to_str().unwrap(),
        ]);

        let err = load_config(&args).unwrap_err();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || log_startup_failure("configuration", &err));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("ERROR"));
        assert!(output.contains("Gateway failed to start"));
        assert!(output.contains("configuration"));
    }
}
