use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use ledger_gateway::{
    app,
    config::{Config, LogFormat},
    ledger::{HttpLedgerClient, InMemoryLedger, LedgerApi},
    AppState,
};

#[derive(Parser, Debug)]
#[command(name = "ledger-gateway", about = "HTTP gateway for the simulated payment apps")]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Ledger API base URL (overrides LEDGER_API_URL)
    #[arg(long)]
    ledger_url: Option<String>,

    /// Serve from a seeded in-process ledger instead of the remote one
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(url) = args.ledger_url {
        config.ledger_api_url = url.trim_end_matches('/').to_string();
    }

    init_tracing(config.log_format);
    info!("Starting ledger gateway...");

    let ledger: Arc<dyn LedgerApi> = if args.in_memory {
        let ledger = InMemoryLedger::new();
        ledger.seed_demo().await;
        info!("Using in-memory ledger with demo data");
        Arc::new(ledger)
    } else {
        let client = HttpLedgerClient::new(&config.ledger_api_url, config.ledger_timeout)?;
        info!("Using ledger API at {}", client.base_url());
        Arc::new(client)
    };

    let addr = config.bind_addr();
    let app = app(AppState::new(ledger, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Graceful shutdown
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down gracefully...");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_gateway=debug,tower_http=debug".into());
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_nothing_by_default() {
        let args = Args::try_parse_from(["ledger-gateway"]).unwrap();
        assert_eq!(args.port, None);
        assert_eq!(args.ledger_url, None);
        assert!(!args.in_memory);
    }

    #[test]
    fn parses_overrides() {
        let args = Args::try_parse_from([
            "ledger-gateway",
            "--port",
            "9000",
            "--ledger-url",
            "http://ledger:8000/api/",
            "--in-memory",
        ])
        .unwrap();
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.ledger_url.as_deref(), Some("http://ledger:8000/api/"));
        assert!(args.in_memory);
        assert!(Args::try_parse_from(["ledger-gateway", "--port", "http"]).is_err());
    }
}
