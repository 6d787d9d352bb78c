//! chipgw Node - HTTP to CoAP device gateway
//!
//! This binary serves the gateway's HTTP frontend:
//! - `ANY /{targetAddress}/{path...}` forwarded to `coap://{targetAddress}{path}`
//! - `GET /health` liveness probe

use clap::Parser;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chipgw_coap::CoapConfigBuilder;
use chipgw_node::{create_router, AppState, GatewayConfig};

#[derive(Parser)]
#[command(name = "chipgw-node")]
#[command(about = "HTTP to CoAP gateway for embedded devices")]
struct Args {
    /// HTTP listen port (0 = auto-assign)
    #[arg(long, short, default_value_t = chipgw_node::DEFAULT_HTTP_PORT)]
    port: u16,

    /// HTTP bind address
    #[arg(long, short, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// CoAP port for targets that do not name one
    #[arg(long, default_value_t = chipgw_coap::COAP_DEFAULT_PORT)]
    coap_port: u16,

    /// Deadline for one device exchange, e.g. "30s"
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    exchange_timeout: Duration,

    /// Initial retransmission timeout for confirmable requests
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    ack_timeout: Duration,

    /// Retransmissions of a confirmable request before waiting out the deadline
    #[arg(long, default_value_t = chipgw_coap::DEFAULT_MAX_RETRANSMIT)]
    max_retransmit: u32,

    /// Largest reassembled response payload in bytes
    #[arg(long, default_value_t = chipgw_coap::DEFAULT_MAX_PAYLOAD_SIZE)]
    max_payload: usize,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            bind: self.bind,
            port: self.port,
            coap: CoapConfigBuilder::new()
                .default_port(self.coap_port)
                .exchange_timeout(self.exchange_timeout)
                .ack_timeout(self.ack_timeout)
                .max_retransmit(self.max_retransmit)
                .max_payload_size(self.max_payload)
                .build(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging, RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.gateway_config();
    info!(
        "CoAP: default port {}, exchange timeout {}, ack timeout {}",
        config.coap.default_port,
        humantime::format_duration(config.coap.exchange_timeout),
        humantime::format_duration(config.coap.ack_timeout)
    );

    let state = Arc::new(AppState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    let actual_addr = listener.local_addr()?;
    info!("Gateway listening on http://{}", actual_addr);

    let app = create_router(state);
    axum::serve(listener, app).await?;

    Ok(())
}
