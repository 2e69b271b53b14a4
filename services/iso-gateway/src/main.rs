// ISO 20022 Gateway Service
// Translates ISO 20022 messages into payment switch API calls and back

use anyhow::Context;
use message_bus::{CorrelationRegistry, InMemoryBus, MessageBus, NatsBus, NatsConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use iso_gateway::config::{BusKind, Config};
use iso_gateway::coordinator::TransferFlowCoordinator;
use iso_gateway::handlers::{self, AppState};
use iso_gateway::switch_client::HttpSwitchClient;
use iso_gateway::validation::StructuralValidator;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_bus(config: &Config) -> anyhow::Result<Arc<dyn MessageBus>> {
    match config.bus.kind {
        BusKind::Memory => Ok(Arc::new(InMemoryBus::new())),
        BusKind::Nats => {
            let nats = NatsConfig {
                url: config.bus.nats_url.clone().unwrap_or_default(),
                ..NatsConfig::default()
            };
            let bus = NatsBus::connect(&nats)
                .await
                .context("Failed to connect to NATS")?;
            Ok(Arc::new(bus))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    init_tracing(config.logging.json);

    info!("🚀 Starting ISO 20022 Gateway");

    let bus = connect_bus(&config).await?;
    info!(bus = bus.name(), "Message bus ready");

    let switch = HttpSwitchClient::new(&config.switch.base_url, config.switch_timeout())?;
    info!(base_url = switch.base_url(), "Switch client ready");

    let coordinator = TransferFlowCoordinator::new(
        Arc::new(switch),
        CorrelationRegistry::new(bus),
        Arc::new(StructuralValidator::new()),
        config.correlation_timeout(),
    );
    let app = handlers::router(AppState {
        coordinator: Arc::new(coordinator),
    });

    let bind_addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("✅ Gateway listening on: {}", bind_addr);
    info!("   POST /iso20022            - Any supported ISO 20022 document");
    info!("   POST /iso20022/pacs.008   - FI to FI Customer Credit Transfer");
    info!("   POST /iso20022/pacs.002   - Payment Status Report");
    info!("   POST /iso20022/camt.003   - Account inquiry");
    info!("   POST /transfers           - Switch-initiated transfer");
    info!("   GET  /health              - Health check");
    info!("   GET  /metrics             - Prometheus metrics");

    axum::serve(listener, app).await?;

    Ok(())
}
