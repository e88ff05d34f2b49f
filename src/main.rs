use std::sync::Arc;

use regdesk::config::BotConfig;
use regdesk::delivery::{DeliveryAdapter, Transport, WhatsAppTransport};
use regdesk::flow::{FlowEngine, default_flow};
use regdesk::gateway::{HttpServicesApi, SubmissionGateway};
use regdesk::server::{self, AppState};
use regdesk::session::{InMemorySessionStore, LibSqlSessionStore, SessionLocks, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  required: WHATSAPP_TOKEN, WHATSAPP_PHONE_NUMBER_ID,");
        eprintln!("            WEBHOOK_VERIFY_TOKEN, SERVICES_API_BASE");
        std::process::exit(1);
    });

    // The flow is validated here; a broken definition aborts startup.
    let flow = Arc::new(default_flow()?);
    let engine = FlowEngine::new(Arc::clone(&flow));

    let store: Arc<dyn SessionStore> = match &config.db_path {
        Some(path) => Arc::new(
            LibSqlSessionStore::open(path, flow.root().clone(), config.session_ttl)
                .await
                .unwrap_or_else(|e| {
                    eprintln!("Error: Failed to open session database at {}: {e}", path.display());
                    std::process::exit(1);
                }),
        ),
        None => Arc::new(InMemorySessionStore::new(
            flow.root().clone(),
            config.session_ttl,
        )),
    };

    let transport: Arc<dyn Transport> = Arc::new(WhatsAppTransport::new(
        config.whatsapp_token.clone(),
        config.phone_number_id.clone(),
        config.graph_api_base.clone(),
    ));
    let delivery = Arc::new(DeliveryAdapter::new(
        Arc::clone(&transport),
        config.delivery_timeout,
    ));
    let gateway = Arc::new(SubmissionGateway::new(
        Arc::new(HttpServicesApi::new(config.services_api_base.clone())),
        config.submit_timeout,
        config.submit_retries,
    ));

    eprintln!("📋 RegDesk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook:  http://0.0.0.0:{}/webhook", config.http_port);
    eprintln!("   Sessions: http://0.0.0.0:{}/api/sessions", config.http_port);
    eprintln!("   Services: {}", config.services_api_base);
    match &config.db_path {
        Some(path) => eprintln!("   Database: {}", path.display()),
        None => eprintln!("   Database: in-memory"),
    }

    server::spawn_expiry_sweep(
        Arc::clone(&store),
        config.sweep_interval,
        config.session_ttl,
    );

    let state = AppState {
        engine,
        store,
        locks: Arc::new(SessionLocks::new()),
        delivery,
        gateway,
        transport,
        admin_chat_id: config.admin_chat_id.clone(),
        verify_token: config.verify_token.clone(),
    };

    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
