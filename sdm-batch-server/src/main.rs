mod events;
mod session;
mod websocket;

use anyhow::Result;
use axum::{response::Html, routing::get, Router};
use clap::Parser;
use sdm_automation::utils::init_logging;
use sdm_automation::{AutomationConfig, ChromiumLauncher, SessionLauncher};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sdm-batch-server")]
#[command(about = "Web UI for working through a batch of service-desk tickets")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Assignee display name ("Last, First"); the UI can change it per session
    #[arg(long, env = "SDM_ASSIGNEE")]
    assignee: Option<String>,

    /// Enable CORS for all origins
    #[arg(long)]
    cors: bool,
}

pub struct AppState {
    pub launcher: Arc<dyn SessionLauncher>,
    pub config: AutomationConfig,
}

const INDEX_HTML: &str = include_str!("../assets/index.html");

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/ws", get(websocket::websocket_handler))
        .with_state(Arc::new(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    info!("🚀 Starting sdm-batch-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AutomationConfig::from_env().with_headless(false);
    if let Some(assignee) = args.assignee {
        config = config.with_assignee(assignee);
    }
    info!("🔧 Target application: {}", config.base_url);
    info!("🔧 Default assignee: {}", config.assignee);

    let state = AppState {
        launcher: Arc::new(ChromiumLauncher),
        config,
    };

    let mut app = router(state).layer(TraceLayer::new_for_http());
    if args.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Batch UI running at http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
