mod api;
mod types;

use anyhow::Result;
use clap::Parser;
use sdm_automation::utils::init_logging;
use sdm_automation::{AutomationConfig, ChromiumLauncher};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sdm-api-server")]
#[command(about = "Completes service-desk workflow tasks for one ticket per POST request")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Enable CORS for all origins
    #[arg(long)]
    cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = AutomationConfig::from_env().with_headless(true);
    info!("Target application: {}", config.base_url);
    info!("Assignee: {}", config.assignee);

    let state = api::AppState {
        launcher: Arc::new(ChromiumLauncher),
        config,
    };

    let mut app = api::router(state).layer(TraceLayer::new_for_http());
    if args.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("POST http://{}/api/run", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
