//! mltrack analysis server - entry point.
//!
//! Thin HTTP surface over the pure recommendation engine: one endpoint for
//! recommendation passes and a liveness probe.

use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mltrack_insight::{SuggestRequest, SuggestResponse, respond};

#[derive(Debug, Parser)]
#[command(name = "mltrack-server", about = "Recommendation service for mltrack metric series")]
struct Args {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "127.0.0.1:8181")]
    addr: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mltrack_server=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let app = router();

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %args.addr, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(addr = %args.addr, "analysis server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

fn router() -> Router {
    Router::new()
        .route("/recommendations", post(recommendations))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
}

async fn recommendations(Json(request): Json<SuggestRequest>) -> Json<SuggestResponse> {
    info!(
        experiment_id = %request.experiment_id,
        runs = request.runs.len(),
        "computing recommendations"
    );
    Json(respond(&request))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}
