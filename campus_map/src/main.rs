use std::{net::SocketAddr, path::PathBuf};

use campus_map::{
    AppState, config::MapSettings, create_router, poi_store::PoiStore, routing::OsrmRouter,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAMPLE_POIS_PATH: &str = "campus_map/data/plants.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Campus map service: POIs, clusters and routes")]
struct Args {
    /// POI definitions (JSON)
    #[arg(long, default_value = SAMPLE_POIS_PATH)]
    pois: PathBuf,

    /// Settings file (JSON); falls back to $CAMPUS_MAP_CONFIG, then defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_map=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings = MapSettings::resolve(args.config.as_deref()).expect("load settings");
    let store = PoiStore::from_file(&args.pois).expect("load POI definitions");
    tracing::info!("loaded {} POIs from {}", store.len(), args.pois.display());

    let router = OsrmRouter::new(settings.osrm_url.clone(), settings.route_timeout())
        .expect("build routing client");
    tracing::info!("routing through {}", settings.osrm_url);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(AppState::new(store, router, settings)).layer(cors);

    tracing::info!("starting campus map service on http://{}", args.bind);
    tracing::info!("  GET  /api/pois, /api/pois/:id, /api/instances, /api/cards");
    tracing::info!("  GET  /api/clusters?lat&lon&zoom&width&height");
    tracing::info!("  POST /api/route");
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .expect("bind listener");
    axum::serve(listener, app).await.expect("serve");
}
