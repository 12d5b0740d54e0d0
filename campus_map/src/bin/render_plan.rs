use std::path::PathBuf;

use campus_map::{
    adapter::MapAdapter,
    config::MapSettings,
    models::Coordinate,
    poi_store::PoiStore,
    surface::HeadlessSurface,
    viewport::Viewport,
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print the marker/cluster render plan for a camera position"
)]
struct Args {
    /// POI definitions (JSON)
    #[arg(long, default_value = "campus_map/data/plants.json")]
    pois: PathBuf,

    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    lat: Option<f64>,
    #[arg(long)]
    lon: Option<f64>,
    #[arg(long)]
    zoom: Option<f64>,

    #[arg(long, default_value_t = 800.0)]
    width: f64,
    #[arg(long, default_value_t = 600.0)]
    height: f64,

    /// Emit JSON instead of a text summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = MapSettings::resolve(args.config.as_deref())?;
    let store = PoiStore::from_file(&args.pois)?;

    let center = Coordinate::new(
        args.lat.unwrap_or(settings.center.lat),
        args.lon.unwrap_or(settings.center.lon),
    );
    let zoom = args.zoom.unwrap_or(settings.zoom);
    let frame = settings.provider.frame();
    let viewport = Viewport::new(frame.to_basemap(center), zoom, args.width, args.height)
        .with_zoom_limits(settings.min_zoom, settings.max_zoom);

    let (mut map, _events) = MapAdapter::new(HeadlessSurface::new(settings.provider, viewport), &settings);
    map.begin_loading();
    map.mark_ready(&store);
    let plan = map.render_plan();

    if args.json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    println!(
        "zoom {:.2}: {} markers, {} groups",
        plan.zoom,
        map.registry().len(),
        plan.clusters.len()
    );
    for (index, cluster) in plan.clusters.iter().enumerate() {
        let members: Vec<String> = cluster.members.iter().map(ToString::to_string).collect();
        let kind = if cluster.is_aggregate() { "cluster" } else { "marker" };
        println!(
            "  #{index} {kind} @ {:.6},{:.6}: {}",
            cluster.center.lat,
            cluster.center.lon,
            members.join(", ")
        );
    }
    Ok(())
}
