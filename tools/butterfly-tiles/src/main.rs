use anyhow::{Context, Result};
use butterfly_tiles::memory::{country_fn, load_manifest, JsonTileProvider};
use butterfly_tiles::{GeoPoint, Router, RouterConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "butterfly-tiles")]
#[command(about = "Turn-by-turn routing across independently stored graph tiles", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find a route and print it as JSON
    Route {
        /// Directory holding manifest.json and <tile>.json files
        #[arg(long)]
        tiles: PathBuf,
        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,
        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,
        /// Travel direction at the start, degrees from North
        #[arg(long)]
        heading: Option<f64>,
        /// Router configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_coord(s: &str) -> Result<GeoPoint> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("Coordinate must be in format 'lat,lon'");
    }
    let lat = parts[0].trim().parse::<f64>()?;
    let lon = parts[1].trim().parse::<f64>()?;
    Ok(GeoPoint::new(lat, lon))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    match cli.command {
        Commands::Route {
            tiles,
            from,
            to,
            heading,
            config,
        } => {
            let config = match config {
                Some(path) => RouterConfig::from_file(&path)?,
                None => RouterConfig::default(),
            };
            let start = parse_coord(&from).context("invalid --from")?;
            let finish = parse_coord(&to).context("invalid --to")?;

            let manifest = load_manifest(&tiles)?;
            let provider = Arc::new(JsonTileProvider::new(&tiles, config.snap_radius_m));
            let router = Router::new(country_fn(manifest), provider, config);

            let cancel = AtomicBool::new(false);
            let route = router
                .calculate(start, heading, finish, &cancel)
                .map_err(|e| anyhow::anyhow!("{e} ({:?})", e.code()))?;

            println!("{}", serde_json::to_string_pretty(&route)?);
        }
    }

    Ok(())
}
