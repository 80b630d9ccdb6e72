use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::time::Duration;

use eezonal::collect::global_variables::{
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, ENV_ACCESS_TOKEN, ENV_PROJECT,
};
use eezonal::{zonal_stats, ClientOptions, EarthEngineClient, PolygonInput};

/// Zonal statistics for an Earth Engine image or image collection
#[derive(Parser, Debug)]
#[command(name = "eezonal", version, about)]
#[command(group(ArgGroup::new("polygon").required(true).args(["geojson", "rings"])))]
struct Args {
    /// Asset id, e.g. MODIS/061/MCD12Q1 or projects/<project>/assets/<name>
    asset_id: String,

    /// First day of the range (YYYY-MM-DD, inclusive)
    #[arg(long)]
    start: String,

    /// Last day of the range (YYYY-MM-DD, exclusive)
    #[arg(long)]
    end: String,

    /// Band to reduce
    #[arg(long)]
    band: String,

    /// GeoJSON file with a Polygon or MultiPolygon ("-" reads stdin)
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// Polygon rings as JSON, e.g. '[[[-75.08,6.07],[-75.05,6.12],[-75.14,6.12]]]'
    #[arg(long)]
    rings: Option<String>,

    /// Tabulate hectares per category instead of min/max/mean
    #[arg(long, default_value_t = false)]
    categorical: bool,

    /// Cloud project used for compute requests
    #[arg(long, env = ENV_PROJECT)]
    project: String,

    /// OAuth2 access token
    #[arg(long, env = ENV_ACCESS_TOKEN, hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Retries on transient backend failures
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn read_polygon(args: &Args) -> Result<PolygonInput> {
    if let Some(rings) = &args.rings {
        let rings: Vec<Vec<[f64; 2]>> =
            serde_json::from_str(rings).context("--rings must be a JSON list of [lon, lat] rings")?;
        return Ok(PolygonInput::Rings(rings));
    }

    let path = args
        .geojson
        .as_ref()
        .context("either --geojson or --rings is required")?;
    let text = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read GeoJSON from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read GeoJSON file {}", path.display()))?
    };
    Ok(PolygonInput::GeoJson(text))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let polygon = read_polygon(&args)?;

    let mut options = ClientOptions::from_env();
    options.set_project(&args.project);
    if args.token.is_some() {
        options.set_access_token(args.token.clone());
    }
    options.set_timeout(Duration::from_secs(args.timeout));
    options.set_max_retries(args.retries);
    let client = EarthEngineClient::new(options).context("Failed to create Earth Engine client")?;

    let records = zonal_stats(
        &client,
        &args.asset_id,
        &args.start,
        &args.end,
        &args.band,
        &polygon,
        args.categorical,
    )
    .with_context(|| format!("Zonal statistics failed for {}", args.asset_id))?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&records)?
    } else {
        serde_json::to_string(&records)?
    };
    println!("{}", output);

    Ok(())
}
