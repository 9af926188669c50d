use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use terroir::config::{ConfigLoadError, ResolverConfig, MAPSCO_KEY_ENV};
use terroir::location::{ConfigError, Coordinates, FixedPosition, LocationError};
use terroir::server;
use terroir::session::{ResolutionSession, SessionSnapshot};
use thiserror::Error;
use tokio::sync::broadcast;

/// Terroir: soil profile lookup for any place on Earth.
///
/// Resolves a place name, your approximate position, or raw coordinates,
/// then derives a soil profile for it.
///
/// Examples:
///   terroir Pune
///   terroir --city "Des Moines" --country US
///   terroir --auto
///   terroir --lat 18.52 --lng 73.85
///   terroir --serve --port 3000
#[derive(Parser)]
#[command(name = "terroir", version, about, long_about = None)]
struct Cli {
    /// Place name (positional). Example: terroir Pune
    #[arg(index = 1)]
    city_positional: Option<String>,

    /// Place name (named). Example: --city "Nashik, Maharashtra"
    #[arg(long)]
    city: Option<String>,

    /// Country hint (ISO 3166-1 alpha-2, e.g. IN, US).
    #[arg(long)]
    country: Option<String>,

    /// Approximate the current position from the network address.
    #[arg(long, short = 'a')]
    auto: bool,

    /// Latitude (-90 to 90).
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude (-180 to 180).
    #[arg(long, allow_hyphen_values = true)]
    lng: Option<f64>,

    /// Offline mode: built-in place data only.
    #[arg(long)]
    offline: bool,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// geocode.maps.co API key; adds it to the search chain.
    #[arg(long, env = MAPSCO_KEY_ENV, hide_env_values = true)]
    mapsco_key: Option<String>,

    /// Run the HTTP API instead of a one-shot lookup.
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Resolver(#[from] ConfigError),
    #[error("{}", .0.user_message())]
    Location(#[from] LocationError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

enum Request {
    Text(String),
    Device,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ResolverConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => ResolverConfig::from_json_file(path)?,
        None => ResolverConfig::default(),
    };
    if cli.offline {
        config.offline = true;
    }
    if let Some(country) = &cli.country {
        config.region_bias = Some(country.parse()?);
    }
    if let Some(key) = cli.mapsco_key.as_ref().filter(|k| !k.trim().is_empty()) {
        config.mapsco_api_key = Some(key.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;

    if cli.serve {
        server::start(config, &cli.host, cli.port).await?;
        return Ok(());
    }

    // Priority: --city > positional > --auto > --lat/--lng
    let mut resolver = config.build_resolver()?;
    let request = if let Some(city) = cli.city.as_ref().or(cli.city_positional.as_ref()) {
        Request::Text(city.clone())
    } else if cli.auto {
        if let Some(source) = config.ip_position() {
            resolver = resolver.with_coordinate_source(source);
        }
        Request::Device
    } else if let (Some(lat), Some(lng)) = (cli.lat, cli.lng) {
        let fix = Coordinates::new(lat, lng)?;
        resolver = resolver.with_coordinate_source(Arc::new(FixedPosition(fix)));
        Request::Device
    } else {
        print_usage();
        return Err(LocationError::EmptyInput.into());
    };

    let session = ResolutionSession::new(resolver);
    let progress = tokio::spawn(print_progress(session.subscribe()));

    let completion = match request {
        Request::Text(query) => session.search(&query).await?,
        Request::Device => session.locate().await,
    };
    // Closing the channel ends the progress task.
    drop(session);
    let _ = progress.await;

    let report = completion.into_report()?;

    eprintln!("  {}", report.location.display_line());
    eprintln!(
        "  \u{1F331} {} | pH {:.2} ({}) | organic matter {:.2}%",
        report.profile.soil_type, report.profile.ph, report.ph_class, report.profile.organic_matter
    );

    // JSON to stdout
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn print_progress(mut events: broadcast::Receiver<SessionSnapshot>) {
    loop {
        match events.recv().await {
            Ok(snapshot) => {
                if let Some(label) = snapshot.status.progress_label() {
                    eprintln!("  {}", label);
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_usage() {
    eprintln!("No location specified.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  terroir Pune");
    eprintln!("  terroir --city \"Des Moines\" --country US");
    eprintln!("  terroir --auto");
    eprintln!("  terroir --lat 18.52 --lng 73.85");
    eprintln!("  terroir --serve");
}
