mod http;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use nowplaying_proto::config::Config;
use nowplaying_proto::poll::TitlePoller;
use nowplaying_proto::stations::StationTable;
use nowplaying_proto::IcyFetcher;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Now-playing titles for internet radio streams")]
struct Args {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API (the default)
    Serve,
    /// Look up a station's current title once and print it
    Fetch { station: String },
    /// Print a station's title every time it changes, until Ctrl-C
    Watch {
        station: String,

        /// Seconds between lookups (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::Serve);

    // the one-shot commands own stdout; keep the console quiet for them
    let console_level = match command {
        Commands::Serve => LevelFilter::INFO,
        _ => LevelFilter::WARN,
    };
    let log_path = init_logging(console_level)?;
    info!("Log file: {:?}", log_path);

    let config = load_config(args.config.as_deref())?;
    let stations = StationTable::load(&config.stations)?;
    info!("{} stations available", stations.len());

    let fetcher = IcyFetcher::new(config.fetch.clone()).context("failed to build HTTP client")?;

    match command {
        Commands::Serve => serve(&config, fetcher, stations).await,
        Commands::Fetch { station } => fetch(&fetcher, &stations, &station).await,
        Commands::Watch { station, interval } => {
            let interval = interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.poll.interval());
            watch(fetcher, &stations, &station, interval).await
        }
    }
}

fn init_logging(console_level: LevelFilter) -> anyhow::Result<PathBuf> {
    let data_dir = nowplaying_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("nowplaying.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_level);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,nowplaying_daemon=debug,nowplaying_proto=debug",
                )
            }),
        )
        .init();

    Ok(log_path)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!(
        "Config loaded from: {:?}",
        path.map(Path::to_path_buf).unwrap_or_else(Config::config_path)
    );
    Ok(config)
}

fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_token.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });
    token
}

async fn serve(config: &Config, fetcher: IcyFetcher, stations: StationTable) -> anyhow::Result<()> {
    let state = http::HttpState::new(fetcher, stations);
    http::serve(&config.http.bind_address, config.http.port, state, ctrl_c_token()).await
}

async fn fetch(fetcher: &IcyFetcher, stations: &StationTable, id: &str) -> anyhow::Result<()> {
    let station = find_station(stations, id)?;
    let title = fetcher.fetch_title(&station.url).await;
    println!("{}", display_title(title.as_deref()));
    Ok(())
}

async fn watch(
    fetcher: IcyFetcher,
    stations: &StationTable,
    id: &str,
    interval: Duration,
) -> anyhow::Result<()> {
    let station = find_station(stations, id)?;
    info!("Watching {} every {:?}", station.id, interval);

    let poller = TitlePoller::spawn(fetcher, station.url.clone(), interval);
    let mut rx = poller.subscribe();
    let stop = ctrl_c_token();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // the first lookup is always announced, title or not
                let title = rx.borrow_and_update().clone();
                println!(
                    "{} {}: {}",
                    chrono::Local::now().format("%H:%M:%S"),
                    station.id,
                    display_title(title.as_deref())
                );
            }
        }
    }

    poller.cancel().await;
    Ok(())
}

/// `-` stands in for "no title".
fn display_title(title: Option<&str>) -> &str {
    title.unwrap_or("-")
}

fn find_station<'a>(
    stations: &'a StationTable,
    id: &str,
) -> anyhow::Result<&'a nowplaying_proto::stations::Station> {
    match stations.lookup(id) {
        Some(station) => Ok(station),
        None => {
            let known: Vec<String> = stations.infos().into_iter().map(|s| s.id).collect();
            bail!("unsupported station {:?} (known: {})", id, known.join(", "))
        }
    }
}
