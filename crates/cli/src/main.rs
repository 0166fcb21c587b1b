use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use netblur_core::records::domain::record_store::RecordStore;
use netblur_core::server::service_builder::{
    build_server, build_server_with_radius, open_record_store,
};
use netblur_core::session::radius_source::{follow_radius_updates, SharedRadius};
use netblur_core::shared::constants::MAX_SUGGESTED_RADIUS;
use netblur_core::shared::server_config::ServerConfig;
use netblur_core::transport::client::send_image;

/// Networked box-blur service.
#[derive(Parser)]
#[command(name = "netblur")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept images over TCP and reply with blurred copies.
    Serve(ServeArgs),
    /// Send an image to a running server and save the reply.
    Send(SendArgs),
    /// List the most recent recorded jobs.
    Records(RecordsArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// JSON config file (defaults to the platform config dir if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:5000.
    #[arg(long)]
    bind: Option<String>,

    /// Box blur radius in pixels.
    #[arg(long)]
    radius: Option<u32>,

    /// SQLite file recording processed jobs.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Directory for raw received images.
    #[arg(long, conflicts_with = "no_artifacts")]
    artifacts_dir: Option<PathBuf>,

    /// Do not save received images.
    #[arg(long)]
    no_artifacts: bool,

    /// Blur worker threads (default: available parallelism).
    #[arg(long)]
    workers: Option<usize>,

    /// Largest accepted request frame in bytes.
    #[arg(long)]
    max_frame_bytes: Option<u64>,

    /// Sessions served at once.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Socket read/write timeout in seconds.
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Read new radius values from stdin, one per line, while serving.
    #[arg(long)]
    radius_from_stdin: bool,
}

#[derive(Args)]
struct SendArgs {
    /// Encoded image to send.
    input: PathBuf,

    /// Where to write the blurred reply.
    output: PathBuf,

    /// Server address.
    #[arg(long, default_value = "127.0.0.1:5000")]
    addr: String,

    /// Socket timeout in seconds (0 disables).
    #[arg(long, default_value = "60")]
    timeout: u64,
}

#[derive(Args)]
struct RecordsArgs {
    /// JSON config file naming the database.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite file to read (overrides the config).
    #[arg(long)]
    database: Option<PathBuf>,

    /// Number of records to show.
    #[arg(long, default_value = "20")]
    limit: usize,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Serve(args) => run_serve(args),
        Command::Send(args) => run_send(args),
        Command::Records(args) => run_records(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = ServerConfig::load_or_default(args.config.as_deref())?;
    let config = apply_overrides(base, &args);
    if config.radius > MAX_SUGGESTED_RADIUS {
        log::warn!(
            "Radius {} is above {MAX_SUGGESTED_RADIUS}; large images may take a while",
            config.radius
        );
    }

    let server = if args.radius_from_stdin {
        let radius = SharedRadius::new(i64::from(config.radius));
        let updates = radius.clone();
        thread::Builder::new()
            .name("radius-input".into())
            .spawn(move || follow_radius_updates(io::stdin().lock(), &updates))?;
        log::info!("Reading radius updates from stdin");
        build_server_with_radius(&config, Arc::new(radius))?
    } else {
        build_server(&config)?
    };
    log::info!("Blurring with radius {}", config.radius);
    server.serve()?;
    Ok(())
}

fn apply_overrides(mut config: ServerConfig, args: &ServeArgs) -> ServerConfig {
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    if let Some(radius) = args.radius {
        config.radius = radius;
    }
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    if args.no_artifacts {
        config.artifacts_dir = None;
    } else if let Some(dir) = &args.artifacts_dir {
        config.artifacts_dir = Some(dir.clone());
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if args.max_frame_bytes.is_some() {
        config.max_frame_bytes = args.max_frame_bytes;
    }
    if args.max_connections.is_some() {
        config.max_connections = args.max_connections;
    }
    if args.read_timeout.is_some() {
        config.read_timeout_secs = args.read_timeout;
    }
    config
}

fn run_send(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.exists() {
        return Err(format!("Input file not found: {}", args.input.display()).into());
    }
    let payload = fs::read(&args.input)?;
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));

    log::info!("Sending {} bytes to {}", payload.len(), args.addr);
    let reply = send_image(args.addr.as_str(), &payload, timeout)?;
    fs::write(&args.output, &reply)?;
    log::info!("Output written to {}", args.output.display());
    Ok(())
}

fn run_records(args: RecordsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::load_or_default(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let store = open_record_store(&config)?;
    let records = store.recent(args.limit)?;
    if records.is_empty() {
        println!("No records in {}", config.database_path.display());
        return Ok(());
    }

    println!("{:>6}  {:>6}  {:>8}  path", "id", "radius", "blur ms");
    for record in records {
        println!(
            "{:>6}  {:>6}  {:>8}  {}",
            record.id, record.radius, record.elapsed_ms, record.path
        );
    }
    Ok(())
}
