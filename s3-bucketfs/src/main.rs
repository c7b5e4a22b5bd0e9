use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bucketfs::{BucketFileSystem, ConnectionManager, DirConnector, FileSystemConfig, SharedMetrics};
use s3_bucketfs::commands;
use s3_bucketfs::metrics::{self, PrometheusMetrics};

#[derive(Parser, Debug)]
#[command(version, about = "Browse and edit an object-storage bucket like a filesystem")]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "s3://localhost/default",
        help = "Bucket URI, s3://[user[:password]@]host[:port]/bucket (ss3:// for TLS)"
    )]
    uri: String,

    #[arg(long, global = true, default_value = ".", help = "Directory holding the bucket data")]
    store_root: PathBuf,

    #[arg(long, global = true, help = "TOML file with filesystem settings")]
    config: Option<PathBuf>,

    #[arg(
        long = "property",
        short = 'D',
        global = true,
        value_name = "KEY=VALUE",
        help = "Filesystem setting, e.g. s3.filesystem.readonly=true (repeatable)"
    )]
    properties: Vec<String>,

    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,

    #[arg(long, global = true, help = "Print Prometheus metrics after the command")]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the bucket behind the URI
    Buckets,
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Show attributes of a file or directory
    Stat {
        path: String,
        #[arg(
            long,
            default_value = "basic:*",
            help = "Attribute query, e.g. basic:size,isDirectory"
        )]
        attributes: String,
    },
    /// Write a file to stdout
    Cat { path: String },
    /// Upload a local file
    Put { local: PathBuf, remote: String },
    /// Download a file
    Get { remote: String, local: PathBuf },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or directory
    Rm { path: String },
    /// Copy a file
    Cp {
        source: String,
        target: String,
        #[arg(long, help = "Keep content type and user metadata of the source")]
        copy_attributes: bool,
        #[arg(long, help = "Overwrite an existing target")]
        replace: bool,
    },
    /// Move a file
    Mv {
        source: String,
        target: String,
        #[arg(long, help = "Overwrite an existing target")]
        replace: bool,
    },
}

fn setup_tracing(log_level: &str) {
    // Try to use RUST_LOG env var first, fall back to CLI flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'warn'", log_level);
            EnvFilter::new("warn")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<FileSystemConfig> {
    let mut config = match &cli.config {
        Some(path) => FileSystemConfig::load_from_file(path).map_err(anyhow::Error::msg)?,
        None => FileSystemConfig::default(),
    };

    let mut entries = Vec::with_capacity(cli.properties.len());
    for property in &cli.properties {
        let (key, value) = property
            .split_once('=')
            .with_context(|| format!("property '{}' must look like KEY=VALUE", property))?;
        entries.push((key.trim(), value));
    }
    config.apply_env(entries)?;
    debug!(config = ?config, "loaded filesystem config");
    Ok(config)
}

fn run(fs: &BucketFileSystem, command: Command) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Buckets => commands::buckets(fs, &mut out)?,
        Command::Ls { path } => commands::list(fs, &path, &mut out)?,
        Command::Stat { path, attributes } => commands::stat(fs, &path, &attributes, &mut out)?,
        Command::Cat { path } => {
            commands::cat(fs, &path, &mut out)?;
        }
        Command::Put { local, remote } => {
            let bytes = commands::put(fs, &local, &remote)?;
            writeln!(out, "uploaded {} bytes to {}", bytes, fs.path([remote.as_str()]))?;
        }
        Command::Get { remote, local } => {
            let bytes = commands::get(fs, &remote, &local)?;
            writeln!(out, "downloaded {} bytes to {}", bytes, local.display())?;
        }
        Command::Mkdir { path } => commands::mkdir(fs, &path)?,
        Command::Rm { path } => commands::remove(fs, &path)?,
        Command::Cp {
            source,
            target,
            copy_attributes,
            replace,
        } => commands::copy(fs, &source, &target, copy_attributes, replace)?,
        Command::Mv {
            source,
            target,
            replace,
        } => commands::rename(fs, &source, &target, replace)?,
    }

    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    let config = load_config(&cli)?;
    let collector = SharedMetrics::new(Arc::new(PrometheusMetrics::new()?));
    let manager = ConnectionManager::with_metrics(
        Arc::new(DirConnector::new(cli.store_root.clone())),
        collector,
    );

    let fs = manager
        .open_with_config(&cli.uri, config)
        .with_context(|| format!("failed to open {}", cli.uri))?;
    info!(uri = fs.key(), root = %cli.store_root.display(), "filesystem ready");

    let result = run(&fs, cli.command);
    fs.close();
    result?;

    if cli.print_metrics {
        print!("{}", metrics::render()?);
    }

    Ok(())
}
