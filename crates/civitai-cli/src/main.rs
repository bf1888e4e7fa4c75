//! civitai - command-line front end for the local Civitai model cache.

use anyhow::{Context, Result};
use civitai_cache::{CacheConfig, FileRequest, ModelCache, ModelRef, VersionRef};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "civitai")]
#[command(about = "Download and manage Civitai models in a local cache")]
struct Args {
    /// Only use files already in the cache
    #[arg(long, global = true)]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Cache root (defaults to $CIVITAI_HOME or ~/.cache/civitai)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Catalog request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a model file into the cache and print its local path
    Download {
        /// Model name or id
        model: String,
        /// Version name or id (latest when omitted)
        #[arg(short, long)]
        version: Option<String>,
        /// File name or glob (primary file when omitted)
        #[arg(short, long)]
        file: Option<String>,
        /// Restrict name matches to this creator
        #[arg(short, long)]
        creator: Option<String>,
    },
    /// Look a model file up in the catalog without downloading it
    Find {
        /// Model name, id, or file hash
        model: String,
        #[arg(short, long)]
        version: Option<String>,
        #[arg(short, long)]
        file: Option<String>,
        #[arg(short, long)]
        creator: Option<String>,
    },
    /// Show the cached models as a tree with the total size
    List,
    /// Remove a cached model, or a single version of it
    Delete {
        /// Model name or id
        model: String,
        /// Only remove this version
        #[arg(short, long)]
        version: Option<String>,
    },
}

fn build_request(
    model: String,
    version: Option<String>,
    file: Option<String>,
    creator: Option<String>,
) -> FileRequest {
    FileRequest {
        model: ModelRef::from(model),
        version: version.as_deref().map(VersionRef::parse),
        pattern: file,
        creator,
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = CacheConfig::from_env().context("Failed to load cache configuration")?;
    if let Some(root) = args.root {
        config.root_dir = root;
    }
    config = config.with_offline(args.offline);
    if let Some(secs) = args.timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    debug!("Using {:?}", config);

    let cache = ModelCache::new(config).context("Failed to open the model cache")?;

    match args.command {
        Command::Download {
            model,
            version,
            file,
            creator,
        } => {
            let request = build_request(model, version, file, creator);
            let path = cache.get_file(&request).await?;
            println!("{}", path.display());
        }
        Command::Find {
            model,
            version,
            file,
            creator,
        } => {
            let request = build_request(model, version, file, creator);
            let resource = cache.find_online(&request).await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
        }
        Command::List => {
            let dispatch = cache.dispatch();
            print!("{}", dispatch.tree().await?);
            println!("Total size: {}", format_size(dispatch.total_size().await?));
        }
        Command::Delete { model, version } => {
            let model = ModelRef::from(model);
            match version {
                Some(version) => {
                    cache
                        .dispatch()
                        .delete_version(&model, &VersionRef::parse(&version))
                        .await?;
                    println!("Deleted version {} of {}", version, model);
                }
                None => {
                    cache.dispatch().delete_model(&model).await?;
                    println!("Deleted {}", model);
                }
            }
        }
    }

    Ok(())
}
