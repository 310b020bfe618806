//! omnivfs command-line client.
//!
//! Usage:
//!   omnivfs ls ram:///
//!   omnivfs put file:///tmp/hello.txt "hello"
//!   omnivfs --config vfs.toml cat vfs:/scratch/hello.txt
//!   omnivfs watch file:///tmp/inbox --recursive --delay-ms 250
//!
//! Logs go to stderr; set `RUST_LOG=omnivfs_core=debug` for cache and
//! junction tracing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use omnivfs_core::{
    AllFileSelector, CachePolicy, CacheStrategy, ChannelListener, FileMonitor, FileObject,
    FileSystemManager, FileType, VfsConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "omnivfs")]
#[command(about = "Browse and watch omnivfs file systems")]
struct Args {
    /// TOML config with cache settings and [[mount]] junctions
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the children of a folder
    Ls { uri: String },
    /// Print the content of a file
    Cat { uri: String },
    /// Show type, size, timestamp and capabilities as JSON
    Stat { uri: String },
    /// Replace the content of a file, creating it if needed
    Put { uri: String, text: String },
    /// Create a folder and any missing ancestors
    Mkdir { uri: String },
    /// Delete a file or a whole folder tree
    Rm { uri: String },
    /// Print change events until interrupted
    Watch {
        uri: String,
        /// Also watch everything below the folder
        #[arg(short, long)]
        recursive: bool,
        /// Poll interval (defaults to the config's monitor delay)
        #[arg(long)]
        delay_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => VfsConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => VfsConfig::default(),
    };
    let manager = FileSystemManager::from_config(&config).await?;

    let result = run(&manager, &config, args.command).await;
    manager.close();
    result
}

async fn run(manager: &FileSystemManager, config: &VfsConfig, command: Command) -> Result<()> {
    match command {
        Command::Ls { uri } => {
            let folder = manager.resolve_file(&uri).await?;
            for child in folder.children().await? {
                let suffix = if child.is_folder().await? { "/" } else { "" };
                println!("{}{suffix}", child.name().base_name());
            }
        }
        Command::Cat { uri } => {
            let file = manager.resolve_file(&uri).await?;
            let data = file.content().await?.read_to_end().await?;
            print!("{}", String::from_utf8_lossy(&data));
        }
        Command::Stat { uri } => {
            let file = manager.resolve_file(&uri).await?;
            println!("{}", serde_json::to_string_pretty(&stat(&file).await?)?);
        }
        Command::Put { uri, text } => {
            let file = manager.resolve_file(&uri).await?;
            file.content().await?.write_all(text.as_bytes()).await?;
        }
        Command::Mkdir { uri } => {
            manager.resolve_file(&uri).await?.create_folder().await?;
        }
        Command::Rm { uri } => {
            let file = manager.resolve_file(&uri).await?;
            if !file.exists().await? {
                bail!("{uri}: no such file");
            }
            let deleted = file.delete_all(&AllFileSelector).await?;
            tracing::info!(uri = %uri, deleted, "removed");
        }
        Command::Watch {
            uri,
            recursive,
            delay_ms,
        } => {
            let mut monitor_config = config.monitor.clone();
            monitor_config.recursive |= recursive;
            if let Some(delay_ms) = delay_ms {
                monitor_config.delay_ms = delay_ms;
            }
            watch(manager, &uri, monitor_config).await?;
        }
    }
    Ok(())
}

async fn stat(file: &Arc<FileObject>) -> Result<serde_json::Value> {
    let file_type = file.get_type().await?;
    let mut info = serde_json::json!({
        "uri": file.name().friendly_uri(),
        "type": file_type.to_string(),
        "capabilities": file
            .file_system()
            .capabilities()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>(),
    });
    if file_type == FileType::Imaginary {
        return Ok(info);
    }

    let content = file.content().await?;
    if file_type == FileType::File {
        info["size"] = content.size().await?.into();
    }
    // Not every backend keeps timestamps.
    if let Ok(modified) = content.last_modified().await {
        let secs = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        info["modified"] = secs.into();
    }
    if let Ok(attributes) = content.attributes().await {
        if !attributes.is_empty() {
            info["attributes"] = serde_json::to_value(attributes)?;
        }
    }
    Ok(info)
}

async fn watch(
    manager: &FileSystemManager,
    uri: &str,
    config: omnivfs_core::MonitorConfig,
) -> Result<()> {
    let file = manager.resolve_file(uri).await?;
    let (listener, mut events) = ChannelListener::new();
    let monitor = FileMonitor::with_config(Arc::new(listener), config);
    monitor.add_file(file).await?;
    monitor.start();
    tracing::info!(uri = %uri, watched = monitor.watched().len(), "watching, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => println!("{}\t{}", event.kind, event.name.friendly_uri()),
                None => break,
            },
        }
    }

    monitor.stop().await;
    Ok(())
}
