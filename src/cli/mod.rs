//! Command-line interface.

mod cache;
mod fetch;
mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gyschat::config::Config;

#[derive(Parser, Debug)]
#[command(name = "gyschat", version, about = "GYS Chat client: cache, resolvers and streaming chat")]
pub struct Cli {
    /// Config file (defaults to ~/.gyschat/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect or edit cache namespaces
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run the housekeeping sweep until Ctrl-C
    Housekeep,
    /// Fetch a document chunk (cached)
    Chunk {
        /// Chunk id
        id: String,
    },
    /// Resolve an image source (cached)
    Image {
        /// Raw image reference or URL
        src: String,
    },
    /// Show suggested questions (cached)
    Suggestions,
    /// List references in a message and render placeholders
    Refs {
        /// Message text
        text: String,
        /// Skip resolving document titles
        #[arg(long)]
        offline: bool,
    },
    /// Validate an access token and store the session
    Signin {
        /// Access token issued by the GYS portal
        #[arg(long)]
        token: String,
    },
    /// Forget the stored session
    Signout,
    /// Send a message and stream the reply
    Chat {
        /// Message to send
        message: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Print a cached value
    Get {
        /// Namespace (chunks, images, suggestions)
        namespace: String,
        key: String,
    },
    /// Store a JSON value
    Set {
        namespace: String,
        key: String,
        /// JSON value
        value: String,
        /// Lifetime in seconds (defaults to the namespace TTL)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// List keys in a namespace
    List { namespace: String },
    /// Remove every entry in a namespace
    Clear { namespace: String },
    /// Remove expired entries in all namespaces now
    Sweep,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().with_context(|| "Failed to load config"),
    }
}

/// Dispatch a parsed command line.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Cache { action } => cache::cmd_cache(&config, action),
        Commands::Housekeep => cache::cmd_housekeep(&config).await,
        Commands::Chunk { id } => fetch::cmd_chunk(&config, &id).await,
        Commands::Image { src } => fetch::cmd_image(&config, &src).await,
        Commands::Suggestions => fetch::cmd_suggestions(&config).await,
        Commands::Refs { text, offline } => fetch::cmd_refs(&config, &text, offline).await,
        Commands::Signin { token } => session::cmd_signin(&config, &token).await,
        Commands::Signout => session::cmd_signout(),
        Commands::Chat { message } => session::cmd_chat(&config, &message).await,
    }
}
