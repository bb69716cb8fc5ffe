use std::path::PathBuf;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use street_trie::{LookupResult, LookupSession, LookupSessionConfig, ShardTransport, TransportError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Reads shard files directly from a local directory.
///
/// The shard manager already joins `shard_root` into the URL it passes to [`ShardTransport::fetch`],
/// so this transport has no state of its own: the `url` it receives is already the full path.
struct DirectoryShardTransport;

#[async_trait]
impl ShardTransport for DirectoryShardTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        // `url` here is the shard manager's `{root}/{base}.shard_{key}{suffix}` path, which
        // for this transport is already a filesystem path rooted at `shard_root`.
        tokio::fs::read(url).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::NotFound { url: url.to_string() },
            _ => TransportError::Other {
                url: url.to_string(),
                message: e.to_string(),
            },
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "street-trie-cli", author, version, about, long_about = None)]
struct Cli {
    /// Directory containing shard files, named `{shard_base}.shard_{key}{shard_suffix}`.
    #[arg(long, env)]
    shard_root: PathBuf,

    /// Shard file base name.
    #[arg(long, env, default_value = "street_trie")]
    shard_base: String,

    /// Shard file suffix.
    #[arg(long, env, default_value = ".packed.gz")]
    shard_suffix: String,

    /// Maximum number of results to return.
    #[arg(long, env, default_value_t = 80)]
    max_results: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Looks up a prefix query (optionally `street, city`) and prints the ranked results.
    Lookup {
        /// The query, e.g. `"Main St"` or `"Main, Springfield"`.
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let cli = Cli::parse();

    let shard_root = cli
        .shard_root
        .to_str()
        .ok_or_else(|| anyhow!("shard root path is not valid UTF-8"))?
        .to_string();

    let config = LookupSessionConfig {
        max_results: cli.max_results,
        shard_base: cli.shard_base,
        shard_suffix: cli.shard_suffix,
        shard_root,
        ..LookupSessionConfig::default()
    };

    let session = LookupSession::new(config, DirectoryShardTransport);

    match cli.command {
        Commands::Lookup { query } => {
            let result = session.lookup(&query).await;
            print_result(&result).context("failed to render lookup result as JSON")?;
            Ok(())
        }
    }
}

fn print_result(result: &LookupResult) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    println!("{json}");
    Ok(())
}
