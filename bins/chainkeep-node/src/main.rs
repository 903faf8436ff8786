//! chainkeep-node: operator CLI for a chainkeep block store.
//!
//! Opens a store directory, loads blocks from a file (trusted import or full
//! replay through the organizer), answers chain queries as JSON, and watches
//! reorganization events.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use chainkeep_core::address::PaymentAddress;
use chainkeep_core::codec;
use chainkeep_core::error::StoreError;
use chainkeep_core::types::{Block, BlockHeader, Hash256, OutPoint, OutputScript, Transaction};
use chainkeep_store::{
    BlockLocator, BlockchainStore, ReorgEvent, StoreConfig, StoreStatus,
};

/// chainkeep block store CLI.
#[derive(Parser, Debug)]
#[command(name = "chainkeep-node", version, about = "Indexed block store with chain reorganization")]
struct Cli {
    /// Data directory holding the tables and lock file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (TOML or JSON); CHAINKEEP_* environment variables also apply
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write blocks from a file straight after the current tip (trusted input).
    Import { file: PathBuf },
    /// Feed blocks from a file through normal storage and organization.
    Replay { file: PathBuf },
    /// Show the tip depth and hash.
    Tip,
    /// Show a block header by depth or hash.
    Header { at: String },
    /// Show a full block by depth or hash.
    Block { at: String },
    /// Show a transaction and where it was confirmed.
    Tx { hash: Hash256 },
    /// Show the input spending an output, given as <hash>:<index>.
    Spend { outpoint: String },
    /// List outputs paid to a pay-to-pubkey-hash address.
    Outputs { address: String },
    /// Print reorganization events until Ctrl+C.
    Watch,
}

#[derive(Serialize)]
struct HeaderView {
    hash: String,
    version: u32,
    prev_hash: String,
    merkle_root: String,
    timestamp: u32,
    bits: u32,
    nonce: u32,
}

impl From<&BlockHeader> for HeaderView {
    fn from(header: &BlockHeader) -> Self {
        Self {
            hash: header.hash().to_string(),
            version: header.version,
            prev_hash: header.prev_hash.to_string(),
            merkle_root: header.merkle_root.to_string(),
            timestamp: header.timestamp,
            bits: header.bits,
            nonce: header.nonce,
        }
    }
}

#[derive(Serialize)]
struct InputView {
    previous_output: String,
    script: String,
    sequence: u32,
}

#[derive(Serialize)]
struct OutputView {
    value: u64,
    script: String,
}

#[derive(Serialize)]
struct TxView {
    hash: String,
    version: u32,
    inputs: Vec<InputView>,
    outputs: Vec<OutputView>,
    lock_time: u32,
}

impl TxView {
    fn new(tx: &Transaction) -> Result<Self> {
        Ok(Self {
            hash: tx.hash()?.to_string(),
            version: tx.version,
            inputs: tx
                .inputs
                .iter()
                .map(|input| InputView {
                    previous_output: input.previous_output.to_string(),
                    script: hex::encode(&input.script),
                    sequence: input.sequence,
                })
                .collect(),
            outputs: tx
                .outputs
                .iter()
                .map(|output| OutputView {
                    value: output.value,
                    script: script_text(&output.script),
                })
                .collect(),
            lock_time: tx.lock_time,
        })
    }
}

fn script_text(script: &OutputScript) -> String {
    match script {
        OutputScript::PubkeyHash(_) | OutputScript::ScriptHash(_) => {
            PaymentAddress::from_script(script).map_or_else(String::new, |a| a.to_string())
        }
        OutputScript::Raw(bytes) => format!("raw:{}", hex::encode(bytes)),
    }
}

#[derive(Serialize)]
struct EventView {
    fork_depth: u64,
    removed: Vec<String>,
    added: Vec<String>,
}

impl From<&ReorgEvent> for EventView {
    fn from(event: &ReorgEvent) -> Self {
        let hashes = |blocks: &[Block]| -> Vec<String> {
            blocks.iter().map(|b| b.hash().to_string()).collect()
        };
        Self {
            fork_depth: event.fork_depth,
            removed: hashes(&event.removed),
            added: hashes(&event.added),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A 64-character hex string is a hash; anything else must be a depth.
fn parse_locator(s: &str) -> Result<BlockLocator> {
    if s.len() == 2 * Hash256::LEN {
        let hash: Hash256 = s.parse().with_context(|| format!("invalid block hash {s:?}"))?;
        return Ok(BlockLocator::Hash(hash));
    }
    let depth: u64 = s
        .parse()
        .with_context(|| format!("expected a depth or 64-character hash, got {s:?}"))?;
    Ok(BlockLocator::Depth(depth))
}

/// Decode a file of back-to-back bincode-encoded blocks.
fn read_blocks(path: &Path) -> Result<Vec<Block>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (block, used): (Block, usize) = codec::decode_prefix(&bytes[offset..])
            .with_context(|| format!("block {} at byte {offset}", blocks.len()))?;
        offset += used;
        blocks.push(block);
    }
    Ok(blocks)
}

/// Depth the next imported block goes to.
async fn next_depth(store: &BlockchainStore) -> Result<u64> {
    match store.fetch_last_depth().await {
        Ok(depth) => Ok(depth + 1),
        Err(StoreError::NotFound) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

async fn import(store: &BlockchainStore, file: &Path) -> Result<()> {
    let blocks = read_blocks(file)?;
    let start = next_depth(store).await?;
    let count = blocks.len() as u64;
    for (offset, block) in blocks.into_iter().enumerate() {
        let depth = start + offset as u64;
        store
            .import(block, depth)
            .await
            .with_context(|| format!("importing block at depth {depth}"))?;
    }
    info!(count, first_depth = start, "import complete");
    print_json(&serde_json::json!({ "imported": count, "first_depth": start }))
}

async fn replay(store: &BlockchainStore, file: &Path) -> Result<()> {
    let blocks = read_blocks(file)?;
    let (mut accepted, mut orphan, mut duplicate) = (0u64, 0u64, 0u64);
    for block in blocks {
        match store.store(block).await?.status {
            StoreStatus::Accepted => accepted += 1,
            StoreStatus::Orphan => orphan += 1,
            StoreStatus::Duplicate => duplicate += 1,
        }
    }
    if orphan > 0 {
        warn!(orphan, "some blocks are still waiting for their parent");
    }
    print_json(&serde_json::json!({
        "accepted": accepted,
        "orphan": orphan,
        "duplicate": duplicate,
    }))
}

async fn watch(store: &BlockchainStore) -> Result<()> {
    info!("watching for chain changes (Ctrl+C to stop)");
    loop {
        let subscription = store.subscribe_reorganize();
        tokio::select! {
            event = subscription.recv() => match event {
                Ok(event) => print_json(&EventView::from(&event))?,
                Err(StoreError::ServiceStopped) => return Ok(()),
                Err(e) => return Err(e.into()),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("installing Ctrl+C handler")?;
                info!("received Ctrl+C, shutting down...");
                return Ok(());
            }
        }
    }
}

async fn run(store: &BlockchainStore, command: Command) -> Result<()> {
    match command {
        Command::Import { file } => import(store, &file).await,
        Command::Replay { file } => replay(store, &file).await,
        Command::Tip => {
            let depth = store.fetch_last_depth().await.context("chain is empty")?;
            let header = store.fetch_block_header(depth).await?;
            print_json(&serde_json::json!({ "depth": depth, "hash": header.hash().to_string() }))
        }
        Command::Header { at } => {
            let header = store.fetch_block_header(parse_locator(&at)?).await?;
            print_json(&HeaderView::from(&header))
        }
        Command::Block { at } => {
            let block = store.fetch_block(parse_locator(&at)?).await?;
            let transactions = block
                .transactions
                .iter()
                .map(TxView::new)
                .collect::<Result<Vec<_>>>()?;
            print_json(&serde_json::json!({
                "header": HeaderView::from(&block.header),
                "transactions": transactions,
            }))
        }
        Command::Tx { hash } => {
            let tx = store.fetch_transaction(hash).await?;
            let position = store.fetch_transaction_index(hash).await?;
            print_json(&serde_json::json!({
                "depth": position.depth,
                "index": position.index,
                "transaction": TxView::new(&tx)?,
            }))
        }
        Command::Spend { outpoint } => {
            let outpoint: OutPoint = outpoint.parse().map_err(anyhow::Error::msg)?;
            match store.fetch_spend(outpoint).await {
                Ok(input) => print_json(&serde_json::json!({ "spent_by": input.to_string() })),
                Err(StoreError::UnspentOutput) => print_json(&serde_json::json!({ "spent_by": null })),
                Err(e) => Err(e.into()),
            }
        }
        Command::Outputs { address } => {
            let address: PaymentAddress = address.parse()?;
            let outputs = match store.fetch_outputs(address).await {
                Ok(outputs) => outputs,
                Err(StoreError::NotFound) => Vec::new(),
                Err(StoreError::UnsupportedPaymentType) => {
                    bail!("only pay-to-pubkey-hash addresses are indexed")
                }
                Err(e) => return Err(e.into()),
            };
            let outputs: Vec<String> = outputs.iter().map(OutPoint::to_string).collect();
            print_json(&outputs)
        }
        Command::Watch => watch(store).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        StoreConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, &cli.log_format);

    info!("chainkeep-node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);

    let store = BlockchainStore::open(&config)
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;

    let result = run(&store, cli.command).await;
    store.stop().await.context("stopping store")?;
    result
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text. Logs go to stderr so JSON results on
/// stdout stay clean.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
