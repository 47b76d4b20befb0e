use std::{fmt::Display, path::PathBuf, str::FromStr, sync::Arc};

use chainmigrate_migration::{
    DEFAULT_BATCH_SIZE, ExportOptions, Exporter, ImportOptions, Importer, JsonPayloadDecoder,
    Ledger, Logger, Signer, StateStore, types::CollectionId,
};
use chainmigrate_rpc::RpcLedger;
use clap::{Args, Parser as ClapParser, Subcommand as ClapSubcommand, builder::TypedValueParser};
use eyre::{Result, WrapErr};
use serde::Serialize;
use serde_json::Value;
use tracing::Level;

const REPORT_SCHEMA_VERSION: u32 = 1;
const DEFAULT_WS_ENDPOINT: &str = "ws://127.0.0.1:9944";

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(
    name = "chainmigrate",
    version,
    about = "Export NFT collections from a ledger and replay them into another"
)]
pub struct CLI {
    #[command(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(ClapParser, Debug, Clone)]
pub struct Options {
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "CHAINMIGRATE_LOG_LEVEL",
        global = true,
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        default_value_t = LogColor::Auto,
        env = "CHAINMIGRATE_LOG_COLOR",
        global = true,
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto, always, never"
    )]
    pub log_color: LogColor,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            log_color: LogColor::Auto,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct NodeOptions {
    #[arg(
        long = "ws-endpoint",
        value_name = "URL",
        default_value = DEFAULT_WS_ENDPOINT,
        env = "CHAINMIGRATE_WS_ENDPOINT"
    )]
    /// Node endpoint; ws:// and wss:// are reached over HTTP
    pub ws_endpoint: String,
    #[arg(
        long = "relay-endpoint",
        value_name = "URL",
        env = "CHAINMIGRATE_RELAY_ENDPOINT"
    )]
    /// Signing relay for write calls, defaults to the node endpoint
    pub relay_endpoint: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SignerOptions {
    #[arg(
        long = "signer-seed",
        value_name = "SURI",
        env = "CHAINMIGRATE_SIGNER_SEED",
        hide_env_values = true
    )]
    /// Secret URI of the account that signs destination writes
    pub signer_seed: String,
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(name = "export", about = "Export collections and their tokens to local files")]
    Export {
        #[arg(required = true, value_name = "COLLECTION_ID")]
        collection_ids: Vec<CollectionId>,
        #[command(flatten)]
        node: NodeOptions,
        #[arg(long = "output-dir", default_value = ".")]
        /// Directory receiving the snapshot and token files
        output_dir: PathBuf,
        #[arg(long = "refresh", default_value_t = false)]
        /// Discard existing token files instead of resuming them
        refresh: bool,
        #[arg(long = "block-number")]
        /// Read the source as of this block
        block_number: Option<u64>,
        #[arg(long = "silent", default_value_t = false)]
        /// Do not log progress
        silent: bool,
        #[arg(long = "json", default_value_t = false)]
        /// Emit machine-readable JSON output
        json: bool,
    },
    #[command(name = "import", about = "Replay exported collections into a destination ledger")]
    Import {
        #[arg(required = true, value_name = "COLLECTION_ID")]
        collection_ids: Vec<CollectionId>,
        #[command(flatten)]
        node: NodeOptions,
        #[command(flatten)]
        signer: SignerOptions,
        #[arg(long = "input-dir", default_value = ".")]
        /// Directory holding the exported files
        input_dir: PathBuf,
        #[arg(long = "output-dir", default_value = ".")]
        /// Directory holding the import state files
        output_dir: PathBuf,
        #[arg(long = "refresh", default_value_t = false)]
        /// Forget recorded import progress and start over
        refresh: bool,
        #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE, value_parser = clap::value_parser!(u64).range(1..=10_000).map(|size| size as usize))]
        /// Tokens minted per batch (1-10000, inclusive)
        batch_size: usize,
        #[arg(long = "silent", default_value_t = false)]
        /// Do not log progress
        silent: bool,
        #[arg(long = "json", default_value_t = false)]
        /// Emit machine-readable JSON output
        json: bool,
    },
    #[command(name = "burn", about = "Destroy the destination collections of previous imports")]
    Burn {
        #[arg(required = true, value_name = "COLLECTION_ID")]
        collection_ids: Vec<CollectionId>,
        #[command(flatten)]
        node: NodeOptions,
        #[command(flatten)]
        signer: SignerOptions,
        #[arg(long = "output-dir", default_value = ".")]
        /// Directory holding the import state files
        output_dir: PathBuf,
        #[arg(long = "silent", default_value_t = false)]
        /// Do not log progress
        silent: bool,
        #[arg(long = "json", default_value_t = false)]
        /// Emit machine-readable JSON output
        json: bool,
    },
    #[command(name = "status", about = "Show recorded import progress without contacting a node")]
    Status {
        #[arg(required = true, value_name = "COLLECTION_ID")]
        collection_ids: Vec<CollectionId>,
        #[arg(long = "output-dir", default_value = ".")]
        /// Directory holding the import state files
        output_dir: PathBuf,
        #[arg(long = "json", default_value_t = false)]
        /// Emit machine-readable JSON output
        json: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct CollectionReport {
    schema_version: u32,
    command: &'static str,
    collection_id: CollectionId,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    line: String,
}

impl CollectionReport {
    fn new(command: &'static str, collection_id: CollectionId, status: &'static str) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            command,
            collection_id,
            status,
            summary: None,
            error: None,
            line: String::new(),
        }
    }

    fn with_summary(mut self, summary: &impl Serialize) -> Self {
        self.summary = serde_json::to_value(summary).ok();
        self
    }

    fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = line.into();
        self
    }

    fn failed(command: &'static str, collection_id: CollectionId, error: impl Display) -> Self {
        let error = format!("{error:#}");
        Self {
            line: format!("Collection {collection_id}: {command} failed: {error}"),
            error: Some(error),
            ..Self::new(command, collection_id, "failed")
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == "failed"
    }
}

fn emit_report(report: &CollectionReport, json: bool) -> Result<()> {
    if json {
        let encoded =
            serde_json::to_string(report).wrap_err("Cannot serialize collection report")?;
        println!("{encoded}");
    } else if report.is_failure() {
        eprintln!("{}", report.line);
    } else {
        println!("{}", report.line);
    }
    Ok(())
}

fn component_logger(silent: bool, scope: &str) -> Logger {
    if silent {
        Logger::silent()
    } else {
        Logger::tracing(scope)
    }
}

fn connect(node: &NodeOptions) -> Result<Arc<dyn Ledger>> {
    let mut ledger = RpcLedger::new(&node.ws_endpoint)
        .wrap_err_with(|| format!("Cannot use --ws-endpoint {}", node.ws_endpoint))?;
    if let Some(relay) = &node.relay_endpoint {
        ledger = ledger
            .with_relay(relay)
            .wrap_err_with(|| format!("Cannot use --relay-endpoint {relay}"))?;
    }
    Ok(Arc::new(ledger))
}

impl Subcommand {
    pub fn json_output(&self) -> bool {
        match self {
            Self::Export { json, .. }
            | Self::Import { json, .. }
            | Self::Burn { json, .. }
            | Self::Status { json, .. } => *json,
        }
    }

    /// Runs the command over every collection and fails if any of them did.
    pub async fn run(self) -> Result<()> {
        let json = self.json_output();
        let reports = match self {
            Subcommand::Export {
                collection_ids,
                node,
                output_dir,
                refresh,
                block_number,
                silent,
                json,
            } => {
                let exporter = Exporter::new(
                    connect(&node)?,
                    Arc::new(JsonPayloadDecoder),
                    component_logger(silent, "export"),
                    ExportOptions {
                        output_dir,
                        refresh,
                        at_block: block_number,
                    },
                );
                export_collections(&exporter, &collection_ids, json).await?
            }
            Subcommand::Import {
                collection_ids,
                node,
                signer,
                input_dir,
                output_dir,
                refresh,
                batch_size,
                silent,
                json,
            } => {
                let mut options = ImportOptions::new(input_dir, output_dir);
                options.batch_size = batch_size;
                options.refresh = refresh;
                let importer = Importer::new(
                    connect(&node)?,
                    Signer::new(signer.signer_seed),
                    component_logger(silent, "import"),
                    options,
                );
                import_collections(&importer, &collection_ids, json).await?
            }
            Subcommand::Burn {
                collection_ids,
                node,
                signer,
                output_dir,
                silent,
                json,
            } => {
                let importer = Importer::new(
                    connect(&node)?,
                    Signer::new(signer.signer_seed),
                    component_logger(silent, "burn"),
                    ImportOptions::new(output_dir.clone(), output_dir),
                );
                burn_collections(&importer, &collection_ids, json).await?
            }
            Subcommand::Status {
                collection_ids,
                output_dir,
                json,
            } => show_status(&output_dir, &collection_ids, json)?,
        };

        let failed = reports.iter().filter(|report| report.is_failure()).count();
        if failed > 0 {
            eyre::bail!("{failed} of {} collection(s) failed", reports.len());
        }
        if !json && reports.len() > 1 {
            println!("All {} collection(s) processed.", reports.len());
        }
        Ok(())
    }
}

async fn export_collections(
    exporter: &Exporter,
    collection_ids: &[CollectionId],
    json: bool,
) -> Result<Vec<CollectionReport>> {
    let mut reports = Vec::with_capacity(collection_ids.len());
    for &id in collection_ids {
        let report = match exporter.export_collection(id).await {
            Ok(Some(summary)) => CollectionReport::new("export", id, "exported")
                .with_summary(&summary)
                .with_line(format!(
                    "Collection {id}: exported {} new token(s), {} already on disk, {} hole(s), last id #{}",
                    summary.appended, summary.already_exported, summary.holes, summary.tokens_count
                )),
            Ok(None) => CollectionReport::new("export", id, "skipped")
                .with_line(format!("Collection {id}: not found on the source, skipped")),
            Err(error) => CollectionReport::failed("export", id, error),
        };
        emit_report(&report, json)?;
        reports.push(report);
    }
    Ok(reports)
}

async fn import_collections(
    importer: &Importer,
    collection_ids: &[CollectionId],
    json: bool,
) -> Result<Vec<CollectionReport>> {
    let mut reports = Vec::with_capacity(collection_ids.len());
    for &id in collection_ids {
        let report = match importer.import_collection(id).await {
            Ok(Some(summary)) => {
                let destination = summary
                    .destination_id
                    .map_or_else(|| "nothing".to_owned(), |id| id.to_string());
                let ownership = if summary.ownership_changed {
                    "transferred"
                } else {
                    "pending"
                };
                CollectionReport::new("import", id, "imported")
                    .with_summary(&summary)
                    .with_line(format!(
                        "Collection {id}: imported into {destination}, {} token(s) minted, {} placeholder(s), ownership {ownership}",
                        summary.minted, summary.placeholders
                    ))
            }
            Ok(None) => CollectionReport::new("import", id, "skipped")
                .with_line(format!("Collection {id}: export files missing, skipped")),
            Err(error) => CollectionReport::failed("import", id, error),
        };
        emit_report(&report, json)?;
        reports.push(report);
    }
    Ok(reports)
}

async fn burn_collections(
    importer: &Importer,
    collection_ids: &[CollectionId],
    json: bool,
) -> Result<Vec<CollectionReport>> {
    let mut reports = Vec::with_capacity(collection_ids.len());
    for &id in collection_ids {
        let report = match importer.burn_collection(id).await {
            Ok(true) => CollectionReport::new("burn", id, "burned")
                .with_line(format!("Collection {id}: destination collection burned")),
            Ok(false) => CollectionReport::new("burn", id, "skipped")
                .with_line(format!("Collection {id}: nothing burned")),
            Err(error) => CollectionReport::failed("burn", id, error),
        };
        emit_report(&report, json)?;
        reports.push(report);
    }
    Ok(reports)
}

fn show_status(
    output_dir: &std::path::Path,
    collection_ids: &[CollectionId],
    json: bool,
) -> Result<Vec<CollectionReport>> {
    let mut reports = Vec::with_capacity(collection_ids.len());
    for &id in collection_ids {
        let report = match StateStore::load(output_dir, id) {
            Ok(store) if !store.path().exists() => CollectionReport::new("status", id, "not_started")
                .with_line(format!("Collection {id}: no import recorded")),
            Ok(store) => {
                let state = store.state();
                let stage = if state.burned {
                    "burned"
                } else if state.ownership_changed {
                    "complete"
                } else {
                    "in_progress"
                };
                let destination = state
                    .collection_id
                    .map_or_else(|| "none".to_owned(), |id| id.to_string());
                CollectionReport::new("status", id, stage)
                    .with_summary(state)
                    .with_line(format!(
                        "Collection {id}: {stage}, destination {destination}, {} token id(s) replayed, last #{}",
                        state.created_tokens.len(),
                        state.last_created_token().unwrap_or(0)
                    ))
            }
            Err(error) => CollectionReport::failed("status", id, error),
        };
        emit_report(&report, json)?;
        reports.push(report);
    }
    Ok(reports)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogColor {
    #[default]
    Auto,
    Always,
    Never,
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => write!(f, "auto"),
            LogColor::Always => write!(f, "always"),
            LogColor::Never => write!(f, "never"),
        }
    }
}

impl FromStr for LogColor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().trim() {
            "auto" => Ok(LogColor::Auto),
            "always" => Ok(LogColor::Always),
            "never" => Ok(LogColor::Never),
            _ => Err(format!("Invalid log color: {s}")),
        }
    }
}
