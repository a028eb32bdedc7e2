// crates/schemaless-cli/src/main.rs
// ============================================================================
// Module: Schemaless CLI Entry Point
// Description: Command dispatcher for cell writes, reads, and index queries.
// Purpose: Operate a configured sharded cell store from the shell.
// Dependencies: clap, schemaless-config, schemaless-core, serde_json, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `schemaless` binary loads the store configuration, opens every shard,
//! runs one command, and closes the shards again. Results are written to
//! stdout as one JSON document per line; logs and errors go to stderr.
//! Fan-out queries that lose shards still print what they found, report each
//! failed shard on stderr, and exit with status 2.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use schemaless_config::SchemalessConfig;
use schemaless_core::Cell;
use schemaless_core::CellWrite;
use schemaless_core::FanOut;
use schemaless_core::FieldQuery;
use schemaless_core::IndexValue;
use schemaless_core::KvStore;
use schemaless_core::OpContext;
use schemaless_core::PartitionLocation;
use schemaless_core::PartitionRead;
use schemaless_core::RowKey;
use schemaless_core::ShardFailure;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Exit status for commands that succeeded on some shards only.
const PARTIAL_FAILURE_EXIT: u8 = 2;
/// Default page size for partition reads.
const DEFAULT_PARTITION_LIMIT: usize = 1_000;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "schemaless", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file (overrides `SCHEMALESS_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Abort the command after this many milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    timeout_ms: Option<u64>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Write one immutable cell version.
    Put(PutCommand),
    /// Read one cell version, or the latest when no ref key is given.
    Get(GetCommand),
    /// List the latest cells whose indexed field matches a comparison.
    Find(FindCommand),
    /// Read the single latest cell holding a unique field value.
    Unique(FieldValueArgs),
    /// Report whether any row holds a field value.
    Exists(FieldValueArgs),
    /// List the latest cell of every row in a column.
    Column(ColumnCommand),
    /// Page through one shard in insertion or creation order.
    Partition(PartitionCommand),
}

impl Commands {
    /// Returns the subcommand name used in logs.
    const fn name(&self) -> &'static str {
        match self {
            Self::Put(_) => "put",
            Self::Get(_) => "get",
            Self::Find(_) => "find",
            Self::Unique(_) => "unique",
            Self::Exists(_) => "exists",
            Self::Column(_) => "column",
            Self::Partition(_) => "partition",
        }
    }
}

/// Arguments for `put`.
#[derive(Args, Debug)]
struct PutCommand {
    /// Row key as a UUID or hex string; generated when omitted.
    #[arg(long)]
    row_key: Option<String>,
    /// Column name.
    #[arg(long)]
    column: String,
    /// Version number for this write.
    #[arg(long, allow_negative_numbers = true)]
    ref_key: i64,
    /// JSON object body.
    #[arg(long)]
    body: String,
    /// Body field to leave out of the indexes (repeatable).
    #[arg(long = "exclude", value_name = "FIELD")]
    exclude: Vec<String>,
}

/// Arguments for `get`.
#[derive(Args, Debug)]
struct GetCommand {
    /// Row key as a UUID or hex string.
    #[arg(long)]
    row_key: String,
    /// Column name.
    #[arg(long)]
    column: String,
    /// Exact version to read.
    #[arg(long, allow_negative_numbers = true)]
    ref_key: Option<i64>,
}

/// Arguments for `find`.
#[derive(Args, Debug)]
struct FindCommand {
    /// Column name.
    #[arg(long)]
    column: String,
    /// Indexed field name.
    #[arg(long)]
    field: String,
    /// Comparison operator (`=`, `!=`, `>`, `>=`, `<`, `<=`).
    #[arg(long, default_value = "=")]
    op: String,
    /// Value as JSON; anything that is not JSON is taken as text.
    #[arg(long, allow_hyphen_values = true)]
    value: String,
}

/// Arguments shared by `unique` and `exists`.
#[derive(Args, Debug)]
struct FieldValueArgs {
    /// Column name.
    #[arg(long)]
    column: String,
    /// Indexed field name.
    #[arg(long)]
    field: String,
    /// Value as JSON; anything that is not JSON is taken as text.
    #[arg(long, allow_hyphen_values = true)]
    value: String,
}

/// Arguments for `column`.
#[derive(Args, Debug)]
struct ColumnCommand {
    /// Column name.
    #[arg(long)]
    column: String,
}

/// Arguments for `partition`.
#[derive(Args, Debug)]
struct PartitionCommand {
    /// Shard position in the primary bucket list.
    #[arg(long)]
    index: usize,
    /// Position column to page by.
    #[arg(long, value_enum, default_value_t = LocationArg::AddedAt)]
    location: LocationArg,
    /// Return cells strictly after this position.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    after: i64,
    /// Maximum cells to return.
    #[arg(long, default_value_t = DEFAULT_PARTITION_LIMIT)]
    limit: usize,
}

/// Partition position selector.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LocationArg {
    /// Insertion sequence.
    #[value(name = "added_at")]
    AddedAt,
    /// Creation timestamp.
    #[value(name = "created_at")]
    CreatedAt,
}

impl From<LocationArg> for PartitionLocation {
    fn from(value: LocationArg) -> Self {
        match value {
            LocationArg::AddedAt => Self::AddedAt,
            LocationArg::CreatedAt => Self::CreatedAt,
        }
    }
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// JSON rendering of a cell.
#[derive(Debug, Serialize)]
struct CellOutput {
    /// Row key in hex.
    row_key: String,
    /// Column name.
    column: String,
    /// Version number.
    ref_key: i64,
    /// Shard-local insertion sequence.
    added_at: i64,
    /// Creation time in unix milliseconds.
    created_at: Option<i64>,
    /// Decoded body.
    body: Value,
}

impl From<&Cell> for CellOutput {
    fn from(cell: &Cell) -> Self {
        let body = serde_json::from_slice(&cell.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&cell.body).into_owned()));
        Self {
            row_key: cell.row_key.to_hex(),
            column: cell.column_name.clone(),
            ref_key: cell.ref_key,
            added_at: cell.added_at,
            created_at: cell.created_at,
            body,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self { message }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Loads configuration, opens the store, and runs one command.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = SchemalessConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    init_logging(&config.logging.level);
    let store = config.build_store().map_err(|err| CliError::new(err.to_string()))?;
    let ctx = cli
        .timeout_ms
        .map_or_else(OpContext::background, |ms| OpContext::with_timeout(Duration::from_millis(ms)));

    let command = cli.command.name();
    let mut stdout = std::io::stdout().lock();
    let outcome = execute(&store, &ctx, cli.command, &mut stdout);
    let closed = store.destroy(&OpContext::background());
    let failures = outcome?;
    tracing::info!(command = %command, failed_shards = failures.len(), "command finished");
    closed.map_err(|err| CliError::new(format!("failed to close shards: {err}")))?;

    if failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    for failure in &failures {
        write_stderr_line(&format!("shard {} failed: {}", failure.shard, failure.error))
            .map_err(|err| output_error("stderr", &err))?;
    }
    Ok(ExitCode::from(PARTIAL_FAILURE_EXIT))
}

/// Installs the stderr subscriber; `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs `command`, writing results to `out` and returning shard failures.
fn execute(
    store: &KvStore,
    ctx: &OpContext,
    command: Commands,
    out: &mut impl Write,
) -> CliResult<Vec<ShardFailure>> {
    match command {
        Commands::Put(command) => command_put(store, ctx, command, out).map(|()| Vec::new()),
        Commands::Get(command) => command_get(store, ctx, &command, out).map(|()| Vec::new()),
        Commands::Find(command) => {
            let query = FieldQuery::with_operator(
                command.column,
                command.field,
                parse_value(&command.value),
                &command.op,
            )
            .map_err(store_error)?;
            let found = store.get_cells_by_field_latest(ctx, &query).map_err(store_error)?;
            write_cells(found, out)
        }
        Commands::Unique(args) => {
            let found = store
                .get_cell_by_unique_field_latest(
                    ctx,
                    &args.column,
                    &args.field,
                    &parse_value(&args.value),
                )
                .map_err(store_error)?;
            write_json(&found.value.as_ref().map(CellOutput::from), out)?;
            Ok(found.failures)
        }
        Commands::Exists(args) => {
            let found = store
                .check_value_exist(ctx, &args.column, &args.field, &parse_value(&args.value))
                .map_err(store_error)?;
            write_json(&json!({ "exists": found.value }), out)?;
            Ok(found.failures)
        }
        Commands::Column(command) => {
            let found = store.get_cells_by_column_latest(ctx, &command.column).map_err(store_error)?;
            write_cells(found, out)
        }
        Commands::Partition(command) => {
            let read = PartitionRead::new(command.location.into(), command.after, command.limit)
                .map_err(store_error)?;
            let cells = store.partition_read(ctx, command.index, &read).map_err(store_error)?;
            for cell in &cells {
                write_json(&CellOutput::from(cell), out)?;
            }
            Ok(Vec::new())
        }
    }
}

/// Executes `put`.
fn command_put(
    store: &KvStore,
    ctx: &OpContext,
    command: PutCommand,
    out: &mut impl Write,
) -> CliResult<()> {
    let row_key = match command.row_key.as_deref() {
        Some(text) => RowKey::parse(text).map_err(store_error)?,
        None => RowKey::random(),
    };
    let write = CellWrite::new(row_key, command.column, command.ref_key, command.body.into_bytes())
        .excluding(command.exclude);
    store.put_cell(ctx, &write).map_err(store_error)?;
    write_json(
        &json!({
            "row_key": write.row_key.to_hex(),
            "column": write.column_name,
            "ref_key": write.ref_key,
        }),
        out,
    )
}

/// Executes `get`.
fn command_get(
    store: &KvStore,
    ctx: &OpContext,
    command: &GetCommand,
    out: &mut impl Write,
) -> CliResult<()> {
    let row_key = RowKey::parse(&command.row_key).map_err(store_error)?;
    let cell = match command.ref_key {
        Some(ref_key) => store.get_cell(ctx, &row_key, &command.column, ref_key),
        None => store.get_cell_latest(ctx, &row_key, &command.column),
    }
    .map_err(store_error)?;
    write_json(&cell.as_ref().map(CellOutput::from), out)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a command-line value as JSON, falling back to text.
fn parse_value(text: &str) -> IndexValue {
    serde_json::from_str::<Value>(text)
        .map_or_else(|_| IndexValue::Text(text.to_string()), |value| IndexValue::from_json(&value))
}

/// Writes every cell of a fan-out result and returns its failures.
fn write_cells(found: FanOut<Vec<Cell>>, out: &mut impl Write) -> CliResult<Vec<ShardFailure>> {
    for cell in &found.value {
        write_json(&CellOutput::from(cell), out)?;
    }
    Ok(found.failures)
}

/// Writes one JSON document followed by a newline.
fn write_json<T: Serialize>(value: &T, out: &mut impl Write) -> CliResult<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    writeln!(out, "{line}").map_err(|err| output_error("stdout", &err))
}

/// Maps a store error into a CLI error.
fn store_error(error: schemaless_core::StoreError) -> CliError {
    CliError::new(error.to_string())
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write {stream}: {error}"))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
