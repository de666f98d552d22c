use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::error;

use rowconv::codec::ValueCodec;
use rowconv::config::{CodecConfig, LoadOptions, Platform};
use rowconv::csvio::CsvDialect;
use rowconv::driver::duckdb::DuckDbConnection;
use rowconv::fetch::{CancelToken, RowStream};
use rowconv::load::{infer, Loader};
use rowconv::write::sql::InsertScriptWriter;
use rowconv::write::DelimitedWriter;

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    /// Delimited text, one line per row
    Csv,
    /// INSERT statements, one per row
    Sql,
}

/// Row-level ETL between database queries and delimited files
#[derive(Parser, Debug)]
#[command(name = "rowconv", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a query to a CSV or INSERT-script file
    #[command(
        after_help = "Output format is inferred from the -o extension; .gz and .zip \
                      compress transparently."
    )]
    Export(ExportArgs),

    /// Load a CSV file into a table
    Load(LoadArgs),

    /// Print the CREATE TABLE statement inferred from a CSV file
    Ddl(DdlArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Database file to query
    db: PathBuf,

    /// Query producing the rows
    #[arg(short, long)]
    query: String,

    /// Output path (.csv, .sql, optionally .gz / .zip)
    #[arg(short, long)]
    output: PathBuf,

    /// Output format (inferred from -o if not specified)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Skip the header row
    #[arg(long)]
    no_header: bool,

    /// Fetch rows on a background thread
    #[arg(long)]
    prefetch: bool,

    /// Preferred cursor fetch batch size
    #[arg(long, default_value_t = 30000)]
    fetch_hint: usize,

    /// Stop after this many rows (0 = all)
    #[arg(long, default_value_t = 0)]
    row_limit: u64,

    /// Quote every field, not just the ones that need it
    #[arg(long)]
    quote_all: bool,

    /// Columns to drop from the output (repeatable)
    #[arg(long = "exclude")]
    excludes: Vec<String>,

    /// Replace a column's value: NAME=VALUE (repeatable)
    #[arg(long = "remap")]
    remaps: Vec<String>,

    /// Target table for INSERT output (default: output base name)
    #[arg(long)]
    table: Option<String>,

    /// Break INSERT statements past this width
    #[arg(long, default_value_t = 9999)]
    max_line_width: usize,
}

#[derive(Parser, Debug)]
struct LoadArgs {
    /// Database file to load into
    db: PathBuf,

    /// CSV input file
    input: PathBuf,

    /// Target table (default: input file stem)
    #[arg(short, long)]
    table: Option<String>,

    /// Loader option, NAME=VALUE (repeatable); names are case-insensitive
    #[arg(short = 'O', long = "option")]
    options: Vec<String>,
}

#[derive(Parser, Debug)]
struct DdlArgs {
    /// CSV input file
    input: PathBuf,

    /// Table name (default: input file stem)
    #[arg(short, long)]
    table: Option<String>,

    /// Target dialect
    #[arg(long, default_value = "pgsql")]
    platform: String,

    /// Loader option, NAME=VALUE (repeatable)
    #[arg(short = 'O', long = "option")]
    options: Vec<String>,
}

/// Buffer threshold for export sinks.
const EXPORT_BUFFER_SIZE: usize = 8 << 20;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Export(args) => run_export(args),
        Commands::Load(args) => run_load(args),
        Commands::Ddl(args) => run_ddl(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", pair))
        })
        .collect()
}

/// Infer the output format from the path, looking through .gz / .zip.
fn infer_format(path: &Path) -> OutputFormat {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let inner = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".zip"))
        .unwrap_or(name.as_str());
    if inner.ends_with(".sql") {
        OutputFormat::Sql
    } else {
        OutputFormat::Csv
    }
}

fn run_export(args: ExportArgs) -> Result<(), String> {
    let conn = DuckDbConnection::open(&args.db).map_err(|e| e.to_string())?;
    let cursor = conn.query(&args.query).map_err(|e| e.to_string())?;
    let stream =
        RowStream::open(Box::new(cursor), args.fetch_hint).map_err(|e| e.to_string())?;
    let codec = ValueCodec::new(CodecConfig::default());
    let cancel = CancelToken::new();
    let format = args.format.unwrap_or_else(|| infer_format(&args.output));

    let rows = match format {
        OutputFormat::Csv => {
            let mut writer = DelimitedWriter::create(
                &args.output,
                CsvDialect::writer_default(),
                EXPORT_BUFFER_SIZE,
            )
            .map_err(|e| e.to_string())?;
            writer.set_async_mode(args.prefetch);
            writer.set_fetch_hint(args.fetch_hint);
            writer.set_row_limit(args.row_limit);
            if args.quote_all {
                writer.context_mut().apply_quotes_to_all = true;
            }
            for column in &args.excludes {
                writer.context_mut().set_exclude(column);
            }
            for remap in &args.remaps {
                let (column, value) = remap
                    .split_once('=')
                    .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", remap))?;
                writer.context_mut().set_remap(column, value);
            }
            writer
                .write_query(stream, &codec, !args.no_header, &cancel)
                .map_err(|e| e.to_string())?
        }
        OutputFormat::Sql => {
            let mut writer = InsertScriptWriter::create(&args.output, EXPORT_BUFFER_SIZE)
                .map_err(|e| e.to_string())?;
            writer.set_async_mode(args.prefetch);
            writer.set_fetch_hint(args.fetch_hint);
            writer.set_max_line_width(args.max_line_width);
            writer
                .write_query(stream, &codec, args.table.as_deref(), "", &cancel)
                .map_err(|e| e.to_string())?
        }
    };

    println!("{} rows written to {}", rows, args.output.display());
    Ok(())
}

fn run_load(args: LoadArgs) -> Result<(), String> {
    let pairs = parse_pairs(&args.options)?;
    let opts = LoadOptions::from_pairs(pairs).map_err(|e| e.to_string())?;
    let mut conn = DuckDbConnection::open(&args.db).map_err(|e| e.to_string())?;
    let mut loader = Loader::new(&mut conn, args.table.as_deref(), &args.input, opts)
        .map_err(|e| e.to_string())?;
    let rows = loader.run().map_err(|e| e.to_string())?;
    println!(
        "{} rows processed ({} errors)",
        rows,
        loader.stats().total_errors
    );
    Ok(())
}

fn run_ddl(args: DdlArgs) -> Result<(), String> {
    let pairs = parse_pairs(&args.options)?;
    let opts = LoadOptions::from_pairs(pairs).map_err(|e| e.to_string())?;
    let platform = Platform::parse(&args.platform)
        .ok_or_else(|| format!("unknown platform: {}", args.platform))?;
    let table = match &args.table {
        Some(t) => t.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| "cannot derive a table name from the input path".to_string())?,
    };
    let ddl = infer::generate_create_table_ddl(&args.input, &table, &opts, platform)
        .map_err(|e| e.to_string())?;
    println!("{}", ddl);
    Ok(())
}
