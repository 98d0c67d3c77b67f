//! Kordiam import CLI - create Kordiam elements from spreadsheet rows
//!
//! # Commands
//!
//! ```bash
//! kordiam-import import elements.xlsx --dry-run     # Render elements, no network
//! kordiam-import import elements.csv -m mapping.json # Submit elements
//! kordiam-import check-mapping mapping.json         # Validate and list bindings
//! kordiam-import example-mapping                    # Print the reference mapping
//! kordiam-import fetch 4711                         # Show one remote element
//! ```

use clap::{Parser, Subcommand};
use kordiam_importer::api::logs::{log_error, log_info, log_success, log_warning};
use kordiam_importer::{
    logging, read_rows, ClientCredentialsClient, ElementAssembler, ImportError, ImporterConfig,
    KordiamClient, MappingSpec, Pipeline, PipelineOptions, Remote, SourceFormat, TokenManager,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

type CmdResult = Result<bool, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "kordiam-import")]
#[command(about = "Create Kordiam elements from CSV or Excel rows", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write a timestamped log file to the current directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert rows to elements and submit them
    Import {
        /// Input file (.csv, .xlsx, .xls)
        input: PathBuf,

        /// Settings file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Mapping file (default: built-in reference mapping)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Worksheet name (default: first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        /// Print elements instead of submitting them
        #[arg(long)]
        dry_run: bool,

        /// Rows processed concurrently
        #[arg(long, default_value = "1")]
        concurrency: usize,

        /// Skip schema validation
        #[arg(long)]
        no_validate: bool,
    },

    /// Validate a mapping file and list its bindings
    CheckMapping {
        /// Mapping JSON file
        file: PathBuf,
    },

    /// Print the reference mapping
    ExampleMapping,

    /// Fetch one element by id
    Fetch {
        /// Element id
        id: String,

        /// Settings file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_dir = cli.log_file.then(|| Path::new("."));
    match logging::init(&cli.log_level, log_dir) {
        Ok(Some(path)) => eprintln!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => log_warning(format!("Could not create log file, logging to console only: {}", e)),
    }

    let result = match cli.command {
        Commands::Import {
            input,
            config,
            mapping,
            sheet,
            dry_run,
            concurrency,
            no_validate,
        } => {
            cmd_import(
                &input,
                &config,
                mapping.as_deref(),
                sheet.as_deref(),
                dry_run,
                concurrency,
                !no_validate,
            )
            .await
        }

        Commands::CheckMapping { file } => cmd_check_mapping(&file),

        Commands::ExampleMapping => cmd_example_mapping(),

        Commands::Fetch { id, config } => cmd_fetch(&id, &config).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log_error(format!("Error: {}", e));
            std::process::exit(1);
        }
    }
}

fn load_mapping(path: Option<&Path>) -> Result<MappingSpec, ImportError> {
    match path {
        Some(path) => {
            let mapping = MappingSpec::from_file(path)?;
            log_success(format!(
                "Loaded mapping {} ({} bindings)",
                path.display(),
                mapping.binding_count()
            ));
            Ok(mapping)
        }
        None => {
            log_info("Using the reference mapping");
            Ok(MappingSpec::reference())
        }
    }
}

fn build_remote(config: &ImporterConfig) -> Result<Remote, ImportError> {
    let connection = config.connection()?;
    log_info(format!("Connecting to {}", connection.base_url));

    let fetcher = Arc::new(ClientCredentialsClient::new(&connection)?);
    let tokens = TokenManager::new(fetcher)
        .with_refresh_margin(connection.refresh_margin_secs)
        .with_timeout(connection.timeout);

    Ok(Remote {
        tokens: Arc::new(tokens),
        submitter: Arc::new(KordiamClient::new(&connection)?),
    })
}

async fn cmd_import(
    input: &Path,
    config_path: &Path,
    mapping_path: Option<&Path>,
    sheet: Option<&str>,
    dry_run: bool,
    concurrency: usize,
    validate: bool,
) -> CmdResult {
    log_info(format!("Processing {}", input.display()));

    let mapping = load_mapping(mapping_path)?;

    let rows = read_rows(input, sheet)?;
    match &rows.format {
        SourceFormat::Csv { encoding, delimiter } => log_success(format!(
            "Read {} rows (encoding {}, separator '{}')",
            rows.len(),
            encoding,
            delimiter.escape_default()
        )),
        SourceFormat::Excel { sheet } => log_success(format!("Read {} rows from sheet '{}'", rows.len(), sheet)),
    }

    if let Err(missing) = mapping.validate_headers(&rows.headers) {
        log_warning(format!("Mapped columns not found in the file: {}", missing.join(", ")));
    }

    let config = ImporterConfig::load(config_path)?;
    let remote = if dry_run { None } else { Some(build_remote(&config)?) };

    let options = PipelineOptions {
        dry_run,
        concurrency,
        timeout: Duration::from_secs(config.timeout_secs.max(1)),
        validate,
    };
    let pipeline = Pipeline::new(ElementAssembler::new(Arc::new(mapping)), options, remote)?;
    let report = pipeline.run(rows.rows).await;

    for row in &report.rows {
        if let Some(rendered) = &row.rendered {
            println!("--- row {} ---", row.row);
            println!("{}", rendered);
        }
    }

    let summary = report.summary();
    eprintln!();
    eprintln!("Run {}: {}", report.run_id, summary);
    if let Some(err) = &report.aborted {
        eprintln!("Aborted: {}", err);
    }
    let failures = report.failures();
    if !failures.is_empty() {
        eprintln!("Failed rows:");
        for failure in &failures {
            eprintln!("  {}", failure);
        }
    }

    Ok(!report.has_failures())
}

fn cmd_check_mapping(file: &Path) -> CmdResult {
    let mapping = MappingSpec::from_file(file)?;

    for section in mapping.sections() {
        if section.is_empty() && section.defaults.is_empty() {
            continue;
        }
        println!("{}:", section.name);
        for binding in &section.bindings {
            println!("  {}", binding);
        }
        if !section.defaults.is_empty() {
            println!("  defaults: {}", serde_json::to_string(&section.defaults)?);
        }
    }

    log_success(format!("Mapping is valid ({} bindings)", mapping.binding_count()));
    Ok(true)
}

fn cmd_example_mapping() -> CmdResult {
    println!("{}", MappingSpec::reference().to_json()?);
    Ok(true)
}

async fn cmd_fetch(id: &str, config_path: &Path) -> CmdResult {
    let config = ImporterConfig::load(config_path)?;
    let connection = config.connection()?;

    let tokens = TokenManager::new(Arc::new(ClientCredentialsClient::new(&connection)?))
        .with_refresh_margin(connection.refresh_margin_secs)
        .with_timeout(connection.timeout);
    let token = tokens.get_token().await?;

    let element = KordiamClient::new(&connection)?.get_element(id, &token).await?;
    println!("{}", serde_json::to_string_pretty(&element)?);
    Ok(true)
}
