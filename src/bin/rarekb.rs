use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rarekb_loader::app::{App, AppSettings, RunOptions};
use rarekb_loader::config::{ConfigLoader, ResolvedConfig, SourceSettings};
use rarekb_loader::destination::SqliteDestination;
use rarekb_loader::domain::Namespace;
use rarekb_loader::error::LoaderError;
use rarekb_loader::mysql_source::MysqlSource;
use rarekb_loader::output::{ConsoleOutput, JsonOutput, OutputMode};
use rarekb_loader::source::{SourceStore, TsvSource};

#[derive(Parser)]
#[command(name = "rarekb")]
#[command(
    about = "Reconcile ORPHA/OMIM/HPO identifiers and bulk-load disease-phenotype associations"
)]
#[command(version, author)]
struct Cli {
    /// Print results as JSON instead of progress lines.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Import source associations into the destination store")]
    Load(LoadArgs),
    #[command(about = "Report how many source rows would resolve, without writing")]
    Audit(AuditArgs),
    #[command(about = "Resolve one external code to its destination id")]
    Lookup(LookupArgs),
    #[command(about = "Create the destination schema")]
    Init,
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long)]
    report: Option<Utf8PathBuf>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Create placeholder diseases for codes that cannot be mapped.
    #[arg(long)]
    placeholders: bool,
}

#[derive(Args)]
struct AuditArgs {
    #[arg(long)]
    report: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct LookupArgs {
    code: String,

    #[arg(long)]
    namespace: Option<Namespace>,
}

enum RunStatus {
    Clean,
    RowsErrored,
}

fn main() -> ExitCode {
    match run() {
        Ok(RunStatus::Clean) => ExitCode::SUCCESS,
        Ok(RunStatus::RowsErrored) => ExitCode::from(4),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<LoaderError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &LoaderError) -> u8 {
    match error {
        LoaderError::MissingConfig
        | LoaderError::ConfigRead(_)
        | LoaderError::ConfigParse(_)
        | LoaderError::InvalidConfig(_)
        | LoaderError::MissingColumn { .. } => 2,
        LoaderError::SourceConnect(_) | LoaderError::DestinationOpen(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<RunStatus> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    if let Command::Init = cli.command {
        let destination = open_destination(&config)?;
        destination.close()?;
        if matches!(output_mode, OutputMode::Console) {
            println!("destination schema ready at {}", config.destination);
        }
        return Ok(RunStatus::Clean);
    }

    match &config.source {
        SourceSettings::Mysql {
            connection,
            associations_query,
            cross_references_query,
        } => {
            let source = MysqlSource::connect(
                connection,
                associations_query.clone(),
                cross_references_query.clone(),
            )?;
            run_command(cli.command, source, &config, output_mode)
        }
        SourceSettings::Tsv {
            associations,
            cross_references,
        } => {
            let source = TsvSource::new(associations.clone(), cross_references.clone());
            run_command(cli.command, source, &config, output_mode)
        }
    }
}

fn open_destination(config: &ResolvedConfig) -> miette::Result<SqliteDestination> {
    let destination = SqliteDestination::open(&config.destination)?;
    destination.init_schema()?;
    Ok(destination)
}

fn run_command<S: SourceStore>(
    command: Command,
    source: S,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<RunStatus> {
    let destination = match command {
        Command::Load(_) => open_destination(config)?,
        _ => SqliteDestination::open_read_only(&config.destination)?,
    };
    let mut app = App::new(source, destination, AppSettings::from_config(config));

    let status = match command {
        Command::Load(args) => {
            let options = RunOptions {
                dry_run: false,
                batch_size: args.batch_size,
                create_placeholders: args.placeholders.then_some(true),
            };
            run_load(&mut app, options, args.report, output_mode)?
        }
        Command::Audit(args) => {
            let options = RunOptions {
                dry_run: true,
                ..RunOptions::default()
            };
            run_load(&mut app, options, args.report, output_mode)?
        }
        Command::Lookup(args) => {
            let result = match output_mode {
                OutputMode::Json => app.lookup(&args.code, args.namespace, &JsonOutput),
                OutputMode::Console => app.lookup(&args.code, args.namespace, &ConsoleOutput),
            }?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_lookup(&result).into_diagnostic()?,
                OutputMode::Console => ConsoleOutput::print_lookup(&result),
            }
            RunStatus::Clean
        }
        Command::Init => RunStatus::Clean,
    };

    let (_source, destination) = app.into_parts();
    destination.close()?;
    Ok(status)
}

fn run_load<S: SourceStore>(
    app: &mut App<S, SqliteDestination>,
    options: RunOptions,
    report_path: Option<Utf8PathBuf>,
    output_mode: OutputMode,
) -> miette::Result<RunStatus> {
    let report = match output_mode {
        OutputMode::Json => app.load(options, &JsonOutput),
        OutputMode::Console => app.load(options, &ConsoleOutput),
    }?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Console => ConsoleOutput::print_report(&report),
    }

    if let Some(path) = report_path {
        report.write(&path)?;
        tracing::info!(path = %path, "report written");
    }

    Ok(if report.has_errors() {
        RunStatus::RowsErrored
    } else {
        RunStatus::Clean
    })
}
