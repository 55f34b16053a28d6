//! sqlpipe - PostgreSQL execution plans rewritten as pipe syntax.

use sqlpipe::cli::Cli;
use sqlpipe::config::{self, Config, ConnectionConfig, ExecutionConfig};
use sqlpipe::db::{self, DatabaseClient, RecordedPlanClient};
use sqlpipe::error::{Result, SqlPipeError};
use sqlpipe::pipeline::Pipeline;
use sqlpipe::{logging, report, tui};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

/// How a run ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    /// Some statements failed, others were analyzed.
    PartialFailure,
    Failure,
}

impl Outcome {
    fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Failure => ExitCode::from(1),
            Self::PartialFailure => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before parsing so .env can supply SQLPIPE_DATABASE_URL
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let interactive = cli.wants_tui();
    if interactive {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Some(note) = config::dotenv_note(&dotenv) {
        debug!("{note}");
    }

    match run(&cli, interactive).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            if interactive {
                eprintln!("{}: {}", e.category(), e);
            }
            Outcome::Failure.exit_code()
        }
    }
}

async fn run(cli: &Cli, interactive: bool) -> Result<Outcome> {
    cli.validate().map_err(SqlPipeError::config)?;
    let format = cli.parse_output_format().map_err(SqlPipeError::config)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let mut execution = config.execution.clone();
    execution.apply_overrides(cli.timeout, cli.retries);
    let connection = resolve_connection(cli, &config)?;

    if interactive {
        let initial_sql = cli.sql_source().map(|source| source.read()).transpose()?;
        let (client, info) = open_client(cli, &connection, &execution).await?;
        tui::run(Pipeline::new(client), info, initial_sql).await?;
        return Ok(Outcome::Success);
    }

    let statements = cli
        .sql_source()
        .ok_or_else(|| SqlPipeError::query("No SQL input provided."))?
        .load()?;
    info!("Loaded {} statement(s)", statements.len());

    let (client, _) = open_client(cli, &connection, &execution).await?;
    let pipeline = Pipeline::new(client);
    let results = pipeline.analyze_all(&statements).await;
    if let Err(e) = pipeline.close().await {
        warn!("Error closing database connection: {}", e);
    }

    let total = results.len();
    let mut analyses = Vec::with_capacity(total);
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(analysis) => analyses.push(analysis),
            Err(e) => error!("Statement {}: {}: {}", index + 1, e.category(), e),
        }
    }

    if !analyses.is_empty() {
        let output = report::render(&analyses, format)?;
        write_output(cli.output_file.as_deref(), &output)?;
    }

    Ok(match analyses.len() {
        n if n == total => Outcome::Success,
        0 => Outcome::Failure,
        _ => Outcome::PartialFailure,
    })
}

/// Resolves the final connection configuration.
///
/// Precedence, highest first: URL or connection flags, the named connection,
/// the default connection from the config file, `PG*` environment variables,
/// then the built-in database and user.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    let mut connection = match cli.connection_name() {
        Some(name) => config.get_connection(Some(name)).cloned().ok_or_else(|| {
            SqlPipeError::config(format!("Connection '{}' not found in config file", name))
        })?,
        None => config.get_connection(None).cloned().unwrap_or_default(),
    };

    if let Some(overrides) = cli.to_connection_config()? {
        connection.merge(&overrides);
    }

    connection.apply_env_defaults();
    connection.apply_builtin_defaults();
    Ok(connection)
}

/// Opens a recorded plan when `--plan-file` is given, otherwise connects.
async fn open_client(
    cli: &Cli,
    connection: &ConnectionConfig,
    execution: &ExecutionConfig,
) -> Result<(Box<dyn DatabaseClient>, String)> {
    if let Some(path) = &cli.plan_file {
        info!("Using recorded plan from {}", path.display());
        let client = RecordedPlanClient::from_file(path)?;
        return Ok((Box::new(client), format!("plan file {}", path.display())));
    }

    info!("Connecting to {}", connection.display_string());
    let client = db::connect(connection, execution).await?;
    Ok((client, connection.display_string()))
}

fn write_output(path: Option<&Path>, output: &str) -> Result<()> {
    match path {
        Some(path) => {
            let mut content = output.to_string();
            if !content.ends_with('\n') {
                content.push('\n');
            }
            std::fs::write(path, content).map_err(|e| {
                SqlPipeError::internal(format!("Failed to write {}: {e}", path.display()))
            })?;
            info!("Wrote output to {}", path.display());
        }
        None => println!("{}", output.trim_end_matches('\n')),
    }
    Ok(())
}
