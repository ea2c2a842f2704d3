use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tablepipe::cli::{self, EXIT_CONFIG, EXIT_RUN_FAILED};
use tablepipe::job::RunStatus;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// tablepipe: --{tpipe}-> exports tables to dated CSV files and enriches rows via lookups
#[derive(Parser)]
#[command(name = "tpipe", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source configuration from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job from the catalog
    Run {
        /// Name of the job (see `tpipe jobs`)
        job: String,

        /// Echo the exported file to stdout
        #[arg(short, long)]
        print: bool,
    },

    /// Export a table to {table}-{YYYYMMDD}.csv
    Export {
        /// Table to export, overrides TABLE
        #[arg(short, long)]
        table: Option<String>,

        /// Directory to write to, overrides OUTPUT_DIR
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Echo the exported file to stdout
        #[arg(short, long)]
        print: bool,
    },

    /// Enrich rows from the lookup table into the sink table
    Enrich,

    /// Test the connection to the source database
    Check,

    /// List the jobs of the catalog
    Jobs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::from_filename(&cli.env);

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    if let Err(e) = dotenv {
        log::debug!("No dotenv loaded from {}: {}", cli.env, e);
    }

    let mut config = match cli::load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let (job, print) = match cli.command {
        Commands::Run { job, print } => (job, print),
        Commands::Export {
            table,
            output_dir,
            print,
        } => {
            if let Some(table) = table {
                config.table = table;
            }
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            log::info!(
                "Exporting {} to {}",
                config.table.cyan(),
                config.output_dir.display().bright_black()
            );
            ("export".to_string(), print)
        }
        Commands::Enrich => {
            log::info!(
                "Enriching {} from {} into {}",
                config.enrich.source_table.cyan(),
                config.lookup.table.bright_black(),
                config.enrich.sink_table.cyan()
            );
            ("enrich".to_string(), false)
        }
        Commands::Check => return cli::check_connection(&config).await,
        Commands::Jobs => {
            let orchestrator = cli::load_orchestrator(config)?;
            return cli::list_jobs(orchestrator.catalog(), cli.json);
        }
    };

    let orchestrator = cli::load_orchestrator(config)?;
    let run = cli::run_job(&orchestrator, &job, cli.json, print).await?;
    if run.status == RunStatus::Failed {
        std::process::exit(EXIT_RUN_FAILED);
    }

    Ok(())
}
