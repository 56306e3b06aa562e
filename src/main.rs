use clap::{Parser, Subcommand, ValueEnum};
use dualbench::config::{BadLinePolicy, ByteSize, Encoding};
use dualbench::{AnalysisPipeline, BenchConfig};
use miette::Result;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone, ValueEnum, Debug)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "dualbench")]
#[command(version)]
#[command(about = "Benchmark eager vs deferred analytics over one CSV file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity (Info -> Debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Silence all logs
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format (text or json)
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the eager/deferred comparison
    Run {
        /// CSV file to analyse (overrides source.path from the config)
        #[arg(value_name = "CSV")]
        csv: Option<PathBuf>,

        /// Benchmark configuration YAML
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Source encoding
        #[arg(long, value_enum)]
        encoding: Option<Encoding>,

        /// What to do with rows that have too many fields
        #[arg(long, value_enum)]
        on_bad_lines: Option<BadLinePolicy>,

        /// Deferred partition size (e.g. "64MB", "16MiB")
        #[arg(long)]
        partition_size: Option<ByteSize>,

        /// Number of entries in the frequency ranking
        #[arg(long)]
        top_n: Option<usize>,

        /// Force deferred graphs on the streaming engine
        #[arg(long)]
        streaming: bool,

        /// Hide the spinner shown while deferred graphs are computed
        #[arg(long)]
        no_progress: bool,
    },
}

fn main() -> Result<()> {
    // Parse CLI args first
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // DUALBENCH_LOG wins over the CLI flags
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("DUALBENCH_LOG")
        .from_env_lossy();

    let run_id = Uuid::new_v4();

    match cli.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .with_span_list(false)
                .with_current_span(false)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let _span = tracing::info_span!("root", run_id = %run_id).entered();

    match cli.command {
        Commands::Run {
            csv,
            config,
            encoding,
            on_bad_lines,
            partition_size,
            top_n,
            streaming,
            no_progress,
        } => {
            let mut bench = match &config {
                Some(path) => BenchConfig::from_path(path)?,
                None => BenchConfig::default(),
            };
            if let Some(csv) = csv {
                bench.source.path = csv;
            }
            if let Some(encoding) = encoding {
                bench.source.encoding = encoding;
            }
            if let Some(policy) = on_bad_lines {
                bench.source.on_bad_lines = policy;
            }
            if let Some(size) = partition_size {
                bench.deferred.partition_size = size;
            }
            if let Some(n) = top_n {
                bench.analysis.top_n = n;
            }
            if streaming {
                bench.deferred.streaming = true;
            }
            if no_progress {
                bench.report.progress = false;
            }
            bench.validate()?;

            let pipeline = AnalysisPipeline::with_process_memory(bench)?;
            let stdout = std::io::stdout();
            pipeline.run(&mut stdout.lock())?;
        }
    }

    Ok(())
}
