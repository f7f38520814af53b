//! formchain CLI - chained data format conversion

mod config;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use config::Config;
use formchain_core::{
    ConversionOptions, ConversionStep, ConverterPool, DEFAULT_STEPS_DIR, Format, Pipeline,
    PipelineDef, PipelineExecutor, Registry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt;

/// Converter instances kept per key when neither flag nor config sets one.
const DEFAULT_POOL_SIZE: usize = 5;

#[derive(Parser)]
#[command(name = "formchain")]
#[command(about = "Chained data format conversion", long_about = None)]
struct Cli {
    /// Verbose output (log each pipeline run)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (overrides --verbose)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Path to config file (default: ~/.config/formchain/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available converters
    List,

    /// Convert a file through a chain of converters
    Convert {
        /// Input file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Conversion step as a converter key, e.g. csv-json (repeatable, in order)
        #[arg(short, long = "step", value_name = "KEY")]
        steps: Vec<ConversionStep>,
        /// Explicit source format (overrides detection)
        #[arg(long)]
        from: Option<Format>,
        /// Explicit target format (overrides detection)
        #[arg(long)]
        to: Option<Format>,
        /// Column order for tabular data (comma-separated)
        #[arg(long, value_delimiter = ',')]
        headers: Vec<String>,
        /// Indent structured output
        #[arg(long)]
        indent: bool,
        /// Pretty-print structured output
        #[arg(long)]
        pretty: bool,
        /// Save every intermediate stage
        #[arg(long)]
        save_steps: bool,
        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Run a pipeline definition file
    Run {
        /// Pipeline file (YAML, TOML, or JSON)
        pipeline: PathBuf,
        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Executor settings shared by `convert` and `run`.
#[derive(clap::Args)]
struct ExecArgs {
    /// Converter instances kept per converter key
    #[arg(long, value_parser = parse_positive_usize)]
    pool_size: Option<usize>,
    /// Directory for intermediate stage files
    #[arg(long)]
    steps_dir: Option<PathBuf>,
}

/// Log level argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level (default)
    Warn,
    /// Error level (least verbose)
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Parse a positive usize (>= 1).
fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value < 1 {
        return Err(format!("{} is not in 1..", value));
    }
    Ok(value)
}

/// Initialize logging. Logs go to stderr so stdout stays clean for reports.
fn init_logging(level: LogLevel) -> Result<()> {
    let level: Level = level.into();

    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file
    let config = if let Some(ref path) = cli.config {
        Config::load_from_path(Some(path.clone()))
    } else {
        Config::load()
    };

    let verbose = cli.verbose || config.defaults.verbose;
    let level = cli
        .log_level
        .unwrap_or(if verbose { LogLevel::Info } else { LogLevel::Warn });
    init_logging(level)?;

    // Create registry with enabled converters
    let registry = Registry::new();

    #[cfg(feature = "serde")]
    formchain_serde::register_all(&registry);

    let registry = Arc::new(registry);

    match cli.command {
        Commands::List => cmd_list(&registry),
        Commands::Convert {
            input,
            output,
            steps,
            from,
            to,
            headers,
            indent,
            pretty,
            save_steps,
            exec,
        } => {
            let steps = resolve_steps(steps, &input, &output, from, to)?;
            let options = ConversionOptions {
                indent,
                pretty_print: pretty || config.defaults.pretty_print,
                headers,
                save_intermediary_steps: save_steps || config.defaults.save_intermediary_steps,
            };
            let pipeline = Pipeline::builder()
                .input_path(input)
                .output_path(output)
                .steps(steps)
                .options(options)
                .build()
                .context("Invalid conversion")?;

            let executor = build_executor(registry, &exec, &config);
            run_pipeline(&executor, &pipeline)
        }
        Commands::Run { pipeline, exec } => {
            let executor = build_executor(registry, &exec, &config);
            cmd_run(&executor, &pipeline, &config)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "formchain", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn build_executor(registry: Arc<Registry>, exec: &ExecArgs, config: &Config) -> PipelineExecutor {
    let pool_size = exec
        .pool_size
        .or(config.defaults.pool_size)
        .unwrap_or(DEFAULT_POOL_SIZE);
    let steps_dir = exec
        .steps_dir
        .clone()
        .or_else(|| config.defaults.steps_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STEPS_DIR));

    let pool = Arc::new(ConverterPool::new(pool_size, registry));
    PipelineExecutor::new(pool).with_steps_dir(steps_dir)
}

fn cmd_list(registry: &Registry) -> Result<()> {
    println!("Available converters:\n");

    for decl in registry.declarations() {
        println!("  {}", decl.key());
        if !decl.description.is_empty() {
            println!("    {}", decl.description);
        }
        println!("    {} → {}", decl.from, decl.to);
        println!();
    }

    println!("Total: {} converters", registry.len());
    Ok(())
}

/// Use the explicit chain, or infer a single direct step from the file formats.
fn resolve_steps(
    steps: Vec<ConversionStep>,
    input: &Path,
    output: &Path,
    from: Option<Format>,
    to: Option<Format>,
) -> Result<Vec<ConversionStep>> {
    if !steps.is_empty() {
        for (i, pair) in steps.windows(2).enumerate() {
            if pair[0].to != pair[1].from {
                bail!(
                    "Step {} ({}) does not start where step {} ({}) ends",
                    i + 2,
                    pair[1].key(),
                    i + 1,
                    pair[0].key()
                );
            }
        }
        return Ok(steps);
    }

    let source_format = from
        .or_else(|| Format::from_path(input))
        .context("Could not detect source format. Use --from to specify.")?;

    let target_format = to
        .or_else(|| Format::from_path(output))
        .context("Could not detect target format. Use --to to specify.")?;

    if source_format == target_format {
        bail!("Already at target format ({}), nothing to convert", target_format);
    }

    Ok(vec![ConversionStep::new(source_format, target_format)])
}

fn cmd_run(executor: &PipelineExecutor, path: &Path, config: &Config) -> Result<()> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
    let mut def = PipelineDef::from_bytes(&data, Some(path))
        .with_context(|| format!("Failed to load pipeline {}", path.display()))?;

    def.options.pretty_print |= config.defaults.pretty_print;
    def.options.save_intermediary_steps |= config.defaults.save_intermediary_steps;

    let pipeline = def
        .build()
        .with_context(|| format!("Invalid pipeline {}", path.display()))?;

    println!("Running pipeline: {}", path.display());
    run_pipeline(executor, &pipeline)
}

/// Execute and report per-step sizes; fails with the run's error.
fn run_pipeline(executor: &PipelineExecutor, pipeline: &Pipeline) -> Result<()> {
    let result = executor.execute(pipeline);

    if let Some(err) = result.error {
        return Err(anyhow::Error::new(err).context(format!(
            "Pipeline failed after {} of {} steps",
            result.results.iter().filter(|r| r.is_ok()).count(),
            pipeline.steps().len()
        )));
    }
    if !result.success {
        bail!("Pipeline failed");
    }

    println!(
        "Processed {} conversion steps in {} ms",
        result.results.len(),
        result.duration.as_millis()
    );
    for (i, step) in result.results.iter().enumerate() {
        println!(
            "  Step {}: {} → {} ({:.1} KB)",
            i + 1,
            step.step.from,
            step.step.to,
            step.data.len() as f64 / 1024.0
        );
    }
    println!("Output: {}", pipeline.output_path().display());

    Ok(())
}
