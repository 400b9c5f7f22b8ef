use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codelens::config::Config;
use codelens::progress::ProgressSnapshot;
use codelens::execute::{Judge0Client, Poller};
use codelens::review::{AnalysisOutcome, BatchReport, ChatClient, Orchestrator};
use codelens::source::{collect_sources, SourceFile};
use codelens::util::truncate;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "codelens",
    about = "Review source files with a language model and run code in a sandboxed judge",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Review files (directories are walked recursively)
    Analyze {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print the full batch report as JSON
        #[arg(long)]
        json: bool,

        /// Maximum in-flight requests (0 = no limit)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Model id override
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Execute one file through the judge and print its output
    Run {
        file: PathBuf,

        /// Judge language id; inferred from the file extension when omitted
        #[arg(short, long)]
        language_id: Option<u32>,
    },
    /// Store API keys in the system keychain
    Setup {
        /// Store the judge key instead of the model key
        #[arg(long)]
        judge: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut config = Config::load();

    match cli.command {
        Command::Analyze {
            paths,
            json,
            concurrency,
            model,
        } => {
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrent_requests = concurrency;
            }
            analyze(&config, &paths, json).await
        }
        Command::Run { file, language_id } => run(&config, &file, language_id).await,
        Command::Setup { judge } => setup(&config, judge),
    }
}

async fn analyze(config: &Config, paths: &[PathBuf], json: bool) -> Result<()> {
    let files = collect_sources(paths)?;
    if files.is_empty() {
        eprintln!("No readable source files found.");
        return Ok(());
    }

    let client = ChatClient::from_config(config)?;
    let orchestrator =
        Orchestrator::new(client).with_max_concurrent(config.max_concurrent_requests);

    let progress = orchestrator.progress();
    eprintln!("Analyzing {} file(s) with {}...", files.len(), config.model);
    let report = orchestrator
        .analyze_batch_with(&files, |outcome| {
            eprintln!("  {}", progress_line(&progress.snapshot(), outcome));
        })
        .await;

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", out);
    } else {
        print_report(&report)?;
    }
    Ok(())
}

fn progress_line(snapshot: &ProgressSnapshot, outcome: &AnalysisOutcome) -> String {
    let verdict = if outcome.failed {
        "failed".to_string()
    } else {
        format!("score {}", outcome.score)
    };
    let mut line = format!(
        "[{}/{}] {} ({})",
        snapshot.completed(),
        snapshot.total(),
        truncate(&outcome.path, 60),
        verdict
    );
    let in_flight = snapshot.in_flight();
    if in_flight > 0 {
        line.push_str(&format!(", {} in flight", in_flight));
    }
    line
}

fn print_report(report: &BatchReport) -> Result<()> {
    let mut out = io::stdout().lock();
    for outcome in report.sorted() {
        print_outcome(&mut out, outcome)?;
    }

    let summary = report.summary();
    writeln!(out, "────────────────────────────────────────")?;
    write!(
        out,
        "{} file(s): {} reviewed, {} failed, {} with corrections",
        summary.total, summary.succeeded, summary.failed, summary.with_corrections
    )?;
    match summary.average_score {
        Some(avg) => writeln!(out, ", average score {:.1}", avg)?,
        None => writeln!(out)?,
    }
    Ok(())
}

fn print_outcome(out: &mut impl Write, outcome: &AnalysisOutcome) -> io::Result<()> {
    writeln!(out, "════ {} ════", outcome.path)?;
    writeln!(out, "Score: {}/100", outcome.score)?;
    for (section, lines) in &outcome.sections {
        writeln!(out)?;
        writeln!(out, "{}:", section)?;
        for line in lines {
            writeln!(out, "  {}", line)?;
        }
    }
    if let Some(code) = &outcome.corrected_code {
        writeln!(out)?;
        writeln!(out, "Corrected code:")?;
        writeln!(out, "{}", code)?;
    }
    writeln!(out)
}

async fn run(config: &Config, file: &Path, language_id: Option<u32>) -> Result<()> {
    let source = SourceFile::read(file)?;
    let language_id = match language_id {
        Some(id) => id,
        None => judge_language_id(&source.extension).with_context(|| {
            format!(
                "Unknown language for '.{}' files; pass --language-id",
                source.extension
            )
        })?,
    };

    let judge = Judge0Client::from_config(config)?;
    let poller = Poller::new(judge, config.poll_policy());
    eprintln!("{}", codelens::execute::RUNNING_PLACEHOLDER);
    let report = poller.run_execution(&source.content, language_id).await;

    if report.is_failure() {
        eprintln!("{}", report.display());
        std::process::exit(1);
    }
    print!("{}", report.display());
    Ok(())
}

/// Judge0 CE language ids for common extensions
fn judge_language_id(extension: &str) -> Option<u32> {
    let id = match extension.to_ascii_lowercase().as_str() {
        "c" => 50,
        "cpp" | "cc" | "cxx" => 54,
        "cs" => 51,
        "go" => 60,
        "java" => 62,
        "js" | "mjs" => 63,
        "py" => 71,
        "rb" => 72,
        "rs" => 73,
        "ts" => 74,
        "php" => 68,
        "kt" => 78,
        "swift" => 83,
        "sh" => 46,
        _ => return None,
    };
    Some(id)
}

fn setup(config: &Config, judge: bool) -> Result<()> {
    let label = if judge { "Judge0 (RapidAPI)" } else { "model API" };
    print!("  {} key: ", label);
    io::stdout().flush()?;

    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("No key provided");
    }

    let stored = if judge {
        config.set_judge_api_key(key)
    } else {
        config.set_api_key(key)
    };
    stored.map_err(anyhow::Error::msg)?;

    println!("  + {} key saved to the system keychain", label);
    println!("  Settings file: {}", Config::config_location());
    Ok(())
}
