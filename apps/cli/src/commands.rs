//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use incidentqa_core::{Pipeline, ProgressReporter};
use incidentqa_shared::{
    Answer, AppConfig, config_file_path, init_config_at, load_config_or_default,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// IncidentQA: answers incident questions from logs and runbooks.
#[derive(Parser)]
#[command(
    name = "incidentqa",
    version,
    about = "Answer incident questions using Splunk logs and Confluence runbooks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file path (defaults to ~/.incidentqa/incidentqa.toml).
    #[arg(long, env = "INCIDENTQA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask one incident question.
    Ask {
        /// The question. Read from stdin when omitted.
        question: Option<String>,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check that Splunk and Confluence are reachable.
    Health,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "incidentqa=info",
        1 => "incidentqa=debug",
        _ => "incidentqa=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };

    match cli.command {
        Command::Ask { question, json } => cmd_ask(&config_path, question, json).await,
        Command::Health => cmd_health(&config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&config_path),
            ConfigAction::Show => cmd_config_show(&config_path),
        },
    }
}

fn load(config_path: &Path) -> Result<AppConfig> {
    Ok(load_config_or_default(config_path)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(config_path: &Path, question: Option<String>, json: bool) -> Result<()> {
    let config = load(config_path)?;
    let pipeline = Pipeline::from_env(&config)?;

    let question = match question {
        Some(q) => q,
        None => read_question()?,
    };

    info!(model = %config.openai.model, "answering question");

    let reporter = CliProgress::new();
    let answer = tokio::select! {
        answer = pipeline.answer(&question, &reporter) => answer,
        _ = tokio::signal::ctrl_c() => {
            reporter.spinner.finish_and_clear();
            warn!("interrupted, question cancelled");
            return Err(eyre!("cancelled"));
        }
    };

    print_answer(&answer, json)
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
    } else {
        println!("{}", answer.text);
    }
    Ok(())
}

/// Prompt on an interactive terminal, then read one line from stdin.
fn read_question() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("Question: ");
        std::io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(strip_line_ending(line))
}

/// Drop the terminator `read_line` keeps; everything else is the user's text.
fn strip_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

async fn cmd_health(config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    let pipeline = Pipeline::from_env(&config)?;

    let report = pipeline.check_readiness().await;
    for backend in &report {
        match &backend.detail {
            None => println!("  {:<12} ok", backend.name),
            Some(detail) => println!("  {:<12} unreachable ({detail})", backend.name),
        }
    }

    let down = report.iter().filter(|b| !b.healthy).count();
    if down > 0 {
        return Err(eyre!("{down} backend(s) unreachable"));
    }
    Ok(())
}

fn cmd_config_init(config_path: &Path) -> Result<()> {
    init_config_at(config_path)?;
    println!("Config initialized at: {}", config_path.display());
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _answer: &Answer) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_accepts_question_and_json_flag() {
        let cli = Cli::try_parse_from(["incidentqa", "ask", "why is parser failing?", "--json"])
            .expect("parse");
        match cli.command {
            Command::Ask { question, json } => {
                assert_eq!(question.as_deref(), Some("why is parser failing?"));
                assert!(json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn stdin_question_keeps_text_but_not_line_ending() {
        assert_eq!(strip_line_ending("  why is parser down? \n".into()), "  why is parser down? ");
        assert_eq!(strip_line_ending("err001\r\n".into()), "err001");
        assert_eq!(strip_line_ending("\n".into()), "");
        assert_eq!(strip_line_ending(String::new()), "");
    }

    #[test]
    fn empty_question_argument_is_accepted() {
        let cli = Cli::try_parse_from(["incidentqa", "ask", ""]).expect("parse");
        match cli.command {
            Command::Ask { question, .. } => assert_eq!(question.as_deref(), Some("")),
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "incidentqa",
            "health",
            "--config",
            "/tmp/iqa.toml",
            "-vv",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/iqa.toml")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
