//! `debate`: run multi-agent debates from the terminal.

mod console;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use colored::Colorize;
use console::{Console, ConsoleOperator};
use dk_core::config::{load_config, AppConfig};
use dk_core::engine::{DebateEngine, ResumeRequest, SessionError, SessionOutcome, StartRequest};
use dk_core::init::{generate_debate_kit_structure, InitOptions};
use dk_core::transcript::TranscriptStore;
use dk_protocol::config_models::SelectionMode;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "debate", author, version, about = "Orchestrate debates between AI agents")]
struct Cli {
    /// Project root holding `.debate-kit/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create `.debate-kit/` with example agents and rosters.
    Init {
        /// Overwrite template files in an existing `.debate-kit/`.
        #[arg(long)]
        force: bool,

        /// Only one pair of agents and the default roster.
        #[arg(long)]
        minimal: bool,
    },

    /// Start a new debate.
    Start(StartArgs),

    /// Continue a debate from its transcript.
    Resume {
        /// Conversation id, as printed when the debate started.
        id: Uuid,

        /// Topic to use if the conversation has to be recreated.
        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        max_rounds: Option<u32>,

        #[command(flatten)]
        operator: OperatorArgs,
    },

    /// List configured agents and whether they are available.
    Agents,

    /// List transcripts.
    Transcripts,
}

#[derive(Args, Debug)]
struct StartArgs {
    #[arg(long, conflicts_with = "topic_file", required_unless_present = "topic_file")]
    topic: Option<String>,

    /// Read the topic from a file.
    #[arg(long)]
    topic_file: Option<PathBuf>,

    /// Agent that opens the debate (name or roster position).
    #[arg(long)]
    first_speaker: Option<String>,

    #[arg(long)]
    max_rounds: Option<u32>,

    /// Named roster from `.debate-kit/rosters/`.
    #[arg(long, conflicts_with = "agents")]
    roster: Option<String>,

    /// Comma-separated agent names.
    #[arg(long, value_delimiter = ',')]
    agents: Option<Vec<String>>,

    #[command(flatten)]
    operator: OperatorArgs,
}

#[derive(Args, Debug)]
struct OperatorArgs {
    /// Pick every speaker yourself.
    #[arg(long)]
    manual: bool,

    /// Review each turn: continue, give feedback or stop.
    #[arg(long)]
    interactive: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Init { force, minimal } => init(&cli.root, force, minimal).await,
        Command::Start(args) => start(&cli.root, args).await,
        Command::Resume {
            id,
            topic,
            max_rounds,
            operator,
        } => {
            let request = ResumeRequest {
                topic,
                max_rounds,
                ..ResumeRequest::new(id)
            };
            resume(&cli.root, request, operator).await
        }
        Command::Agents => agents(&cli.root).await,
        Command::Transcripts => transcripts(&cli.root).await,
    }
}

fn config_error(error: impl std::fmt::Display) -> ExitCode {
    eprintln!("{} {}", "error:".red().bold(), error);
    ExitCode::from(EXIT_CONFIG)
}

async fn load(root: &Path) -> Result<AppConfig, ExitCode> {
    debug!(root = %root.display(), "loading configuration");
    load_config(root).await.map_err(config_error)
}

async fn init(root: &Path, force: bool, minimal: bool) -> color_eyre::Result<ExitCode> {
    let options = InitOptions {
        target_dir: root.to_path_buf(),
        force,
        minimal,
    };
    let written = generate_debate_kit_structure(options)
        .await
        .wrap_err("failed to initialize .debate-kit")?;

    for path in &written {
        println!("  {} {}", "created".green(), path.display());
    }
    println!("Run `debate start --topic \"...\"` to begin.");
    Ok(ExitCode::SUCCESS)
}

async fn start(root: &Path, args: StartArgs) -> color_eyre::Result<ExitCode> {
    let config = match load(root).await {
        Ok(config) => config,
        Err(code) => return Ok(code),
    };

    let topic = match (&args.topic, &args.topic_file) {
        (Some(topic), _) => topic.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read topic file {}", path.display()))?,
        (None, None) => return Err(eyre!("a topic is required")),
    };

    let mut engine = match DebateEngine::from_config(&config, root) {
        Ok(engine) => engine,
        Err(e) => return Ok(config_error(e)),
    };

    let mut request = StartRequest {
        first_speaker: args.first_speaker,
        max_rounds: args.max_rounds,
        roster: args.agents,
        ..StartRequest::new(topic)
    };

    let roster = match &args.roster {
        Some(name) => match config.roster(name) {
            Some(roster) => Some(roster),
            None => return Ok(config_error(format!("unknown roster '{name}'"))),
        },
        None if request.roster.is_none() => config.roster("default"),
        None => None,
    };
    if let Some(roster) = roster {
        request.roster = Some(roster.agents.clone());
        request.first_speaker = request.first_speaker.or_else(|| roster.first_speaker.clone());
        request.max_rounds = request.max_rounds.or(roster.max_rounds);
        if roster.summarizer.is_some() {
            engine.settings_mut().summarizer = roster.summarizer.clone();
        }
    }

    run(&config, engine, args.operator, |engine, events_tx| async move {
        engine.start(request, events_tx).await
    })
    .await
}

async fn resume(root: &Path, request: ResumeRequest, operator: OperatorArgs) -> color_eyre::Result<ExitCode> {
    let config = match load(root).await {
        Ok(config) => config,
        Err(code) => return Ok(code),
    };
    let engine = match DebateEngine::from_config(&config, root) {
        Ok(engine) => engine,
        Err(e) => return Ok(config_error(e)),
    };

    run(&config, engine, operator, |engine, events_tx| async move {
        engine.resume(request, events_tx).await
    })
    .await
}

/// Drive one session with the console attached and map its end to an exit code.
async fn run<F, Fut>(
    config: &AppConfig,
    mut engine: DebateEngine,
    operator: OperatorArgs,
    session: F,
) -> color_eyre::Result<ExitCode>
where
    F: FnOnce(Arc<DebateEngine>, mpsc::Sender<dk_protocol::ipc::Event>) -> Fut,
    Fut: std::future::Future<Output = Result<SessionOutcome, SessionError>>,
{
    if operator.manual {
        engine.settings_mut().selection = SelectionMode::Manual;
    }

    let (events_tx, events_rx) = mpsc::channel(256);
    let (prompts_tx, prompts_rx) = mpsc::channel(1);

    let wants_operator = operator.interactive || config.settings.selection == SelectionMode::Manual || operator.manual;
    if wants_operator {
        engine = engine
            .with_operator(Arc::new(ConsoleOperator::new(prompts_tx)))
            .with_review(operator.interactive);
    }

    let colors: HashMap<String, String> = config
        .agents
        .iter()
        .map(|a| (a.name.to_ascii_lowercase(), a.color.clone()))
        .collect();
    let console = tokio::spawn(Console::new(colors).run(events_rx, prompts_rx));

    let result = session(Arc::new(engine), events_tx).await;
    console.await.wrap_err("console task failed")?;

    match result {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                eprintln!("{} {}", "warning:".yellow().bold(), warning);
            }
            println!("Transcript: {}", outcome.transcript.display());
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

async fn agents(root: &Path) -> color_eyre::Result<ExitCode> {
    let config = match load(root).await {
        Ok(config) => config,
        Err(code) => return Ok(code),
    };
    let engine = match DebateEngine::from_config(&config, root) {
        Ok(engine) => engine,
        Err(e) => return Ok(config_error(e)),
    };

    if engine.registry().is_empty() {
        println!("No agents configured. Run `debate init` to create some.");
        return Ok(ExitCode::SUCCESS);
    }

    for (position, agent) in engine.registry().iter().enumerate() {
        let status = if agent.is_available().await {
            "available".green()
        } else {
            "unavailable".red()
        };
        let backend = config
            .agent(&agent.id)
            .map(|d| d.backend.name())
            .unwrap_or_default();
        println!(
            "{:>2}. {:<16} {:<8} {:<12} {}",
            position + 1,
            agent.id.bold(),
            backend,
            status,
            agent.stance
        );
    }

    for roster in &config.rosters {
        println!("roster {}: {}", roster.name.bold(), roster.agents.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

async fn transcripts(root: &Path) -> color_eyre::Result<ExitCode> {
    let config = match load(root).await {
        Ok(config) => config,
        Err(code) => return Ok(code),
    };
    let store = TranscriptStore::new(config.transcript_dir(root));
    let infos = store.list().await.wrap_err("failed to list transcripts")?;

    if infos.is_empty() {
        println!("No transcripts in {}", store.dir().display());
        return Ok(ExitCode::SUCCESS);
    }

    for info in infos {
        let name = info
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let status = match info.stop_reason {
            Some(reason) => reason.to_string(),
            None => format!("{:?}", info.status).to_lowercase(),
        };
        println!(
            "{}  {}  {:<20} {:>4} turns  {}",
            name,
            info.id,
            status,
            info.turns,
            info.topic.lines().next().unwrap_or_default()
        );
    }
    Ok(ExitCode::SUCCESS)
}
