//! A simple program demonstrates how to use `toolrelay` as a library.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use toolrelay::SessionBuilder;
use toolrelay::core::{
    BackendsConfig, Conversation, FinishReason, HistoryMessage, RunOutcome,
};
use toolrelay_model::{MessageContent, ModelMessage, Role};
use toolrelay_openai_model::OpenAIProvider;

const BAR_CHAR: &str = "▎";

#[derive(Parser, Debug)]
#[command(name = "toolrelay", version, about = "Answers with the help of tools")]
struct Cli {
    /// Answer this prompt and exit.
    #[arg(long, conflicts_with = "history")]
    prompt: Option<String>,

    /// Answer a JSON chat history (`[{authorId, text, timestamp}]`) and exit.
    #[arg(long)]
    history: Option<PathBuf>,

    /// The author id of our own messages in the history.
    #[arg(long, default_value = "assistant")]
    self_id: String,

    /// Tool back-end configuration (`mcpServers` layout).
    #[arg(long, env = "TOOLRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of tool rounds per answer.
    #[arg(long, default_value_t = toolrelay::core::DEFAULT_MAX_ROUNDS)]
    max_rounds: usize,

    /// Deadline for each completion and tool call, in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the resulting turns as JSON.
    #[arg(long)]
    json: bool,

    /// API key of the completion service.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Model name.
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // A missing `.env` is fine.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut model_provider = OpenAIProvider::new(&*cli.api_key);
    if let Some(base_url) = &cli.base_url {
        model_provider = model_provider.with_base_url(base_url);
    }
    if let Some(model) = &cli.model {
        model_provider = model_provider.with_model(model);
    }

    let mut builder = SessionBuilder::with_model_provider(model_provider)
        .with_system_prompt(
            include_str!("./system_prompt.md").replace("{{HOST_OS}}", host_os()),
        )
        .with_max_rounds(cli.max_rounds);
    if let Some(path) = &cli.config {
        let backends = BackendsConfig::load(path)?;
        info!("loaded {} back-end spec(s)", backends.backends.len());
        builder = builder.with_backends_config(backends);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.with_call_timeout(Duration::from_secs(secs));
    }
    let session = builder.build();

    let conversation = if let Some(prompt) = &cli.prompt {
        Conversation::from_prompt(prompt)
    } else if let Some(path) = &cli.history {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let history: Vec<HistoryMessage> = serde_json::from_str(&content)
            .with_context(|| format!("invalid history in {}", path.display()))?;
        Conversation::from_history(history, &cli.self_id)
    } else {
        return interactive(&session, cli.json).await;
    };

    let start = conversation.len();
    let outcome = with_spinner(session.run(conversation)).await?;
    print_outcome(&outcome, start, cli.json)
}

async fn interactive(session: &toolrelay::Session, json: bool) -> Result<()> {
    let mut conversation = Conversation::default();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_line().await else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut next = conversation.clone();
        next.push(ModelMessage::user(line));

        let start = next.len();
        match with_spinner(session.run(next)).await {
            Ok(outcome) => {
                print_outcome(&outcome, start, json)?;
                conversation = outcome.conversation;
            }
            Err(err) => {
                // The failed message is not kept.
                eprintln!("{}{}", BAR_CHAR.bright_red(), err.bright_red());
            }
        }
    }
}

async fn with_spinner<F: Future>(fut: F) -> F::Output {
    let progress_bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {wide_msg}") {
        progress_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    progress_bar.set_message("🤔 Thinking...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let output = fut.await;
    progress_bar.finish_and_clear();
    output
}

/// Prints the turns appended after the first `start` ones.
fn print_outcome(outcome: &RunOutcome, start: usize, json: bool) -> Result<()> {
    let turns = outcome.conversation.turns().get(start..).unwrap_or_default();
    if json {
        println!("{}", serde_json::to_string_pretty(turns)?);
        return Ok(());
    }

    for turn in turns {
        match (&turn.role, &turn.content) {
            (Role::Assistant, MessageContent::Text(text)) => {
                println!("{}🤖 {}", BAR_CHAR.bright_cyan(), text.bright_white());
            }
            (_, MessageContent::Text(text)) => {
                println!("{}🔧 {}", BAR_CHAR.bright_black(), text.dimmed());
            }
            (_, MessageContent::Structured(payload)) => {
                println!("{}🔧 {}", BAR_CHAR.bright_black(), payload.dimmed());
            }
        }
    }
    if outcome.finish == FinishReason::RoundLimitReached {
        println!(
            "{}⚠️  Stopped after {} tool rounds, the answer may be incomplete.",
            BAR_CHAR.bright_yellow(),
            outcome.rounds
        );
    }
    Ok(())
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[inline]
fn host_os() -> &'static str {
    let os = std::env::consts::OS;
    match os {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}
