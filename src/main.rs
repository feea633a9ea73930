//! CLI entry point: a small REPL frontend over the agent engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dotenvy::dotenv;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use tiller::engine::{Engine, EngineDefaults, StepOptions, SummarizeOptions};
use tiller::message::{AgentMessage, EventKind, TextRole, ToolState};
use tiller::orchestrator::{Orchestrator, RunOutcome};
use tiller::store::{FileTaskStore, MemoryTaskStore, TaskStore};
use tiller::tools::{ReadFileTool, RunCommandTool};
use tiller::{ChatClient, Config};

#[derive(Parser, Debug)]
#[command(
    name = "tiller",
    author,
    version,
    about = "Chat with a tool-using agent from your terminal"
)]
struct Cli {
    /// Send a one-shot prompt (non-interactive; approval-gated tools are
    /// rejected automatically)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Require the model to call a tool on every turn
    #[arg(long)]
    require_tool: bool,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace directory for the bundled file/shell tools
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Keep tasks in memory instead of on disk
    #[arg(long)]
    no_save: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    tiller::logging::init(cli.verbose);

    let mut config = Config::load(cli.config.clone())?;
    if let Some(model) = cli.model.clone() {
        config.model = Some(model);
    }
    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = Some(base_url);
    }

    let client = ChatClient::new(config.base_url(), &config.api_key()?, config.retry_policy())?;

    let step_defaults = StepOptions {
        model: Some(config.model()),
        require_tool: config.require_tool,
        max_steps: config.max_steps,
        max_retries: config.max_retries,
        temperature: config.temperature,
        ..StepOptions::default()
    };
    let summarize_defaults = SummarizeOptions {
        model: Some(config.model()),
        ..SummarizeOptions::default()
    };
    let engine = Arc::new(Engine::new(
        client,
        EngineDefaults {
            step: step_defaults,
            summarize: summarize_defaults,
        },
    ));

    let workspace = match cli.workspace.clone() {
        Some(workspace) => workspace,
        None => std::env::current_dir()?,
    };
    engine
        .registry()
        .register_tool(Arc::new(ReadFileTool::new(workspace.clone())));
    engine
        .registry()
        .register_tool(Arc::new(RunCommandTool::new(workspace)));

    let store: Arc<dyn TaskStore> = if cli.no_save {
        Arc::new(MemoryTaskStore::new())
    } else {
        Arc::new(FileTaskStore::new(FileTaskStore::default_dir()?))
    };

    let step_options = StepOptions {
        require_tool: cli.require_tool.then_some(true),
        ..StepOptions::default()
    };
    let mut orchestrator = Orchestrator::new(
        engine,
        store,
        step_options,
        SummarizeOptions::default(),
    );

    if let Some(prompt) = cli.prompt {
        return run_one_shot(&mut orchestrator, &prompt).await;
    }
    run_repl(&mut orchestrator).await
}

// === One-Shot Mode ===

async fn run_one_shot(orchestrator: &mut Orchestrator, prompt: &str) -> Result<()> {
    let printed = orchestrator.active().task.messages.len();
    let mut outcome = run_with_ctrl_c(orchestrator, |orch| orch.submit_user_input(prompt)).await?;
    while outcome == RunOutcome::AwaitingApproval {
        eprintln!(
            "{}",
            "approval-gated tool call rejected in one-shot mode".yellow()
        );
        outcome = orchestrator
            .reject_pending(Some("Approval prompts are unavailable in one-shot mode".into()))
            .await?;
    }
    print_new_messages(orchestrator, printed);
    Ok(())
}

// === REPL ===

async fn run_repl(orchestrator: &mut Orchestrator) -> Result<()> {
    println!(
        "{} Type a message, or /new, /tasks, /switch <id>, /quit.",
        "tiller".bold().cyan()
    );
    let mut editor = DefaultEditor::new()?;

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match line {
            "/quit" | "/exit" => break,
            "/new" => {
                orchestrator.new_task().await?;
                println!("{}", "started a new task".dimmed());
            }
            "/tasks" => {
                for summary in orchestrator.list_tasks().await? {
                    let title = if summary.title.is_empty() {
                        "(untitled)"
                    } else {
                        summary.title.as_str()
                    };
                    println!("  {}  {}", summary.id.dimmed(), title);
                }
            }
            _ if line.starts_with("/switch ") => {
                let id = line.trim_start_matches("/switch ").trim();
                orchestrator.switch_task(id).await?;
                println!("{}", format!("switched to task {id}").dimmed());
            }
            _ if line.starts_with('/') => {
                println!("{}", "unknown command".red());
            }
            input => {
                if let Err(error) = run_turn(orchestrator, &mut editor, input).await {
                    eprintln!("{} {error:#}", "error:".red());
                }
            }
        }
    }

    orchestrator.save_active().await?;
    Ok(())
}

/// Drive one user turn, prompting for approvals until the run goes idle.
async fn run_turn(
    orchestrator: &mut Orchestrator,
    editor: &mut DefaultEditor,
    input: &str,
) -> Result<()> {
    let mut printed = orchestrator.active().task.messages.len();
    let mut outcome = run_with_ctrl_c(orchestrator, |orch| orch.submit_user_input(input)).await?;

    loop {
        printed = print_new_messages(orchestrator, printed);
        if outcome == RunOutcome::Idle {
            break;
        }

        // The pending message resolves in place; rewind one entry so the
        // outcome gets printed too.
        let pending_index = orchestrator.active().task.messages.len() - 1;
        let decision = editor.readline(&format!("{} approve? [y/N] ", "⚙".yellow()))?;
        outcome = if decision.trim().eq_ignore_ascii_case("y") {
            run_with_ctrl_c(orchestrator, |orch| orch.approve_pending(None)).await?
        } else {
            let feedback = editor.readline("feedback (optional): ")?;
            let feedback = Some(feedback.trim())
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            run_with_ctrl_c(orchestrator, |orch| orch.reject_pending(feedback)).await?
        };
        printed = pending_index;
    }
    Ok(())
}

/// Run an orchestrator operation with ctrl-c wired to the abort token.
async fn run_with_ctrl_c<'a, F, Fut>(
    orchestrator: &'a mut Orchestrator,
    operation: F,
) -> Result<RunOutcome>
where
    F: FnOnce(&'a mut Orchestrator) -> Fut,
    Fut: Future<Output = Result<RunOutcome>> + 'a,
{
    let cancel = orchestrator.cancel_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let outcome = operation(orchestrator).await;
    watcher.abort();
    outcome
}

/// Print messages appended since `from`, returning the new high-water mark.
fn print_new_messages(orchestrator: &Orchestrator, from: usize) -> usize {
    let messages = &orchestrator.active().task.messages;
    for message in &messages[from..] {
        match message {
            AgentMessage::Text(text) if text.role == TextRole::Assistant => {
                if let Some(thought) = &text.thought
                    && !thought.trim().is_empty()
                {
                    println!("{}", thought.trim().dimmed().italic());
                }
                if !text.content.trim().is_empty() {
                    println!("{}", text.content.trim());
                }
                if text.aborted {
                    println!("{}", "(aborted)".yellow());
                }
            }
            AgentMessage::Text(_) => {}
            AgentMessage::Tool(tool) => {
                let name = tool.invocation.name.as_str();
                match tool.state {
                    ToolState::PendingApproval => {
                        println!("{} {}", "tool call:".yellow().bold(), name);
                        for (param, value) in &tool.invocation.params {
                            println!("  {param}: {value}");
                        }
                    }
                    ToolState::Completed => {
                        let result = tool.formatted_result.as_deref().unwrap_or_default();
                        println!("{} {}\n{}", "✓".green(), name, result.trim());
                    }
                    ToolState::Failed => {
                        let result = tool.formatted_result.as_deref().unwrap_or_default();
                        println!("{} {} {}", "✗".red(), name, result.trim());
                    }
                    ToolState::Rejected => {
                        println!("{} {} rejected", "✗".yellow(), name);
                    }
                    ToolState::BadInput | ToolState::PendingResponse => {}
                }
            }
            AgentMessage::Event { event } => {
                let note = match event {
                    EventKind::MaxStepsReached => "step limit reached",
                    EventKind::MaxRetriesReached => "retry limit reached",
                    EventKind::ApiError => "API error, response discarded",
                    EventKind::Abort => "aborted",
                };
                println!("{}", format!("[{note}]").yellow());
            }
        }
    }
    messages.len()
}
