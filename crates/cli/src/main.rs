use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use breachkit_engine::{AutomationEngine, CommandExecutor, DocumentFormat, EchoExecutor, UnlockedCommands, parse_script_file};
use breachkit_types::{ExecutionEvent, ExecutionStatus, GameState};
use breachkit_util::{EngineSettings, redact_sensitive, shell_lexing::split_assignment};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{Level, info, warn};

mod process;

use process::ProcessExecutor;

#[derive(Debug, Parser)]
#[command(name = "breachkit", version, about = "Run breachkit automation scripts and macros")]
struct Cli {
    /// Settings file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import, run, validate and export scripts
    #[command(subcommand)]
    Script(ScriptCommand),
    /// List and invoke macros
    #[command(subcommand)]
    Macro(MacroCommand),
}

#[derive(Debug, Subcommand)]
enum ScriptCommand {
    /// Run a script file
    Run {
        file: PathBuf,
        /// Variable override as `name=value`; values are read as JSON when possible
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
        /// Echo commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Check a script file against a game state
    Validate {
        file: PathBuf,
        #[command(flatten)]
        state: GameStateArgs,
    },
    /// Re-render a script file in the interchange format
    Export {
        file: PathBuf,
        /// Output format; defaults to the `--output` extension, else YAML
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Write to this file instead of stdout
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum MacroCommand {
    /// List bundled macros
    List,
    /// Invoke a macro, e.g. `intrude target=10.0.0.5`
    Run {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        invocation: Vec<String>,
        /// Echo commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Args)]
struct GameStateArgs {
    /// JSON file with `unlocked_commands` and `inventory` arrays
    #[arg(long, value_name = "PATH")]
    game_state: Option<PathBuf>,
    /// Unlocked command tokens
    #[arg(long, value_delimiter = ',')]
    unlocked: Vec<String>,
    /// Owned hardware or software items
    #[arg(long, value_delimiter = ',')]
    inventory: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

impl From<OutputFormat> for DocumentFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => DocumentFormat::Json,
            OutputFormat::Yaml => DocumentFormat::Yaml,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    }
    .context("failed to load settings")?;
    let engine = AutomationEngine::with_default_macros(settings);

    match cli.command {
        Commands::Script(command) => run_script_command(&engine, command).await,
        Commands::Macro(command) => run_macro_command(&engine, command).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn executor(dry_run: bool) -> Arc<dyn CommandExecutor> {
    if dry_run { Arc::new(EchoExecutor) } else { Arc::new(ProcessExecutor::default()) }
}

async fn run_script_command(engine: &AutomationEngine, command: ScriptCommand) -> Result<()> {
    match command {
        ScriptCommand::Run { file, vars, dry_run } => {
            let script_id = import_file(engine, &file).await?;
            let overrides = parse_overrides(&vars)?;
            run_script(engine, &script_id, overrides, executor(dry_run)).await
        }
        ScriptCommand::Validate { file, state } => {
            let script_id = import_file(engine, &file).await?;
            let game_state = load_game_state(&state)?;
            let problems = engine.validate_script(&script_id, &game_state, &UnlockedCommands).await?;
            if problems.is_empty() {
                println!("{}: compatible", file.display());
                return Ok(());
            }
            for problem in &problems {
                println!("{problem}");
            }
            bail!("{} compatibility problem(s) found", problems.len())
        }
        ScriptCommand::Export { file, format, output } => {
            let script_id = import_file(engine, &file).await?;
            let format = export_format(format, output.as_deref());
            let rendered = engine.export_script(&script_id, format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "script exported");
                }
                None => println!("{rendered}"),
            }
            Ok(())
        }
    }
}

/// An explicit `--format` wins; otherwise the output extension decides.
fn export_format(format: Option<OutputFormat>, output: Option<&Path>) -> DocumentFormat {
    match (format, output) {
        (Some(format), _) => format.into(),
        (None, Some(path)) => DocumentFormat::from_path(path),
        (None, None) => DocumentFormat::Yaml,
    }
}

async fn run_macro_command(engine: &AutomationEngine, command: MacroCommand) -> Result<()> {
    match command {
        MacroCommand::List => {
            for definition in engine.macros().list().await {
                let parameters: Vec<String> = definition
                    .parameters
                    .iter()
                    .map(|parameter| {
                        let marker = if parameter.required { "" } else { "?" };
                        format!("{}{marker}:{}", parameter.name, parameter.r#type.as_str())
                    })
                    .collect();
                println!("{:<14} {:<40} {}", definition.alias, parameters.join(" "), definition.description);
            }
            Ok(())
        }
        MacroCommand::Run { invocation, dry_run } => {
            let input = invocation.join(" ");
            let executor = executor(dry_run);
            let outcome = engine.invoke_macro_text(&input, executor.as_ref()).await?;
            for result in &outcome.results {
                println!("$ {}", redact_sensitive(&result.command));
                if !result.output.is_empty() {
                    println!("{}", result.output);
                }
            }
            match outcome.error {
                Some(error) => Err(anyhow!(error)),
                None => Ok(()),
            }
        }
    }
}

async fn import_file(engine: &AutomationEngine, file: &Path) -> Result<String> {
    let document = parse_script_file(file)?;
    let script = engine
        .register_document(document)
        .await
        .with_context(|| format!("Invalid script file: {}", file.display()))?;
    Ok(script.id)
}

async fn run_script(
    engine: &AutomationEngine,
    script_id: &str,
    overrides: IndexMap<String, Value>,
    executor: Arc<dyn CommandExecutor>,
) -> Result<()> {
    let (events_tx, mut events_rx) = unbounded_channel();
    let handle = engine.spawn_script(script_id, overrides, executor, Some(events_tx)).await?;
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(&event);
        }
    });

    let mut task = handle.task;
    let execution = tokio::select! {
        joined = &mut task => joined.context("script task failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!(execution_id = %handle.execution_id, "interrupt received; cancelling");
            engine.cancel(&handle.execution_id).await?;
            task.await.context("script task failed")?
        }
    };
    let _ = printer.await;

    info!(execution_id = %execution.id, status = execution.status.as_str(), steps = execution.output_log.len(), "run finished");
    match execution.status {
        ExecutionStatus::Completed => Ok(()),
        status => {
            for error in &execution.errors {
                eprintln!("{error}");
            }
            bail!("script {}", status.as_str())
        }
    }
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::StepStarted { step_id, attempt, command, .. } => {
            println!("[{step_id}#{attempt}] $ {}", redact_sensitive(command));
        }
        ExecutionEvent::StepFinished { output, .. } => {
            if !output.output.is_empty() {
                println!("{}", output.output);
            }
            let verdict = if output.success { "ok" } else { "failed" };
            println!("[{}] {verdict} in {}ms", output.step_id, output.execution_time_ms);
        }
        ExecutionEvent::StepRetrying { step_id, retries_left, .. } => {
            println!("[{step_id}] retrying ({retries_left} left)");
        }
        ExecutionEvent::RunStarted { .. } | ExecutionEvent::RunCompleted { .. } => {}
    }
}

/// Parses `name=value` overrides. Values that are valid JSON keep their
/// type; anything else is a string.
fn parse_overrides(vars: &[String]) -> Result<IndexMap<String, Value>> {
    vars.iter()
        .map(|var| {
            let (name, raw) = split_assignment(var).with_context(|| format!("expected NAME=VALUE, got '{var}'"))?;
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((name.to_string(), value))
        })
        .collect()
}

fn load_game_state(args: &GameStateArgs) -> Result<GameState> {
    let state = match &args.game_state {
        Some(path) => {
            let content =
                std::fs::read_to_string(path).with_context(|| format!("Failed to read game state: {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("Invalid game state: {}", path.display()))?
        }
        None => GameState::default(),
    };
    Ok(state
        .with_unlocked(args.unlocked.iter().cloned())
        .with_inventory(args.inventory.iter().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_keep_json_types() {
        let vars = vec!["port=22".to_string(), "target=10.0.0.5".to_string(), "open=true".to_string()];
        let overrides = parse_overrides(&vars).unwrap();
        assert_eq!(overrides["port"], Value::from(22));
        assert_eq!(overrides["target"], Value::from("10.0.0.5"));
        assert_eq!(overrides["open"], Value::Bool(true));
        assert!(parse_overrides(&["nope".to_string()]).is_err());
    }

    #[test]
    fn game_state_merges_file_and_flags() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, r#"{"unlocked_commands": ["ping"], "inventory": ["esp32_dev"]}"#).unwrap();

        let state = load_game_state(&GameStateArgs {
            game_state: Some(path),
            unlocked: vec!["nmap".into()],
            inventory: Vec::new(),
        })
        .unwrap();
        assert!(state.unlocked_commands.contains("ping"));
        assert!(state.unlocked_commands.contains("nmap"));
        assert!(state.has_item("esp32_dev"));
    }

    #[test]
    fn export_format_prefers_flag_then_extension() {
        assert_eq!(export_format(None, None), DocumentFormat::Yaml);
        assert_eq!(export_format(None, Some(Path::new("out/probe.json"))), DocumentFormat::Json);
        assert_eq!(export_format(None, Some(Path::new("out/probe.yml"))), DocumentFormat::Yaml);
        assert_eq!(
            export_format(Some(OutputFormat::Yaml), Some(Path::new("out/probe.json"))),
            DocumentFormat::Yaml
        );
    }

    #[tokio::test]
    async fn export_writes_file_in_extension_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("probe.yaml");
        let target = temp_dir.path().join("probe.json");
        std::fs::write(&source, "name: probe\nsteps:\n  - command: ping 10.0.0.5\n").unwrap();

        let engine = AutomationEngine::default();
        run_script_command(
            &engine,
            ScriptCommand::Export {
                file: source,
                format: None,
                output: Some(target.clone()),
            },
        )
        .await
        .unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(written["name"], Value::from("probe"));
        assert_eq!(written["steps"][0]["command"], Value::from("ping 10.0.0.5"));
    }

    #[tokio::test]
    async fn dry_run_macro_echoes_commands() {
        let engine = AutomationEngine::with_default_macros(EngineSettings::default());
        let outcome = engine
            .invoke_macro_text("recon target=10.0.0.5", executor(true).as_ref())
            .await
            .unwrap();
        assert_eq!(outcome.lines(), vec!["ping 10.0.0.5", "nmap -sV 10.0.0.5", "whois 10.0.0.5"]);
    }
}
