mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use apex_engine::descriptor;
use apex_engine::{
    validate_graph, CheckpointDecision, EventError, EventSink, ExecutionEngine, ExecutionSeed, ExecutionStatus, NodeStatus,
    ValidationReport, WorkflowDefinition, WorkflowEvent, WorkflowGraph,
};
use apex_nodes::{builtin_registry, delegate, HttpAiDelegate, NodeServices};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use config::{AppConfig, API_KEY_ENV, CONFIG_ENV};

const REVIEWER: &str = "apex-cli";

#[derive(Parser)]
#[command(name = "apex", version, about = "Validate and run claims workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow file for structural problems
    Validate {
        /// Workflow definition (or bare graph) JSON
        file: PathBuf,
    },
    /// Execute a workflow and print its audit trail
    Run {
        /// Workflow definition (or bare graph) JSON
        file: PathBuf,
        #[arg(long)]
        claim_id: Option<String>,
        #[arg(long)]
        member_id: Option<String>,
        /// Approve every review checkpoint as it opens
        #[arg(long, conflicts_with = "reject_all")]
        approve_all: bool,
        /// Reject every review checkpoint as it opens
        #[arg(long)]
        reject_all: bool,
        /// Reason recorded on auto-resolved checkpoints
        #[arg(long, default_value = "Resolved from command line")]
        reason: String,
        /// Context variable, KEY=VALUE (VALUE parsed as JSON when possible)
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        vars: Vec<(String, Value)>,
    },
    /// List every node type
    Catalog,
    /// Draft a workflow from a description using the AI delegate
    Generate {
        #[arg(trailing_var_arg = true, required = true)]
        description: Vec<String>,
    },
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("empty variable name".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Writes engine events to the log
struct ConsoleEventSink;

impl EventSink for ConsoleEventSink {
    fn send(&self, event: WorkflowEvent) -> std::result::Result<(), EventError> {
        match &event {
            WorkflowEvent::ExecutionStarted {
                execution_id,
                trigger_count,
            } => log::info!("Execution {} started from {} trigger(s)", execution_id, trigger_count),
            WorkflowEvent::ExecutionStatusChanged { status, .. } => log::info!("Execution status: {:?}", status),
            WorkflowEvent::NodeStatusChanged { node_id, status, .. } => {
                log::debug!("Node {} -> {:?}", node_id, status)
            }
            WorkflowEvent::LogAppended { entry } => match &entry.error {
                Some(error) => log::warn!("{} failed: {}", entry.node_name, error),
                None => log::info!("{} -> {:?} ({} ms)", entry.node_name, entry.status, entry.duration_ms),
            },
            WorkflowEvent::CheckpointCreated { checkpoint } => log::info!(
                "Review required at {} (checkpoint {}, due {})",
                checkpoint.node_name,
                checkpoint.id,
                checkpoint.due_at
            ),
            WorkflowEvent::CheckpointResolved { checkpoint } => {
                log::info!("Checkpoint {} resolved: {:?}", checkpoint.id, checkpoint.decision)
            }
            WorkflowEvent::CheckpointEscalated { checkpoint } => log::warn!("Checkpoint {} escalated", checkpoint.id),
            WorkflowEvent::EdgesAnimated { .. } => {}
        }
        Ok(())
    }
}

async fn read_workflow(path: &Path) -> Result<WorkflowDefinition> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    if let Ok(definition) = serde_json::from_str::<WorkflowDefinition>(&contents) {
        return Ok(definition);
    }
    let graph: WorkflowGraph =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string());
    Ok(WorkflowDefinition::new(name, "").with_graph(graph))
}

fn print_report(report: &ValidationReport) {
    for finding in &report.findings {
        match &finding.node_id {
            Some(node_id) => eprintln!("{} (node {})", finding, node_id),
            None => eprintln!("{}", finding),
        }
    }
}

fn services(config: &AppConfig) -> Result<NodeServices> {
    if !config.delegate.is_configured() {
        log::info!("No AI API key configured; using rule-based evaluation");
        return Ok(NodeServices::rules());
    }
    let delegate = HttpAiDelegate::new(config.delegate.clone())?;
    Ok(NodeServices::with_delegate(Arc::new(delegate)))
}

fn wire_label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

async fn validate_cmd(file: &Path) -> Result<ExitCode> {
    let workflow = read_workflow(file).await?;
    let report = validate_graph(&workflow.graph);
    print_report(&report);

    let errors = report.errors().len();
    println!(
        "{}: {} node(s), {} error(s), {} warning(s)",
        workflow.name,
        workflow.graph.nodes.len(),
        errors,
        report.warnings().len()
    );
    Ok(if errors == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

struct RunOptions {
    claim_id: Option<String>,
    member_id: Option<String>,
    decision: Option<CheckpointDecision>,
    reason: String,
    vars: Vec<(String, Value)>,
}

async fn run_cmd(config: AppConfig, file: &Path, options: RunOptions) -> Result<ExitCode> {
    let workflow = read_workflow(file).await?;
    let report = validate_graph(&workflow.graph);
    if !report.is_valid() {
        print_report(&report);
        bail!("{} has validation errors", workflow.name);
    }

    let mut seed = ExecutionSeed::new();
    if let Some(claim_id) = options.claim_id {
        seed = seed.claim(claim_id);
    }
    if let Some(member_id) = options.member_id {
        seed = seed.member(member_id);
    }
    for (key, value) in options.vars {
        seed = seed.var(key, value);
    }

    let registry = builtin_registry(&services(&config)?);
    let mut engine = ExecutionEngine::new(Arc::new(registry))
        .with_config(config.engine)
        .with_event_sink(Arc::new(ConsoleEventSink));

    log::info!("Running '{}' (version {})", workflow.name, workflow.version);
    let mut summary = engine.start_execution(workflow.graph, seed).await?;

    if let Some(decision) = options.decision {
        while summary.status == ExecutionStatus::WaitingHitl {
            let Some(checkpoint_id) = engine.pending_checkpoints().first().map(|c| c.id.clone()) else {
                break;
            };
            summary = engine
                .resolve_checkpoint_by(
                    &checkpoint_id,
                    decision,
                    Some(options.reason.clone()),
                    Some(REVIEWER.to_string()),
                )
                .await?;
        }
    }

    let failed: Vec<&str> = engine
        .graph()
        .nodes
        .iter()
        .filter(|n| n.data.status == NodeStatus::Error)
        .map(|n| n.id.as_str())
        .collect();
    if !failed.is_empty() {
        log::warn!("Failed nodes: {}", failed.join(", "));
    }

    let trail = json!({
        "summary": summary,
        "logs": engine.logs(),
        "checkpoints": engine.checkpoints().all(),
        "context": engine.context().snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&trail)?);

    Ok(match summary.status {
        ExecutionStatus::Error | ExecutionStatus::Stopped => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn catalog_cmd() -> ExitCode {
    for meta in descriptor::catalog() {
        let handles = meta.output_handles();
        let routing = if handles.is_empty() {
            String::new()
        } else {
            format!(" [{}]", handles.join("|"))
        };
        println!(
            "{:<10} {:<18} {}{} - {}",
            wire_label(&meta.category),
            meta.node_type,
            meta.label,
            routing,
            meta.description
        );
    }
    ExitCode::SUCCESS
}

async fn generate_cmd(config: AppConfig, description: &str) -> Result<ExitCode> {
    if !config.delegate.is_configured() {
        bail!("generating a workflow needs an AI API key (set {} or delegate.apiKey)", API_KEY_ENV);
    }
    let model = HttpAiDelegate::new(config.delegate)?;
    let generated = delegate::generate_workflow(&model, description).await?;
    let definition = generated.into_definition();

    let report = validate_graph(&definition.graph);
    print_report(&report);
    println!("{}", serde_json::to_string_pretty(&definition)?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())
        .await?
        .with_api_key(std::env::var(API_KEY_ENV).ok());

    match cli.command {
        Commands::Validate { file } => validate_cmd(&file).await,
        Commands::Run {
            file,
            claim_id,
            member_id,
            approve_all,
            reject_all,
            reason,
            vars,
        } => {
            let decision = match (approve_all, reject_all) {
                (true, _) => Some(CheckpointDecision::Approve),
                (_, true) => Some(CheckpointDecision::Reject),
                _ => None,
            };
            let options = RunOptions {
                claim_id,
                member_id,
                decision,
                reason,
                vars,
            };
            run_cmd(config, &file, options).await
        }
        Commands::Catalog => Ok(catalog_cmd()),
        Commands::Generate { description } => generate_cmd(config, &description.join(" ")).await,
    }
}
