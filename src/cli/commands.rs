//! CLI command definitions for gradeforge.
//!
//! Direct commands (`transform`, `score`, `full`) run stages in the
//! foreground through the pipeline facade. `submit` goes through the job
//! registry and scheduler exactly as a service would, and reports the final
//! job snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineConfig, StageOptions, StageResult};
use crate::scheduler::{
    JobRegistry, JobSnapshot, JobStatus, JobType, Scheduler, SchedulerConfig, Submission,
};

/// Document OCR correction and rubric grading.
#[derive(Parser)]
#[command(name = "gradeforge")]
#[command(about = "Correct scanned essays and grade them against a rubric")]
#[command(version)]
#[command(
    long_about = "gradeforge runs essays through a transform stage (OCR text correction) and a score stage (rubric grading with two graders and a moderator).\n\nConfiguration is read from the environment and an optional .env file (XAI_API_KEY, GRADEFORGE_*).\n\nExample usage:\n  gradeforge full --input ./scans --rubric ./rubric.json --name"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// API key for the model endpoint. Overrides XAI_API_KEY.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Root directory for job workspaces. Overrides GRADEFORGE_JOBS_ROOT.
    #[arg(long, global = true)]
    pub jobs_root: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Correct OCR text for every document in a folder.
    #[command(alias = "process")]
    Transform(TransformArgs),

    /// Grade every document in a folder against a rubric.
    #[command(alias = "grade")]
    Score(ScoreArgs),

    /// Transform a folder into a fresh workspace, then grade the result.
    Full(FullArgs),

    /// Create a job, run it on the worker pool and print its snapshot.
    Submit(SubmitArgs),
}

/// Arguments for `gradeforge transform`.
#[derive(Parser, Debug)]
pub struct TransformArgs {
    /// Folder with the documents to correct.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output folder (default: GRADEFORGE_TRANSFORMED_DIR or ./essays_to_grade).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Name outputs after the "Name:" line found in each document.
    #[arg(long)]
    pub name: bool,
}

/// Arguments for `gradeforge score`.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// Folder with the documents to grade.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Rubric file (.json, .txt or .md).
    #[arg(short, long)]
    pub rubric: PathBuf,

    /// Output folder (default: GRADEFORGE_SCORED_DIR or ./graded_essays).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `gradeforge full`.
#[derive(Parser, Debug)]
pub struct FullArgs {
    /// Folder with the documents to correct and grade.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Rubric file (.json, .txt or .md).
    #[arg(short, long)]
    pub rubric: PathBuf,

    /// Name outputs after the "Name:" line found in each document.
    #[arg(long)]
    pub name: bool,
}

/// Arguments for `gradeforge submit`.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Job type: transform, score or full.
    #[arg(short = 't', long = "type")]
    pub job_type: JobType,

    /// Folder whose files are copied into the job workspace.
    #[arg(short, long, required_unless_present = "file")]
    pub input: Option<PathBuf>,

    /// Individual file to upload into the job workspace (repeatable).
    #[arg(short, long)]
    pub file: Vec<PathBuf>,

    /// Rubric file, required for score and full jobs.
    #[arg(short, long)]
    pub rubric: Option<PathBuf>,

    /// Name outputs after the "Name:" line found in each document.
    #[arg(long)]
    pub name: bool,

    /// Worker pool size (default: GRADEFORGE_MAX_WORKERS or 2).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Interval between status checks, in milliseconds.
    #[arg(long, default_value = "500")]
    pub poll_ms: u64,

    /// Print the job snapshot as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments without executing.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env().context("Failed to load configuration")?;
    if let Some(api_key) = cli.api_key {
        config = config.with_api_key(api_key);
    }
    if let Some(jobs_root) = cli.jobs_root {
        config = config.with_jobs_root(jobs_root);
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Transform(args) => run_transform_command(config, args).await,
        Commands::Score(args) => run_score_command(config, args).await,
        Commands::Full(args) => run_full_command(config, args).await,
        Commands::Submit(args) => run_submit_command(config, args).await,
    }
}

fn build_pipeline(config: PipelineConfig) -> anyhow::Result<Pipeline> {
    Pipeline::from_config(config).context("Failed to initialize the LLM client")
}

async fn run_transform_command(config: PipelineConfig, args: TransformArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let options = StageOptions::new().with_name_from_header(args.name);
    let outcome = pipeline
        .run_transform(&args.input, args.output.as_deref(), &options)
        .await;
    report_stage("transform", outcome)
}

async fn run_score_command(config: PipelineConfig, args: ScoreArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let outcome = pipeline
        .run_score(&args.input, args.output.as_deref(), &args.rubric)
        .await;
    report_stage("score", outcome)
}

async fn run_full_command(config: PipelineConfig, args: FullArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    let options = StageOptions::new().with_name_from_header(args.name);
    let run = pipeline.run_full(&args.input, &args.rubric, &options).await?;

    println!("Workspace: {}", run.paths.root.display());
    report_stage("transform", run.transform)?;
    match run.score {
        Some(outcome) => report_stage("score", outcome),
        None => anyhow::bail!("score stage was not run"),
    }
}

/// Prints a stage's captured text and output files, or turns its failure
/// into an error after printing whatever it captured.
fn report_stage(stage: &str, outcome: Result<StageResult, PipelineError>) -> anyhow::Result<()> {
    match outcome {
        Ok(result) => {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            println!("\n{} stage produced {} file(s):", stage, result.output_files.len());
            for path in &result.output_files {
                println!("  {}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            if let Some(output) = e.captured_output() {
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
            }
            Err(anyhow::Error::new(e).context(format!("{} stage failed", stage)))
        }
    }
}

async fn run_submit_command(config: PipelineConfig, args: SubmitArgs) -> anyhow::Result<()> {
    if args.job_type.requires_rubric() && args.rubric.is_none() {
        anyhow::bail!("--rubric is required for {} jobs", args.job_type);
    }

    let num_workers = args.workers.unwrap_or(config.max_workers);
    let pipeline = Arc::new(build_pipeline(config)?);
    let registry = Arc::new(JobRegistry::new(pipeline.allocator().clone()));
    let scheduler = Scheduler::start(
        SchedulerConfig::new(num_workers),
        Arc::clone(&registry),
        Arc::clone(&pipeline),
    );

    let job = registry.create_job(args.job_type).await?;
    let paths = &job.paths;
    // Score-only jobs read already transformed documents.
    let inbox = if args.job_type == JobType::Score {
        &paths.transformed
    } else {
        &paths.raw
    };

    let mut stored = Vec::new();
    if let Some(input) = &args.input {
        stored.extend(
            paths
                .import_dir(input, inbox)
                .await
                .with_context(|| format!("Failed to import {}", input.display()))?,
        );
    }
    if !args.file.is_empty() {
        let mut uploads = Vec::with_capacity(args.file.len());
        for file in &args.file {
            let data = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            uploads.push((file.to_string_lossy().into_owned(), data));
        }
        stored.extend(paths.store_files(inbox, &uploads).await?);
    }
    info!(job_id = %job.id, files = stored.len(), "Inputs stored");

    let mut submission = Submission::new(job.id)
        .with_options(StageOptions::new().with_name_from_header(args.name));
    if let Some(rubric) = &args.rubric {
        let data = tokio::fs::read(rubric)
            .await
            .with_context(|| format!("Rubric file not found: {}", rubric.display()))?;
        let name = rubric
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        submission = submission.with_rubric(paths.store_rubric(&name, &data).await?);
    }

    scheduler.submit(submission)?;
    let snapshot = wait_for_terminal(
        &registry,
        &scheduler,
        &job,
        Duration::from_millis(args.poll_ms),
    )
    .await?;
    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    let stats = scheduler.stats();
    info!(
        workers = stats.num_workers,
        completed = stats.completed,
        failed = stats.failed,
        "Worker pool drained"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot, paths).await;
    }

    if snapshot.status == JobStatus::Failed {
        anyhow::bail!(
            "Job {} failed: {}",
            snapshot.id,
            snapshot.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn wait_for_terminal(
    registry: &JobRegistry,
    scheduler: &Scheduler,
    job: &crate::scheduler::JobRecord,
    poll_interval: Duration,
) -> anyhow::Result<JobSnapshot> {
    loop {
        let snapshot = registry
            .snapshot(&job.id)
            .with_context(|| format!("Job {} disappeared", job.id))?;
        if snapshot.status.is_terminal() {
            return Ok(snapshot);
        }
        let stats = scheduler.stats();
        debug!(
            job_id = %job.id,
            status = %snapshot.status,
            queued = stats.queued,
            running = stats.running,
            "Waiting for job"
        );
        tokio::time::sleep(poll_interval).await;
    }
}

async fn print_snapshot(snapshot: &JobSnapshot, paths: &crate::workspace::JobPaths) {
    println!("Job:     {}", snapshot.id);
    println!("Type:    {}", snapshot.job_type);
    println!("Status:  {}", snapshot.status);
    if let Some(error) = &snapshot.error {
        println!("Error:   {}", error);
    }
    for stage in &snapshot.stages {
        println!("\n=== {} ({}) ===", stage.name, stage.status);
        print!("{}", stage.stdout);
        eprint!("{}", stage.stderr);
        for file in &stage.output_files {
            println!("  {}", display_artifact(paths, file).await);
        }
    }
}

/// Absolute location of a stage output, falling back to the stored path.
async fn display_artifact(paths: &crate::workspace::JobPaths, file: &Path) -> String {
    match paths.resolve_artifact(&file.to_string_lossy()).await {
        Ok(path) => path.display().to_string(),
        Err(_) => file.display().to_string(),
    }
}
