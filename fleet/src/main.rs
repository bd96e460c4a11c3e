//! Multi-agent coding tournament CLI.
//!
//! `fleet plan` asks the model for an evaluation plan; `fleet run` plans (or
//! loads a reviewed plan), runs every approach in its own worktree, ranks the
//! results, and optionally publishes the winner as a pull request.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fleet::agent::AgentServices;
use fleet::console::ConsoleObserver;
use fleet::core::types::{Iteration, RunMode};
use fleet::exit_codes;
use fleet::io::artifacts::{save_winner, write_tournament_summary};
use fleet::io::config::{DEFAULT_CONFIG_FILE, FleetConfig, Settings, load_config, write_config};
use fleet::io::evaluator::ProcessEvaluator;
use fleet::io::generator::{AnthropicGenerator, GenerationLimits};
use fleet::io::git::{GitGateway, PullRequestOutcome, resolve_repo};
use fleet::io::parser::FencedResponseParser;
use fleet::io::plan_store::{load_plan, save_plan};
use fleet::io::prompt::PromptEngine;
use fleet::logging;
use fleet::planner::generate_plan;
use fleet::publish::publish_winner;
use fleet::report::{render_plan, render_progress, render_results};
use fleet::tournament::{Tournament, TournamentRequest};

#[derive(Parser)]
#[command(
    name = "fleet",
    version,
    about = "Run competing agent approaches against one evaluator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Generate an evaluation plan and save it for review.
    Plan {
        #[command(flatten)]
        common: CommonArgs,
        /// Where to write the plan.
        #[arg(long, default_value = "plan.json")]
        out: PathBuf,
    },
    /// Run a tournament and rank the approaches.
    Run(RunArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Programming task description.
    task: String,
    /// Approaches to compare.
    #[arg(required = true, num_args = 1..)]
    approaches: Vec<String>,
    /// Config file; defaults apply when it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Local repository path or git URL the agents branch from.
    #[arg(long)]
    repo: String,
    /// Use a saved plan instead of generating one.
    #[arg(long)]
    plan: Option<PathBuf>,
    /// Pause at blocking decisions.
    #[arg(long)]
    interactive: bool,
    /// Skip the plan confirmation.
    #[arg(long)]
    yes: bool,
    /// Iteration budget per agent.
    #[arg(long = "max-iter")]
    max_iter: Option<u32>,
    /// Parent directory for agent workspaces.
    #[arg(long = "work-dir")]
    work_dir: Option<PathBuf>,
    /// Where to save the winner's code.
    #[arg(long, default_value = "winner.py")]
    output: PathBuf,
    /// Push the winner's branch and open a pull request.
    #[arg(long)]
    publish: bool,
    /// Base branch for the pull request.
    #[arg(long, default_value = "main")]
    base: String,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let outcome = runtime.block_on(async {
        tokio::select! {
            result = dispatch(cli.command) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nInterrupted by user");
                Ok(exit_codes::INTERRUPTED)
            }
        }
    });
    // A prompt may still be blocked reading stdin; do not wait for it.
    runtime.shutdown_background();
    outcome
}

async fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Plan { common, out } => cmd_plan(common, &out).await,
        Command::Run(args) => cmd_run(args).await,
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &FleetConfig::default())?;
    println!("Wrote {}", path.display());
    Ok(exit_codes::OK)
}

/// Load config, check the approach count, and resolve environment overrides.
fn prepare(common: &CommonArgs) -> Result<Settings> {
    let config = load_config(&common.config)?;
    let (min, max) = (
        config.tournament.min_approaches,
        config.tournament.max_approaches,
    );
    let count = common.approaches.len();
    if count < min {
        bail!("tournament requires at least {min} approaches, got {count}");
    }
    if count > max {
        bail!("tournament supports at most {max} approaches, got {count}");
    }
    Settings::resolve(config, |key| std::env::var(key).ok())
}

fn build_services(settings: &Settings) -> Result<AgentServices> {
    let config = &settings.config;
    let credentials = settings.require_credentials()?.clone();
    let generator = AnthropicGenerator::new(&config.generator, credentials)?;
    Ok(AgentServices {
        generator: Arc::new(generator),
        parser: Arc::new(FencedResponseParser::new(config.evaluator.language.clone())),
        evaluator: Arc::new(ProcessEvaluator::new(&config.evaluator)),
        vcs: Arc::new(GitGateway::default()),
        prompts: Arc::new(PromptEngine::new()),
        limits: GenerationLimits::from(&config.generator),
        language: config.evaluator.language.clone(),
    })
}

async fn cmd_plan(common: CommonArgs, out: &Path) -> Result<i32> {
    let settings = prepare(&common)?;
    let services = build_services(&settings)?;
    eprintln!("Generating evaluation plan...");
    let plan = generate_plan(
        services.generator.as_ref(),
        services.limits,
        &services.prompts,
        &common.task,
        &common.approaches,
    )
    .await?;
    println!("{}", render_plan(&plan));
    save_plan(out, &plan)?;
    println!("Plan written to {}", out.display());
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> Result<i32> {
    let settings = prepare(&args.common)?;
    let services = build_services(&settings)?;
    let tournament_config = &settings.config.tournament;
    let work_base = args
        .work_dir
        .clone()
        .unwrap_or_else(|| tournament_config.work_dir.clone());
    let source_repo = resolve_repo(&args.repo, &work_base).await?;

    let plan = match &args.plan {
        Some(path) => load_plan(path)?,
        None => {
            eprintln!("Generating evaluation plan...");
            generate_plan(
                services.generator.as_ref(),
                services.limits,
                &services.prompts,
                &args.common.task,
                &args.common.approaches,
            )
            .await?
        }
    };
    println!("{}", render_plan(&plan));
    if !args.yes && !confirm("Proceed with this plan? [Y/n] ").await? {
        println!("Tournament cancelled");
        return Ok(exit_codes::OK);
    }

    let mode = if args.interactive {
        RunMode::Interactive
    } else {
        RunMode::Speculative
    };
    let mut tournament = Tournament::new(services.clone()).with_progress(Arc::new(
        |approach: &str, iteration: &Iteration| {
            println!("{}", render_progress(approach, iteration));
        },
    ));
    if mode == RunMode::Interactive {
        tournament = tournament.with_observer(Arc::new(ConsoleObserver::new()));
    }
    let request = TournamentRequest {
        approaches: args.common.approaches.clone(),
        max_iterations: args.max_iter.unwrap_or(tournament_config.max_iterations),
        mode,
        work_base: work_base.clone(),
        source_repo,
        deadline: tournament_config.deadline_secs.map(Duration::from_secs),
    };
    println!("Starting tournament ({mode} mode)...");
    let result = tournament.run(Arc::new(plan), request).await?;

    println!("\n{}", render_results(&result));
    let summary = write_tournament_summary(&work_base, &result)?;
    println!("Summary written to {}", summary.display());

    let Some(winner) = result.winner() else {
        return Ok(exit_codes::OK);
    };
    if !winner.final_code.is_empty() {
        save_winner(&args.output, winner)?;
        println!("Winner's code saved to {}", args.output.display());
    }
    if args.publish {
        let outcome = publish_winner(
            services.vcs.as_ref(),
            winner,
            result.plan(),
            &args.base,
            &work_base,
        )
        .await?;
        match outcome {
            PullRequestOutcome::Created { url } => println!("Pull request: {url}"),
            PullRequestOutcome::Manual { instructions } => println!("{instructions}"),
        }
    }
    Ok(exit_codes::OK)
}

/// Yes/no question on the terminal; empty input means yes.
async fn confirm(question: &'static str) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(question.as_bytes())?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("prompt task failed")?
    .context("read answer")?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}
