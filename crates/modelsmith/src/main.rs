//! Command-line entry point for modelsmith.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::{debug, info};
use modelsmith::{init_logging, read_source, render_outcome, render_violations};
use modelsmith_config::ModelsmithConfig;
use modelsmith_core::{GeminiGenerator, Modeler, PromptBuilder, strip_code_fence};
use modelsmith_protocol::CodeGenerator;
use modelsmith_sandbox::{CodeSandbox, MemoryHost};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Command-line options.
#[derive(Parser)]
#[command(name = "modelsmith", version, about = "Sandboxed natural-language CAD modeling")]
struct Cli {
    /// Optional path to a modelsmith.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report every policy rule a script violates
    Check {
        /// Script path, or `-` for stdin
        file: PathBuf,
    },
    /// Check a script and run it against the in-memory host
    Run {
        /// Script path, or `-` for stdin
        file: PathBuf,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a script from a modeling request
    Generate {
        /// Natural-language modeling request
        prompt: String,
        /// Check and run the generated script against the in-memory host
        #[arg(long)]
        run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Check { file } => check(&config, &file),
        Command::Run { file, json } => run(&config, &file, json),
        Command::Generate { prompt, run } => generate(&config, &prompt, run).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ModelsmithConfig> {
    if let Some(path) = path {
        return ModelsmithConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    let layered = ModelsmithConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

fn memory_sandbox(config: &ModelsmithConfig) -> anyhow::Result<(CodeSandbox, MemoryHost)> {
    let host = MemoryHost::new();
    let sandbox =
        CodeSandbox::new(Arc::new(host.clone()), config).context("failed to build sandbox")?;
    Ok((sandbox, host))
}

fn check(config: &ModelsmithConfig, file: &Path) -> anyhow::Result<ExitCode> {
    let code = read_source(file).with_context(|| format!("failed to read {}", file.display()))?;
    let (sandbox, _host) = memory_sandbox(config)?;
    let violations = sandbox.violations(&code);
    println!("{}", render_violations(&violations));
    Ok(if violations.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run(config: &ModelsmithConfig, file: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let code = read_source(file).with_context(|| format!("failed to read {}", file.display()))?;
    let (sandbox, host) = memory_sandbox(config)?;
    let outcome = sandbox.check_and_run(&code).context("run rejected")?;
    if json {
        let rendered = serde_json::to_string_pretty(&outcome).context("serialize outcome")?;
        println!("{rendered}");
    } else {
        println!("{}", render_outcome(&outcome, &host));
    }
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn generate(config: &ModelsmithConfig, prompt: &str, run: bool) -> anyhow::Result<ExitCode> {
    if config.generator.provider != "gemini" {
        bail!("unsupported generator provider: {}", config.generator.provider);
    }
    let (sandbox, host) = memory_sandbox(config)?;
    let system_prompt = PromptBuilder::from_sandbox(&sandbox)
        .context("failed to describe capabilities")?
        .with_additional_instructions(config.generator.additional_instructions.as_deref())
        .build();
    let generator = GeminiGenerator::from_env(config.generator.clone(), system_prompt)
        .context("failed to build generator")?;
    info!("generator ready ({})", generator.description());

    if !run {
        let raw = generator.generate(prompt).await.context("generation failed")?;
        println!("{}", strip_code_fence(&raw));
        return Ok(ExitCode::SUCCESS);
    }

    let modeler = Modeler::new(Arc::new(generator), sandbox);
    let report = modeler.submit(prompt).await.context("modeling request failed")?;
    println!("{}\n", report.code);
    println!("{}", render_outcome(&report.outcome, &host));
    println!("{}", report.user_message());
    Ok(if report.outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
