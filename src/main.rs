//! Instinct - Instinct-Based Learning for Claude Code
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use instinct::config::{Config, Paths, Scope};
use instinct::error::exit_codes;
use instinct::hooks::{HookKind, HookRunner};

/// Instinct - Instinct-Based Learning for Claude Code
#[derive(Parser)]
#[command(name = "instinct")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// [Internal] Run a hook (JSON stdin). Called by Claude Code hooks
    Hook {
        /// The hook event type
        #[arg(value_enum)]
        event: HookEvent,
    },

    /// [User] Show all learned instincts grouped by domain
    Status {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// [User] Analyze observations and create/update instincts
    Learn {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Detect patterns without writing records
        #[arg(long)]
        dry_run: bool,
        /// Skip LLM analysis even when an API key is set
        #[arg(long)]
        skip_oracle: bool,
        /// Apply confidence decay to existing records
        #[arg(long)]
        decay: bool,
    },

    /// [User] Suggest and generate artifacts from learned instincts
    Evolve {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Write the suggested artifacts instead of only listing them
        #[arg(long)]
        apply: bool,
        /// Record selection, e.g. "1,3" or "all"
        #[arg(long)]
        select: Option<String>,
        /// Write artifacts to ~/.claude instead of the project
        #[arg(long)]
        global: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum HookEvent {
    PreToolUse,
    PostToolUse,
    UserMessage,
}

impl From<HookEvent> for HookKind {
    fn from(event: HookEvent) -> Self {
        match event {
            HookEvent::PreToolUse => HookKind::PreToolUse,
            HookEvent::PostToolUse => HookKind::PostToolUse,
            HookEvent::UserMessage => HookKind::UserMessage,
        }
    }
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("instinct error: {}", e);
            ExitCode::from(exit_codes::SUCCESS as u8) // Fail-open
        }
    }
}

/// Set up the global panic handler.
///
/// On panic, logs to .instinct/crash.log and exits with code 3. Crashes
/// must never block the host session (fail-open philosophy).
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("instinct panic: {}", info);

        let crash_log = Paths::resolve().instinct_dir().join("crash.log");
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&crash_log)
        {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let _ = writeln!(file, "[{}] {}", timestamp, info);
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let paths = Paths::resolve();
    let config = Config::load(&paths);

    match cli.command {
        Commands::Hook { event } => run_hook(event.into(), paths, config),
        Commands::Status { json, quiet } => run_status(json, quiet, paths, config),
        Commands::Learn {
            json,
            quiet,
            dry_run,
            skip_oracle,
            decay,
        } => run_learn(json, quiet, dry_run, skip_oracle, decay, paths, config),
        Commands::Evolve {
            json,
            quiet,
            apply,
            select,
            global,
        } => run_evolve(json, quiet, apply, select, global, paths, config),
    }
}

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

fn run_hook(
    kind: HookKind,
    paths: Paths,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let runner = HookRunner::new(paths, config);
    let code = runner.run(kind, &mut std::io::stdin().lock());
    Ok(ExitCode::from(code as u8))
}

fn run_status(
    json: bool,
    quiet: bool,
    paths: Paths,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use instinct::cli::status::{StatusCommand, StatusOptions};

    let cmd = StatusCommand::new(paths, config);
    let options = StatusOptions { json, quiet };

    let output = cmd.run(&options);
    let formatted = cmd.format_output(&output, &options);

    if !formatted.is_empty() {
        println!("{}", formatted);
    }

    Ok(success_to_exit_code(output.success))
}

fn run_learn(
    json: bool,
    quiet: bool,
    dry_run: bool,
    skip_oracle: bool,
    decay: bool,
    paths: Paths,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use instinct::cli::learn::{LearnCommand, LearnOptions};

    let cmd = LearnCommand::new(paths, config);
    let options = LearnOptions {
        json,
        quiet,
        dry_run,
        skip_oracle,
        decay,
    };

    let output = cmd.run(&options);
    let formatted = cmd.format_output(&output, &options);

    if !formatted.is_empty() {
        println!("{}", formatted);
    }

    Ok(success_to_exit_code(output.success))
}

fn run_evolve(
    json: bool,
    quiet: bool,
    apply: bool,
    select: Option<String>,
    global: bool,
    paths: Paths,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use instinct::cli::evolve_cmd::{EvolveCommand, EvolveOptions};

    let scope = if global { Scope::Global } else { Scope::Project };

    let cmd = EvolveCommand::new(paths, config);
    let options = EvolveOptions {
        json,
        quiet,
        apply,
        select,
        scope,
    };

    let output = cmd.run(&options);
    let formatted = cmd.format_output(&output, &options);

    if !formatted.is_empty() {
        println!("{}", formatted);
    }

    Ok(success_to_exit_code(output.success))
}
