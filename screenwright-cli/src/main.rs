//! Command-line front end for screenwright.
//!
//! Usage from the workspace root:
//!   cargo run --bin screenwright -- run                 # full sign-in pipeline
//!   cargo run --bin screenwright -- menu                # single-step stages interactively
//!   cargo run --bin screenwright -- exec daily.json     # run a workflow file
//!   cargo run --bin screenwright -- compile daily.json  # show the compiled program
//!   cargo run --bin screenwright -- capture spin_button # grab a reference image
//!   cargo run --bin screenwright -- notify-test         # check push delivery

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use screenwright::notify::HttpNotifier;
use screenwright::ocr::HttpOcr;
use screenwright::workflow::{compile, Runner, WorkflowFile};
use screenwright::{Region, RunOutcome, Session, SigninConfig, SigninPipeline, Stage};

#[derive(Parser)]
#[command(name = "screenwright")]
#[command(about = "Pixel-level automation for remote web UIs", version)]
struct Cli {
    /// Pipeline configuration file.
    #[arg(long, global = true, default_value = "signin.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full sign-in pipeline start to finish.
    Run,
    /// Interactive menu: run individual pipeline stages by number.
    Menu,
    /// Execute a workflow file.
    Exec {
        /// Workflow JSON document.
        file: PathBuf,
    },
    /// Compile a workflow file and print the program without running it.
    Compile {
        /// Workflow JSON document.
        file: PathBuf,
    },
    /// Capture a square region around the pointer as a reference image.
    Capture {
        /// Image name; saved as images/<name>.png.
        name: String,
        /// Side length of the captured square, in pixels.
        #[arg(long, default_value_t = 100)]
        size: u32,
        /// Countdown before the capture, in seconds.
        #[arg(long, default_value_t = 3)]
        delay: u64,
    },
    /// Send a test notification through the configured push endpoint.
    NotifyTest,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    match cli.command {
        Commands::Run => run_pipeline(config),
        Commands::Menu => run_menu(config),
        Commands::Exec { file } => exec_workflow(config, &file),
        Commands::Compile { file } => compile_workflow(&file),
        Commands::Capture { name, size, delay } => capture_reference(config, &name, size, delay),
        Commands::NotifyTest => notify_test(config),
    }
}

fn load_config(path: &Path) -> SigninConfig {
    match SigninConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "falling back to default configuration");
            SigninConfig::default()
        }
    }
}

/// Builds a desktop session with the OCR and push collaborators the
/// configuration enables.
fn build_session(config: &SigninConfig) -> Result<Session> {
    let mut session = Session::desktop().context("desktop backends unavailable")?;
    if let Some(endpoint) = &config.ocr_endpoint {
        session = session.with_ocr(Arc::new(HttpOcr::new(endpoint.clone())));
    }
    if config.push.enabled {
        session = session.with_notifier(Arc::new(HttpNotifier::new(
            config.push.endpoint.clone(),
            config.push.token.clone(),
        )));
    }
    Ok(session)
}

fn run_pipeline(config: SigninConfig) -> Result<()> {
    let session = build_session(&config)?;
    let mut pipeline = SigninPipeline::new(&session, config);
    match pipeline.run() {
        RunOutcome::Completed => {
            println!("Sign-in completed.");
            Ok(())
        }
        RunOutcome::Aborted(stage) => bail!("run aborted at stage \"{}\"", stage.title()),
        RunOutcome::Interrupted => bail!("run interrupted"),
    }
}

fn run_menu(config: SigninConfig) -> Result<()> {
    let session = build_session(&config)?;
    let dialog_region = config.dialog_region;
    let mut pipeline = SigninPipeline::new(&session, config);
    let stdin = io::stdin();

    loop {
        println!();
        for (index, stage) in Stage::ALL.iter().enumerate() {
            println!("  {:>2}. {}", index + 1, stage.title());
        }
        println!("   a. Run all stages");
        println!("   n. Send a test notification");
        println!("   o. OCR the configured dialog region");
        println!("   q. Quit");
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim() {
            "q" | "quit" => return Ok(()),
            "a" | "all" => {
                let outcome = pipeline.run();
                println!("Outcome: {outcome:?}");
            }
            "n" => {
                session.notify("screenwright test", "Push delivery works.");
                println!("Notification dispatched.");
            }
            "o" => match session.read_region_text(dialog_region) {
                Some(text) => println!("Recognized: {text}"),
                None => println!("No confident text in {dialog_region:?}."),
            },
            choice => match choice.parse::<usize>() {
                Ok(n) if (1..=Stage::ALL.len()).contains(&n) => {
                    let stage = Stage::ALL[n - 1];
                    match pipeline.run_stage(stage) {
                        Ok(()) => println!("Stage \"{}\" done.", stage.title()),
                        Err(e) => println!("Stage \"{}\" failed: {e}", stage.title()),
                    }
                }
                _ => println!("Unrecognized choice: {choice:?}"),
            },
        }
    }
}

fn exec_workflow(config: SigninConfig, file: &Path) -> Result<()> {
    let document = WorkflowFile::load(file)?;
    let program = compile(&document.steps).context("workflow does not compile")?;
    let session = build_session(&config)?;
    if let Err(e) = Runner::new(&session).run(&program) {
        session.notify(
            "Workflow failed",
            &format!("\"{}\" stopped: {e}", document.name),
        );
        return Err(e.into());
    }
    println!("Workflow \"{}\" finished.", document.name);
    Ok(())
}

fn compile_workflow(file: &Path) -> Result<()> {
    let document = WorkflowFile::load(file)?;
    let program = compile(&document.steps).context("workflow does not compile")?;
    print!("{}", program.render());
    Ok(())
}

fn capture_reference(config: SigninConfig, name: &str, size: u32, delay: u64) -> Result<()> {
    let session = build_session(&config)?;
    println!("Hover the pointer over the element to capture.");
    for remaining in (1..=delay).rev() {
        println!("  capturing in {remaining}...");
        thread::sleep(Duration::from_secs(1));
    }

    let at = session.input().pointer_location()?;
    let half = (size / 2) as i32;
    let region = Region::from_corners(at.x - half, at.y - half, at.x + half, at.y + half);
    let frame = session.screen().capture_region(region)?;

    fs::create_dir_all("images").context("cannot create images directory")?;
    let path = PathBuf::from("images").join(format!("{name}.png"));
    frame
        .save(&path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("Saved {} ({}x{} at {},{})", path.display(), frame.width(), frame.height(), region.x, region.y);
    Ok(())
}

fn notify_test(config: SigninConfig) -> Result<()> {
    if !config.push.enabled {
        bail!("push delivery is disabled in the configuration");
    }
    let notifier = HttpNotifier::new(config.push.endpoint, config.push.token);
    screenwright::notify::Notifier::send(&notifier, "screenwright test", "Push delivery works.")?;
    println!("Notification sent.");
    Ok(())
}
