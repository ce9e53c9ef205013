//! pm - pixelmacro CLI
//!
//! Record, edit and replay input macros. Every command prints one JSON
//! object on stdout; logs go to stderr (`RUST_LOG` overrides the level).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixelmacro::prelude::*;
use pixelmacro::recorder::platform::{self, ScreenPixels};
use pixelmacro::recorder::storage::{check_rewrite, load_from, save_to};
use pixelmacro::{format, Error, ErrorCode};

#[derive(Parser)]
#[command(name = "pm")]
#[command(about = "pixelmacro - record and replay mouse/keyboard macros gated on screen pixels")]
#[command(version)]
struct Cli {
    /// Macro library directory (default: <data dir>/pixelmacro)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    /// Settings file (default: <config dir>/pixelmacro/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Esc (or Ctrl+C) and save to the library
    Record {
        #[arg(short, long, default_value = "macro")]
        name: String,
        /// Minimum pointer travel in pixels between recorded moves
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Play a saved macro
    Play {
        file: String,
        /// Pause after each step
        #[arg(long)]
        settle_ms: Option<u64>,
        /// Give up on a pixel wait after this long
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Pause before the first step
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// List saved macros
    List,
    /// Show a macro
    Show {
        file: String,
        #[arg(long)]
        all: bool,
    },
    /// Delete a saved macro
    Delete { file: String },
    /// Read the colour of a screen pixel
    Pixel { x: u32, y: u32 },
    /// Edit the steps of a saved macro
    Step {
        file: String,
        /// Save even if that rewrites button labels or drops unknown fields
        #[arg(long, global = true)]
        force: bool,
        #[command(subcommand)]
        action: StepAction,
    },
    /// Save an empty macro to start editing
    New {
        #[arg(short, long, default_value = "macro")]
        name: String,
    },
}

#[derive(Subcommand)]
enum StepAction {
    /// Append a step, or insert it with --at
    Add {
        #[command(flatten)]
        draft: DraftArgs,
        #[arg(long)]
        at: Option<usize>,
    },
    /// Remove the step at INDEX
    Remove { index: usize },
    /// Replace the step at INDEX
    Replace {
        index: usize,
        #[command(flatten)]
        draft: DraftArgs,
    },
}

#[derive(Args)]
struct DraftArgs {
    /// move, click, release_click, key_press, key_release or wait_pixel
    action: String,
    #[arg(long)]
    x: Option<u32>,
    #[arg(long)]
    y: Option<u32>,
    /// left or right
    #[arg(long)]
    button: Option<String>,
    /// A character or a key name (esc, enter, f5, ctrl, ...)
    #[arg(long)]
    key: Option<String>,
    /// r,g,b
    #[arg(long)]
    color: Option<String>,
}

impl DraftArgs {
    fn build(self) -> pixelmacro::Result<Step> {
        let draft = StepDraft {
            action: self.action,
            x: self.x,
            y: self.y,
            button: self.button,
            key: self.key,
            color: self.color,
        };
        Ok(draft.build()?.step)
    }
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: {}", e),
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        let err = match e.downcast_ref::<Error>() {
            Some(err) => err.clone(),
            None => Error::new(ErrorCode::Unknown, format!("{:#}", e)),
        };
        print_json(&Output::<()>::err(err));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path),
        None => Settings::load_default(),
    }
    .map_err(Error::from)?;
    let storage = match &cli.dir {
        Some(dir) => MacroStorage::with_dir(dir),
        None => MacroStorage::new(),
    }
    .map_err(Error::from)?;

    match cli.command {
        Commands::Record { name, threshold } => record(settings, storage, &name, threshold),
        Commands::Play { file, settle_ms, timeout_ms, delay_ms } => {
            play(settings, storage, &file, settle_ms, timeout_ms, delay_ms)
        }
        Commands::List => list(&storage),
        Commands::Show { file, all } => show(&storage, &file, all),
        Commands::Delete { file } => delete(&storage, &file),
        Commands::Pixel { x, y } => pixel(x, y),
        Commands::Step { file, force, action } => step(&storage, &file, force, action),
        Commands::New { name } => new(&storage, &name),
    }
}

// ── Recording and playback ──────────────────────────────────────────────────

fn controller(settings: &Settings, storage: MacroStorage) -> Result<Arc<MacroController>> {
    let backends = platform::native().context("failed to initialise input backends")?;
    Ok(Arc::new(MacroController::new(backends, settings, storage)))
}

fn record(
    mut settings: Settings,
    storage: MacroStorage,
    name: &str,
    threshold: Option<f64>,
) -> Result<()> {
    if let Some(t) = threshold {
        settings.recorder.mouse_move_threshold = t;
    }
    let controller = controller(&settings, storage)?;

    let c = controller.clone();
    ctrlc::set_handler(move || {
        // Ends the session; wait_recording below then returns
        if let Err(e) = c.stop_recording() {
            eprintln!("Error: {}", e);
        }
    })?;

    controller.start_recording()?;
    eprintln!("Recording {} - press Esc to stop", name);
    let recorded = controller.wait_recording()?;
    if recorded.is_empty() {
        info!("nothing captured, not saving");
        print_json(&Output::ok(serde_json::json!({ "steps": 0 })));
        return Ok(());
    }

    let path = controller.save(name)?;
    print_json(&Output::ok(serde_json::json!({
        "path": path,
        "steps": recorded.len(),
        "summary": recorded.summary(),
    })));
    Ok(())
}

fn play(
    mut settings: Settings,
    storage: MacroStorage,
    file: &str,
    settle_ms: Option<u64>,
    timeout_ms: Option<u64>,
    delay_ms: Option<u64>,
) -> Result<()> {
    if let Some(ms) = settle_ms {
        settings.playback.settle_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = timeout_ms {
        settings.playback.pixel_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = delay_ms {
        settings.playback.start_delay = Duration::from_millis(ms);
    }
    let controller = controller(&settings, storage)?;
    let warnings = controller.load(file)?;

    let cancel = CancelToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || c.cancel())?;

    eprintln!("Playing {} ({} steps) - Ctrl+C to cancel", file, controller.current().len());
    let report = controller.play(&cancel)?;
    print_json(&Output::ok(serde_json::json!({
        "file": file,
        "report": report,
        "warnings": warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })));
    Ok(())
}

fn pixel(x: u32, y: u32) -> Result<()> {
    let color = ScreenPixels::new().sample(x, y).map_err(Error::from)?;
    print_json(&Output::ok(serde_json::json!({
        "x": x,
        "y": y,
        "color": color.to_array(),
        "step": format!(
            "wait_pixel --x {} --y {} --color {},{},{}",
            x, y, color.r, color.g, color.b
        ),
    })));
    Ok(())
}

// ── Library ─────────────────────────────────────────────────────────────────

fn list(storage: &MacroStorage) -> Result<()> {
    let files = storage.list().map_err(Error::from)?;
    print_json(&Output::ok(serde_json::json!({
        "dir": storage.path(),
        "files": files,
    })));
    Ok(())
}

fn show(storage: &MacroStorage, file: &str, all: bool) -> Result<()> {
    let decoded = storage.load(file).map_err(Error::from)?;
    let m = &decoded.macro_;
    let mut data = serde_json::json!({
        "file": file,
        "steps": m.len(),
        "summary": m.summary(),
        "warnings": decoded.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });
    if all {
        data["list"] = m
            .iter()
            .enumerate()
            .map(|(i, s)| serde_json::json!({ "index": i, "step": s.to_string() }))
            .collect();
    }
    print_json(&Output::ok(data));
    Ok(())
}

fn delete(storage: &MacroStorage, file: &str) -> Result<()> {
    storage.delete(file).map_err(Error::from)?;
    print_json(&Output::ok(serde_json::json!({ "deleted": file })));
    Ok(())
}

fn new(storage: &MacroStorage, name: &str) -> Result<()> {
    let path = storage.save(name, &Macro::new()).map_err(Error::from)?;
    print_json(&Output::ok(serde_json::json!({ "path": path })));
    Ok(())
}

fn step(storage: &MacroStorage, file: &str, force: bool, action: StepAction) -> Result<()> {
    let path = storage.resolve(file);
    let decoded = load_from(&path).map_err(Error::from)?;
    check_rewrite(&path, &decoded, force).map_err(Error::from)?;
    let warnings: Vec<String> = decoded.warnings.iter().map(ToString::to_string).collect();
    let mut m = decoded.macro_;

    let changed = match action {
        StepAction::Add { draft, at } => {
            let step = draft.build()?;
            let index = match at {
                Some(i) => {
                    m.insert_step(i, step)?;
                    i
                }
                None => {
                    m.add_step(step);
                    m.len() - 1
                }
            };
            serde_json::json!({ "added": index })
        }
        StepAction::Remove { index } => {
            let removed = m.remove_step(index)?;
            serde_json::json!({ "removed": index, "step": removed.to_string() })
        }
        StepAction::Replace { index, draft } => {
            let old = m.replace_step(index, draft.build()?)?;
            serde_json::json!({ "replaced": index, "previous": old.to_string() })
        }
    };

    save_to(&path, &m).map_err(Error::from)?;
    print_json(&Output::ok(serde_json::json!({
        "file": file,
        "steps": m.len(),
        "change": changed,
        "warnings": warnings,
        "macro": format::to_value(&m),
    })));
    Ok(())
}
