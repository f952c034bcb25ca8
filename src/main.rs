use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{Config, WriteLogger};

use pageflip::flip::{
    DiskStore, DocumentHandle, PageSlot, RenderBackend, Session, SessionConfig, SessionError,
    SPREAD_WINDOW, SessionPhase, SessionStats, Spread, SyntheticBackend, ViewerAdapter,
};
use pageflip::panic_handler::initialize_panic_handler;
use pageflip::{paths, settings};

#[derive(Parser, Debug)]
#[command(name = "pageflip", version, about = "Flip-book page cache driver")]
struct Args {
    /// Document to open; the last saved document is restored when omitted
    file: Option<PathBuf>,

    /// Open a generated document with this many pages instead of a file
    #[arg(long, value_name = "PAGES", conflicts_with = "file")]
    synthetic: Option<usize>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Render worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Do not read or write the document store
    #[arg(long)]
    no_persist: bool,
}

/// One line of user input
#[derive(Debug, Clone, Copy, PartialEq)]
enum Input {
    Next,
    Previous,
    GoTo(usize),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Stats,
    Reset,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let mut parts = line.split_whitespace();
    let input = match parts.next()? {
        "n" => Input::Next,
        "p" => Input::Previous,
        "g" => Input::GoTo(parts.next()?.parse().ok()?),
        "+" => Input::ZoomIn,
        "-" => Input::ZoomOut,
        "0" => Input::ResetZoom,
        "s" => Input::Stats,
        "r" => Input::Reset,
        "q" => Input::Quit,
        _ => return None,
    };
    Some(input)
}

const HELP: &str = "commands: n (next) | p (previous) | g <spread> | + | - | 0 (reset zoom) | s (stats) | r (reset) | q (quit)";

/// Prints the visible spread and its neighbours
struct TextViewer<W: Write> {
    out: W,
}

fn slot_text(page: usize, slot: &PageSlot) -> String {
    match slot.bitmap() {
        Some(bitmap) => format!("p{page} {}x{}", bitmap.width_px, bitmap.height_px),
        None => format!("p{page} {}", slot.label()),
    }
}

impl<W: Write> ViewerAdapter for TextViewer<W> {
    fn present(&mut self, spreads: &[Spread], current_spread: usize) {
        let window = spreads
            .iter()
            .filter(|spread| spread.index.abs_diff(current_spread) <= SPREAD_WINDOW);

        let mut line = String::new();
        for spread in window {
            let marker = if spread.is_visible { '*' } else { ' ' };
            line.push_str(&format!(
                "{marker}[{}",
                slot_text(spread.left_page, &spread.left)
            ));
            if let Some(right) = spread.right_page {
                line.push_str(&format!(" | {}", slot_text(right, &spread.right)));
            }
            line.push_str("] ");
        }
        let _ = writeln!(
            self.out,
            "spread {}/{}: {}",
            current_spread + 1,
            spreads.len(),
            line.trim_end()
        );
    }
}

fn print_stats(stats: &SessionStats) {
    println!(
        "{:?} | pages {} | cached {}/{} ({} KiB) | in flight {} | failed {} | quality {:.1} | zoom {}%",
        stats.phase,
        stats.page_count,
        stats.cached_pages,
        stats.buffer_size,
        stats.cached_bytes / 1024,
        stats.in_flight,
        stats.failed_pages,
        stats.quality,
        stats.zoom_percent
    );
}

fn create_backend(args: &Args) -> Arc<dyn RenderBackend> {
    if args.synthetic.is_some() {
        return Arc::new(SyntheticBackend);
    }
    #[cfg(feature = "pdf")]
    {
        Arc::new(pageflip::flip::MupdfBackend)
    }
    #[cfg(not(feature = "pdf"))]
    {
        Arc::new(SyntheticBackend)
    }
}

fn open_initial_document(session: &mut Session, args: &Args) -> Result<()> {
    if let Some(pages) = args.synthetic {
        return Ok(session.load(SyntheticBackend::document(pages))?);
    }

    let Some(path) = &args.file else {
        return match session.restore() {
            Err(SessionError::NothingToRestore) => {
                bail!("No document given and nothing saved to restore")
            }
            other => Ok(other?),
        };
    };

    if cfg!(not(feature = "pdf")) {
        bail!("Built without PDF support; use --synthetic <PAGES>");
    }

    let path = paths::absolute(path)?;
    let bytes = fs::read(&path).with_context(|| format!("Failed to read document {path:?}"))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(session.load(DocumentHandle::from_bytes(name, bytes))?)
}

fn run(session: &mut Session) -> Result<()> {
    let mut viewer = TextViewer { out: io::stdout() };
    session.present(&mut viewer);
    println!("{HELP}");

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        let Some(input) = parse_input(&line) else {
            if !line.trim().is_empty() {
                println!("{HELP}");
            }
            continue;
        };

        let spread = session.position().spread();
        match input {
            Input::Next => session.on_position_changed(spread + 1),
            Input::Previous => session.on_position_changed(spread.saturating_sub(1)),
            Input::GoTo(target) => session.on_position_changed(target.saturating_sub(1)),
            Input::ZoomIn => session.zoom_in(),
            Input::ZoomOut => session.zoom_out(),
            Input::ResetZoom => session.reset_zoom(),
            Input::Stats => {
                print_stats(&session.stats());
                continue;
            }
            Input::Reset => session.reset(),
            Input::Quit => break,
        }

        session.poll_responses();
        if session.phase() == SessionPhase::Empty {
            println!("No document loaded");
            break;
        }
        session.present(&mut viewer);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    settings::load_settings();
    let mut config = settings::current();
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    let level = config.log_level_filter();

    let log_path = paths::resolve_log_path()?;
    WriteLogger::init(level, Config::default(), File::create(&log_path)?)?;
    initialize_panic_handler();

    info!("Starting pageflip");

    let mut session = Session::with_config(
        create_backend(&args),
        SessionConfig {
            workers: config.workers,
            base_scale: config.base_scale,
        },
    );

    if config.persist_documents && !args.no_persist {
        match paths::resolve_store_dir()
            .and_then(|dir| DiskStore::open(dir, config.store_capacity_bytes))
        {
            Ok(store) => session = session.with_store(Box::new(store)),
            Err(e) => warn!("Document store unavailable, continuing without it: {e:#}"),
        }
    }

    if let Err(e) = open_initial_document(&mut session, &args) {
        error!("Failed to open document: {e:#}");
        return Err(e);
    }

    let res = run(&mut session);
    if let Err(err) = &res {
        error!("Application error: {err:?}");
    }

    info!("Shutting down pageflip");
    res
}
