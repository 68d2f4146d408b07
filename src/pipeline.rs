use crate::config::SettingsStore;
use crate::dom::html::{parse_html, to_html};
use crate::engine::{EngineOptions, Scheduler, TranslationEngine};
use crate::error::Result;
use crate::toggle::ToggleController;
use crate::translate::ChatBackend;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Statistics from translating one document.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total time taken for the entire pipeline.
    pub total_time: Duration,
    /// Time spent in the translation loop.
    pub translation_time: Duration,
    /// Text nodes visited by the initial sweep.
    pub nodes_scanned: usize,
    /// Distinct texts sent for translation.
    pub units_queued: usize,
    /// Nodes that shared a pending text with an earlier node.
    pub units_joined: usize,
    /// Nodes translated straight from the cache.
    pub cache_hits: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub lines_applied: usize,
    pub lines_rejected: usize,
    /// Backend used for translation.
    pub backend: String,
}

/// Result of translating one document.
#[derive(Debug)]
pub struct PipelineResult {
    /// Path to the translated HTML file.
    pub output_path: PathBuf,
    pub stats: PipelineStats,
    /// Units still queued when the loop stopped.
    pub left_pending: usize,
    /// Whether the loop was interrupted before the queue emptied.
    pub cancelled: bool,
}

/// Translate the text of an HTML file and write the result to `output`.
///
/// The document is handled the same way as a live page:
/// 1. The control button is installed and translation is switched on,
///    which sweeps every text node into the engine
/// 2. The scheduler runs until nothing is pending or `shutdown` fires
/// 3. Translation is switched off and the button removed
/// 4. The document is serialized to `output`
pub async fn translate_document<B, S>(
    input: &Path,
    output: &Path,
    backend: B,
    settings: S,
    options: EngineOptions,
    shutdown: CancellationToken,
) -> Result<PipelineResult>
where
    B: ChatBackend + 'static,
    S: SettingsStore + 'static,
{
    let start_time = Instant::now();

    info!("Loading {}", input.display());
    let html = fs::read_to_string(input)?;
    let document = parse_html(&html)?;

    let backend_name = backend.name().to_string();
    let engine = TranslationEngine::new(document.clone(), backend, settings, options);
    let mut controller = ToggleController::new(engine.clone());
    controller.install()?;
    let sweep = controller.start();
    info!(
        "Found {} text node(s): {} to translate, {} cached",
        sweep.scanned, sweep.queued, sweep.cached
    );

    let translate_start = Instant::now();
    Scheduler::new(engine.clone())
        .run_until_idle(shutdown.clone())
        .await;
    let translation_time = translate_start.elapsed();

    controller.stop();
    controller.uninstall()?;

    let left_pending = engine.pending();
    let cancelled = shutdown.is_cancelled() && !engine.is_idle();
    if cancelled {
        warn!("Interrupted with {} unit(s) still pending", left_pending);
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, to_html(&document))?;
    debug!("Wrote {}", output.display());

    let totals = engine.stats();
    let stats = PipelineStats {
        total_time: start_time.elapsed(),
        translation_time,
        nodes_scanned: sweep.scanned,
        units_queued: totals.queued,
        units_joined: totals.joined,
        cache_hits: totals.cache_hits,
        batches_sent: totals.batches_sent,
        batches_failed: totals.batches_failed,
        lines_applied: totals.lines_applied,
        lines_rejected: totals.lines_rejected,
        backend: backend_name,
    };

    Ok(PipelineResult {
        output_path: output.to_path_buf(),
        stats,
        left_pending,
        cancelled,
    })
}

/// Print a summary of the pipeline result.
pub fn print_summary(result: &PipelineResult) {
    let stats = &result.stats;
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Translation Complete                     ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!("  Backend:    {}", stats.backend);
    println!("  Text nodes: {}", stats.nodes_scanned);
    println!(
        "  Units:      {} queued, {} shared, {} from cache",
        stats.units_queued, stats.units_joined, stats.cache_hits
    );
    println!(
        "  Lines:      {} applied, {} rejected",
        stats.lines_applied, stats.lines_rejected
    );
    println!(
        "  Batches:    {} sent, {} failed",
        stats.batches_sent, stats.batches_failed
    );
    println!();
    println!("  Timing:");
    println!(
        "    Translate:   {:.2}s",
        stats.translation_time.as_secs_f64()
    );
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    if result.cancelled {
        println!();
        println!(
            "  Note: Interrupted, {} unit(s) left untranslated",
            result.left_pending
        );
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
