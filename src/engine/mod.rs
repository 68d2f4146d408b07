pub mod queue;
pub mod scheduler;

pub use queue::{PendingQueue, PendingUnit};
pub use scheduler::Scheduler;

use crate::cache::TranslationCache;
use crate::config::{
    Config, Credentials, SettingsStore, DEFAULT_ENGINE_BATCH_SIZE, DEFAULT_POLL_INTERVAL_MS,
};
use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::translate::{batch, consume, ChatBackend, ChatRequest, ParsedLine};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parents whose text is never translated.
const EXCLUDED_PARENTS: &[&str] = &["script", "style", "comment", "head"];

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Units per remote call.
    pub batch_size: usize,
    /// Delay between scheduling attempts.
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_ENGINE_BATCH_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Why a node was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotText,
    Detached,
    ExcludedParent,
    ControlLabel,
    Blank,
    AlreadyTranslated,
    /// A cached translation was found but could not be written.
    WriteFailed,
}

/// What [`TranslationEngine::offer`] did with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Skipped(SkipReason),
    /// Translated synchronously from the forward cache.
    Cached,
    /// Queued as a new unit.
    Queued,
    /// Attached to a unit already pending with the same text.
    Joined,
}

/// Result of one scheduling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A drain is already in flight.
    Busy,
    /// Endpoint URL or API key is not set.
    Unconfigured,
    /// Nothing pending.
    Idle,
    Drained(DrainReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub units: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub lines_applied: usize,
    pub lines_rejected: usize,
}

/// Running totals since the engine was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub queued: usize,
    pub joined: usize,
    pub cache_hits: usize,
    pub skipped: usize,
    pub drains: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub lines_applied: usize,
    pub lines_rejected: usize,
}

/// Receiver of text nodes that may need translating.
pub trait TextSink {
    fn offer(&self, node: NodeId) -> Disposition;
}

/// Shared handle to the pipeline state. Clones refer to the same engine.
#[derive(Clone)]
pub struct TranslationEngine {
    inner: Rc<Inner>,
}

struct Inner {
    document: Document,
    backend: Box<dyn ChatBackend>,
    settings: Box<dyn SettingsStore>,
    options: EngineOptions,
    credentials: RefCell<Option<Credentials>>,
    queue: RefCell<PendingQueue>,
    cache: RefCell<TranslationCache>,
    draining: Cell<bool>,
    control: Cell<Option<NodeId>>,
    reported_unconfigured: Cell<bool>,
    stats: RefCell<EngineStats>,
}

/// Holds the drain flag for the lifetime of one drain.
struct DrainGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DrainGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl TranslationEngine {
    pub fn new<B, S>(document: Document, backend: B, settings: S, options: EngineOptions) -> Self
    where
        B: ChatBackend + 'static,
        S: SettingsStore + 'static,
    {
        Self {
            inner: Rc::new(Inner {
                document,
                backend: Box::new(backend),
                settings: Box::new(settings),
                options,
                credentials: RefCell::new(None),
                queue: RefCell::new(PendingQueue::new()),
                cache: RefCell::new(TranslationCache::new()),
                draining: Cell::new(false),
                control: Cell::new(None),
                reported_unconfigured: Cell::new(false),
                stats: RefCell::new(EngineStats::default()),
            }),
        }
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Mark `node` as the control button; its label is never translated.
    pub fn set_control(&self, node: Option<NodeId>) {
        self.inner.control.set(node);
    }

    pub fn control(&self) -> Option<NodeId> {
        self.inner.control.get()
    }

    /// Replace the credentials in use. `None` makes the engine consult its
    /// settings store again on the next cycle.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.inner.credentials.borrow_mut() = credentials;
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.get()
    }

    /// No drain in flight and nothing pending.
    pub fn is_idle(&self) -> bool {
        !self.is_draining() && self.pending() == 0
    }

    pub fn cached_translation(&self, original: &str) -> Option<String> {
        self.inner
            .cache
            .borrow()
            .lookup(original.trim())
            .map(str::to_string)
    }

    pub fn is_known_translation(&self, text: &str) -> bool {
        self.inner.cache.borrow().is_translation(text.trim())
    }

    /// Seed the caches with a known translation.
    pub fn remember(&self, original: &str, translated: &str) {
        self.inner
            .cache
            .borrow_mut()
            .record(original.trim(), translated.trim());
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats.borrow().clone()
    }

    fn classify(&self, node: NodeId) -> std::result::Result<String, SkipReason> {
        let document = &self.inner.document;
        let text = document.text(node).ok_or(SkipReason::NotText)?;
        let parent = document.parent(node).ok_or(SkipReason::Detached)?;

        if let Some(tag) = document.tag_name(parent) {
            if EXCLUDED_PARENTS.contains(&tag.as_str()) {
                return Err(SkipReason::ExcludedParent);
            }
        }
        if self.inner.control.get() == Some(parent) {
            return Err(SkipReason::ControlLabel);
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SkipReason::Blank);
        }
        if self.inner.cache.borrow().is_translation(trimmed) {
            return Err(SkipReason::AlreadyTranslated);
        }
        Ok(trimmed.to_string())
    }

    /// Run one scheduling attempt.
    ///
    /// The pending queue is swapped out in a single step before the first
    /// await, so units offered while the drain is in flight start a fresh
    /// queue for the next cycle.
    pub async fn tick(&self) -> CycleOutcome {
        if self.inner.draining.get() {
            debug!("Drain already in progress, rescheduling");
            return CycleOutcome::Busy;
        }

        let Some(credentials) = self.resolve_credentials() else {
            return CycleOutcome::Unconfigured;
        };

        if self.inner.queue.borrow().is_empty() {
            return CycleOutcome::Idle;
        }

        let _guard = DrainGuard::enter(&self.inner.draining);
        let units = self.refresh_units();
        self.inner.stats.borrow_mut().drains += 1;

        CycleOutcome::Drained(self.drain(&credentials, units).await)
    }

    /// Take the pending units, re-reading every node's current text.
    ///
    /// Nodes changed since they were offered are admitted again under their
    /// new text; nodes that became blank or ineligible drop out. Runs without
    /// yielding, so the result matches the document at drain start.
    fn refresh_units(&self) -> Vec<PendingUnit> {
        let stale = self.inner.queue.borrow_mut().take();
        let mut changed = 0;
        for unit in &stale {
            for &node in &unit.nodes {
                if !self.carries(node, &unit.text) {
                    changed += 1;
                }
                self.admit(node);
            }
        }
        if changed > 0 {
            debug!("{} queued node(s) changed text before the drain", changed);
        }
        self.inner.queue.borrow_mut().take()
    }

    /// Whether `node` still shows `text` once trimmed.
    fn carries(&self, node: NodeId, text: &str) -> bool {
        self.inner
            .document
            .text(node)
            .is_some_and(|current| current.trim() == text)
    }

    fn resolve_credentials(&self) -> Option<Credentials> {
        if let Some(ref credentials) = *self.inner.credentials.borrow() {
            return Some(credentials.clone());
        }

        match self.inner.settings.load_credentials() {
            Ok(Some(credentials)) => {
                info!("Using endpoint {}", credentials.endpoint_url);
                self.inner.reported_unconfigured.set(false);
                *self.inner.credentials.borrow_mut() = Some(credentials.clone());
                Some(credentials)
            }
            Ok(None) => {
                if self.inner.reported_unconfigured.replace(true) {
                    debug!("Endpoint URL or API key still unset");
                } else {
                    info!("Please set the endpoint URL and API key (live-translate configure)");
                }
                None
            }
            Err(e) => {
                warn!("Failed to read settings: {}", e);
                None
            }
        }
    }

    async fn drain(&self, credentials: &Credentials, units: Vec<PendingUnit>) -> DrainReport {
        let batches = batch(&units, self.inner.options.batch_size);
        let mut report = DrainReport {
            units: units.len(),
            batches: batches.len(),
            ..Default::default()
        };

        for chunk in batches {
            if let Err(e) = self.translate_batch(credentials, chunk, &mut report).await {
                report.failed_batches += 1;
                warn!("Batch of {} translation(s) failed: {}", chunk.len(), e);
            }
        }

        let mut stats = self.inner.stats.borrow_mut();
        stats.batches_sent += report.batches;
        stats.batches_failed += report.failed_batches;
        stats.lines_applied += report.lines_applied;
        stats.lines_rejected += report.lines_rejected;
        drop(stats);

        info!(
            "Drained {} unit(s) in {} batch(es): {} applied, {} rejected, {} failed batch(es)",
            report.units,
            report.batches,
            report.lines_applied,
            report.lines_rejected,
            report.failed_batches
        );
        report
    }

    async fn translate_batch(
        &self,
        credentials: &Credentials,
        units: &[PendingUnit],
        report: &mut DrainReport,
    ) -> Result<()> {
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        let request = ChatRequest::for_batch(&texts);

        info!(
            "Calling {} with {} translations...",
            self.inner.backend.name(),
            units.len()
        );
        let frames = self.inner.backend.open_stream(credentials, &request).await?;

        let mut applied = 0;
        let result = consume(frames, units.len(), |line| {
            self.apply_line(units, &line);
            applied += 1;
        })
        .await;
        report.lines_applied += applied;

        let summary = result?;
        report.lines_rejected += summary.rejected;

        let unmatched = units.len().saturating_sub(applied);
        if unmatched > 0 {
            debug!("{} unit(s) received no translation and keep their text", unmatched);
        }
        Ok(())
    }

    fn apply_line(&self, units: &[PendingUnit], line: &ParsedLine) {
        let unit = &units[line.position()];
        for &node in &unit.nodes {
            if !self.carries(node, &unit.text) {
                debug!("{} changed while translating, leaving it", node);
                continue;
            }
            if let Err(e) = self.inner.document.set_text(node, &line.text) {
                warn!("Could not write translation to {}: {}", node, e);
            }
        }
        self.inner.cache.borrow_mut().record(&unit.text, &line.text);
        debug!("{:?} -> {:?}", unit.text, line.text);
    }

    /// Apply the eligibility rules to `node`, then translate it from the
    /// forward cache or queue it.
    fn admit(&self, node: NodeId) -> Disposition {
        match self.classify(node) {
            Err(reason) => Disposition::Skipped(reason),
            Ok(text) => {
                let cached = self
                    .inner
                    .cache
                    .borrow()
                    .lookup(&text)
                    .map(str::to_string);
                match cached {
                    Some(translated) => match self.inner.document.set_text(node, &translated) {
                        Ok(()) => Disposition::Cached,
                        Err(e) => {
                            warn!("Could not write cached translation to {}: {}", node, e);
                            Disposition::Skipped(SkipReason::WriteFailed)
                        }
                    },
                    None => {
                        if self.inner.queue.borrow_mut().push(&text, node) {
                            Disposition::Queued
                        } else {
                            Disposition::Joined
                        }
                    }
                }
            }
        }
    }
}

impl TextSink for TranslationEngine {
    fn offer(&self, node: NodeId) -> Disposition {
        let disposition = self.admit(node);

        let mut stats = self.inner.stats.borrow_mut();
        match disposition {
            Disposition::Skipped(_) => stats.skipped += 1,
            Disposition::Cached => stats.cache_hits += 1,
            Disposition::Queued => stats.queued += 1,
            Disposition::Joined => stats.joined += 1,
        }
        disposition
    }
}
