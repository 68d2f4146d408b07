pub mod cache;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod toggle;
pub mod translate;
pub mod watcher;

pub use config::{Config, ConfigFile, Credentials, SettingsStore};
pub use dom::Document;
pub use engine::{CycleOutcome, Scheduler, TextSink, TranslationEngine};
pub use error::{Result, TranslateError};
pub use pipeline::{print_summary, translate_document, PipelineResult, PipelineStats};
pub use toggle::{ToggleController, ToggleState};
pub use watcher::DomWatcher;
