use crate::dom::NodeId;
use crate::engine::{Disposition, TextSink, TranslationEngine};
use crate::error::{Result, TranslateError};
use crate::watcher::DomWatcher;
use tracing::{debug, info};

pub const BUTTON_ID: &str = "testTranslateButton";
pub const BUTTON_LABEL: &str = "Translate";
const BUTTON_STYLE: &str = "position:fixed; top:0px; left:0px; border: 1px solid black; \
     background-color: white; color: black; z-index: 9999; padding: 10px; \
     font-size: 16px; cursor: pointer;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Stopped,
    Running,
}

/// Counts from the sweep done when translation starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub queued: usize,
    pub joined: usize,
    pub cached: usize,
    pub skipped: usize,
}

pub struct ToggleController {
    engine: TranslationEngine,
    watcher: DomWatcher,
    state: ToggleState,
    button: Option<NodeId>,
}

impl ToggleController {
    pub fn new(engine: TranslationEngine) -> Self {
        let watcher = DomWatcher::new(engine.document().clone());
        Self {
            engine,
            watcher,
            state: ToggleState::Stopped,
            button: None,
        }
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    pub fn button(&self) -> Option<NodeId> {
        self.button
    }

    /// Append the control button to `<body>`. Installing twice is a no-op.
    pub fn install(&mut self) -> Result<NodeId> {
        if let Some(button) = self.button {
            return Ok(button);
        }

        let document = self.engine.document();
        let body = document
            .find_element("body")
            .ok_or_else(|| TranslateError::Document("document has no <body>".to_string()))?;

        let button = document.create_element_with_attrs(
            "button",
            vec![
                ("id".to_string(), BUTTON_ID.to_string()),
                ("style".to_string(), BUTTON_STYLE.to_string()),
            ],
        );
        // The label must be exempt before it can be observed.
        self.engine.set_control(Some(button));
        let label = document.create_text(BUTTON_LABEL);
        document.append_child(button, label)?;
        document.append_child(body, button)?;

        debug!("Installed control button {}", button);
        self.button = Some(button);
        Ok(button)
    }

    /// Detach the control button from the document, if installed.
    pub fn uninstall(&mut self) -> Result<()> {
        if let Some(button) = self.button.take() {
            self.engine.document().remove(button)?;
            self.engine.set_control(None);
        }
        Ok(())
    }

    /// Flip between running and stopped, as a click on the button does.
    pub fn toggle(&mut self) -> ToggleState {
        match self.state {
            ToggleState::Stopped => {
                self.start();
            }
            ToggleState::Running => self.stop(),
        }
        self.state
    }

    /// Offer every text node in the document, then watch for new ones.
    pub fn start(&mut self) -> SweepReport {
        if self.state == ToggleState::Running {
            return SweepReport::default();
        }
        info!("Translation started");
        self.state = ToggleState::Running;

        let document = self.engine.document();
        let mut report = SweepReport::default();
        for node in document.text_nodes_under(document.root()) {
            report.scanned += 1;
            match self.engine.offer(node) {
                Disposition::Queued => report.queued += 1,
                Disposition::Joined => report.joined += 1,
                Disposition::Cached => report.cached += 1,
                Disposition::Skipped(_) => report.skipped += 1,
            }
        }
        debug!("Sweep: {:?}", report);

        self.watcher.start(self.engine.clone());
        report
    }

    /// Stop watching. Units already queued are still translated.
    pub fn stop(&mut self) {
        if self.state == ToggleState::Stopped {
            return;
        }
        info!("Translation stopped");
        self.state = ToggleState::Stopped;
        self.watcher.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials};
    use crate::dom::html::parse_html;
    use crate::engine::EngineOptions;
    use crate::translate::{ChatBackend, ChatRequest, FrameStream};
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};

    struct Silent;

    #[async_trait(?Send)]
    impl ChatBackend for Silent {
        async fn open_stream(&self, _: &Credentials, _: &ChatRequest) -> crate::error::Result<FrameStream> {
            Ok(stream::empty().boxed_local())
        }

        fn name(&self) -> &'static str {
            "silent"
        }
    }

    fn controller(html: &str) -> ToggleController {
        let document = parse_html(html).unwrap();
        let engine = TranslationEngine::new(document, Silent, Config::default(), EngineOptions::default());
        ToggleController::new(engine)
    }

    #[test]
    fn test_install_appends_exempt_button() {
        let mut controller = controller("<body><p>Hi</p></body>");
        let button = controller.install().unwrap();
        assert_eq!(controller.install().unwrap(), button);

        let document = controller.engine.document();
        let body = document.find_element("body").unwrap();
        assert_eq!(document.children(body).last(), Some(&button));
        assert_eq!(document.element_by_id(BUTTON_ID), Some(button));
        assert_eq!(document.text_content(button), BUTTON_LABEL);

        let report = controller.start();
        assert_eq!(report.queued, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_install_without_body_fails() {
        let document = crate::dom::Document::new();
        let engine = TranslationEngine::new(document, Silent, Config::default(), EngineOptions::default());
        let mut controller = ToggleController::new(engine);
        assert!(controller.install().is_err());
    }

    #[test]
    fn test_sweep_queues_distinct_non_blank_text() {
        let mut controller = controller("<body></body>");
        let document = controller.engine.document().clone();
        let body = document.find_element("body").unwrap();
        for text in ["Hello", "", "  ", "Hello"] {
            let node = document.create_text(text);
            document.append_child(body, node).unwrap();
        }

        let report = controller.start();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.queued, 1);
        assert_eq!(report.joined, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(controller.engine.pending(), 1);
    }

    #[test]
    fn test_toggle_controls_watching() {
        let mut controller = controller("<body><p>one</p></body>");
        let document = controller.engine.document().clone();
        let body = document.find_element("body").unwrap();

        assert_eq!(controller.state(), ToggleState::Stopped);
        assert_eq!(controller.toggle(), ToggleState::Running);
        let added = document.create_text("two");
        document.append_child(body, added).unwrap();
        assert_eq!(controller.engine.pending(), 2);

        assert_eq!(controller.toggle(), ToggleState::Stopped);
        let ignored = document.create_text("three");
        document.append_child(body, ignored).unwrap();
        assert_eq!(controller.engine.pending(), 2);
    }

    #[test]
    fn test_uninstall_removes_button() {
        let mut controller = controller("<body></body>");
        controller.install().unwrap();
        controller.uninstall().unwrap();

        assert!(controller.button().is_none());
        assert!(controller.engine.document().element_by_id(BUTTON_ID).is_none());
        assert_eq!(controller.engine.control(), None);
    }
}
