use crate::engine::{CycleOutcome, TranslationEngine};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Calls [`TranslationEngine::tick`] at a fixed interval until cancelled.
///
/// Cancellation is only observed between cycles; a drain that has started
/// always runs to completion.
pub struct Scheduler {
    engine: TranslationEngine,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: TranslationEngine) -> Self {
        let interval = engine.options().poll_interval;
        Self { engine, interval }
    }

    /// Run until `shutdown` is cancelled. Never stops on errors.
    pub async fn run(&self, shutdown: CancellationToken) -> usize {
        info!("Translation loop started (every {:?})", self.interval);
        let cycles = self.run_loop(&shutdown, false).await;
        info!("Translation loop stopped after {} cycle(s)", cycles);
        cycles
    }

    /// Run until a cycle finds nothing pending, or `shutdown` is cancelled.
    ///
    /// While settings are missing the loop keeps waiting, as [`run`] does.
    ///
    /// [`run`]: Scheduler::run
    pub async fn run_until_idle(&self, shutdown: CancellationToken) -> usize {
        self.run_loop(&shutdown, true).await
    }

    async fn run_loop(&self, shutdown: &CancellationToken, until_idle: bool) -> usize {
        let mut cycles = 0;
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let outcome = self.engine.tick().await;
            cycles += 1;
            match outcome {
                CycleOutcome::Idle if until_idle => {
                    debug!("Queue empty, leaving loop");
                    break;
                }
                CycleOutcome::Drained(ref report) => {
                    debug!("Cycle {} drained {} unit(s)", cycles, report.units);
                    // Work may have arrived during the drain; go again without waiting.
                    if until_idle && self.engine.pending() > 0 {
                        continue;
                    }
                }
                ref other => debug!("Cycle {}: {:?}", cycles, other),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials};
    use crate::dom::Document;
    use crate::engine::{EngineOptions, TextSink};
    use crate::error::Result;
    use crate::translate::{ChatBackend, ChatRequest, FrameStream};
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};

    struct Echo;

    #[async_trait(?Send)]
    impl ChatBackend for Echo {
        async fn open_stream(&self, _: &Credentials, request: &ChatRequest) -> Result<FrameStream> {
            let reply: Vec<String> = request
                .user_content()
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| {
                    let (index, text) = l.split_once('|').unwrap_or(("0", l));
                    serde_json::json!({
                        "object": "chat.completion.chunk",
                        "choices": [{ "delta": { "content": format!("{}|<{}>\n", index, text) } }]
                    })
                    .to_string()
                })
                .chain(std::iter::once("[DONE]".to_string()))
                .collect();
            Ok(stream::iter(reply.into_iter().map(Ok)).boxed_local())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    fn engine(config: Config) -> TranslationEngine {
        let doc = Document::new();
        let body = doc.create_element("body");
        doc.append_child(doc.root(), body).unwrap();
        for text in ["alpha", "beta"] {
            let node = doc.create_text(text);
            doc.append_child(body, node).unwrap();
        }
        let options = EngineOptions {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let engine = TranslationEngine::new(doc, Echo, config, options);
        for node in engine.document().text_nodes_under(engine.document().root()) {
            engine.offer(node);
        }
        engine
    }

    fn configured() -> Config {
        Config {
            endpoint_url: Some("https://example.test".to_string()),
            api_key: Some("k".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_until_idle_drains_queue() {
        let engine = engine(configured());
        let cycles = Scheduler::new(engine.clone())
            .run_until_idle(CancellationToken::new())
            .await;

        assert_eq!(cycles, 2);
        assert!(engine.is_idle());
        let texts: Vec<String> = engine
            .document()
            .text_nodes_under(engine.document().root())
            .into_iter()
            .filter_map(|n| engine.document().text(n))
            .collect();
        assert_eq!(texts, vec!["<alpha>", "<beta>"]);
    }

    #[tokio::test]
    async fn test_unconfigured_loop_waits_until_cancelled() {
        let engine = engine(Config::default());
        let shutdown = CancellationToken::new();

        let scheduler = Scheduler::new(engine.clone());
        let stopper = shutdown.clone();
        let (cycles, _) = tokio::join!(
            scheduler.run_until_idle(shutdown),
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                stopper.cancel();
            }
        );

        assert!(cycles >= 2);
        assert_eq!(engine.pending(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let engine = engine(configured());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(Scheduler::new(engine.clone()).run(shutdown).await, 0);
        assert_eq!(engine.pending(), 2);
    }
}
