use crate::error::{Result, TranslateError};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

/// Event data that terminates a completion stream.
pub const DONE_MARKER: &str = "[DONE]";

const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// End of stream.
    Done,
    /// A completion chunk; the content may be absent (role-only or final chunks).
    Delta(Option<String>),
    /// A well-formed payload that is not a completion chunk.
    Ignored,
}

#[derive(Deserialize)]
struct ChunkPayload {
    object: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

impl Frame {
    pub fn decode(data: &str) -> Result<Frame> {
        if data.trim() == DONE_MARKER {
            return Ok(Frame::Done);
        }

        let payload: ChunkPayload = serde_json::from_str(data)
            .map_err(|e| TranslateError::MalformedFrame(format!("{}: {}", e, data)))?;

        if payload.object.as_deref() != Some(CHUNK_OBJECT) {
            return Ok(Frame::Ignored);
        }

        Ok(payload
            .choices
            .into_iter()
            .next()
            .map(|choice| Frame::Delta(choice.delta.and_then(|d| d.content)))
            .unwrap_or(Frame::Ignored))
    }
}

/// The line currently being assembled from content deltas.
#[derive(Debug, Default)]
pub struct LineAccumulator {
    current: String,
}

impl LineAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return every line it completed.
    ///
    /// A line is complete once a `\n` has been seen; the newline (and a
    /// preceding `\r`) is not part of the line. Blank lines carry no item and
    /// are dropped.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.current.push_str(delta);

        let mut lines = Vec::new();
        while let Some(pos) = self.current.find('\n') {
            let rest = self.current.split_off(pos + 1);
            let line = std::mem::replace(&mut self.current, rest);
            let line = strip_line_ending(&line);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Take whatever is left when the stream ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.current);
        let rest = strip_line_ending(&rest);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }

    pub fn pending(&self) -> &str {
        &self.current
    }
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// A response line correlated with its batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// 1-based index as sent by the remote side.
    pub index: usize,
    pub text: String,
}

impl ParsedLine {
    /// Position of the item within its batch.
    pub fn position(&self) -> usize {
        self.index - 1
    }
}

/// Parse `<index>|<translation>` against a batch of `batch_len` items.
pub fn parse_line(line: &str, batch_len: usize) -> Result<ParsedLine> {
    let (index_token, text) = line
        .split_once('|')
        .ok_or_else(|| TranslateError::malformed_line(line, "missing '|' separator"))?;

    let index: usize = index_token
        .trim()
        .parse()
        .map_err(|_| TranslateError::malformed_line(line, "index is not a number"))?;

    if index == 0 || index > batch_len {
        return Err(TranslateError::malformed_line(
            line,
            format!("index {} outside batch of {}", index, batch_len),
        ));
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(TranslateError::malformed_line(line, "empty translation"));
    }

    Ok(ParsedLine {
        index,
        text: text.to_string(),
    })
}

/// Outcome of one consumed completion stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub parsed: usize,
    pub rejected: usize,
    /// Whether the terminal marker was seen.
    pub completed: bool,
}

/// Fold a stream of event data into parsed lines, handing each to `on_line`
/// as soon as it completes.
///
/// Malformed lines and undecodable frames are logged and skipped. A transport
/// error ends the fold with that error; lines already handed out stay applied
/// and the unfinished line is discarded. If the stream closes without the
/// terminal marker, the trailing line is still parsed.
pub async fn consume<S, F>(mut frames: S, batch_len: usize, mut on_line: F) -> Result<StreamSummary>
where
    S: Stream<Item = Result<String>> + Unpin,
    F: FnMut(ParsedLine),
{
    let mut accumulator = LineAccumulator::new();
    let mut summary = StreamSummary::default();

    while let Some(frame) = frames.next().await {
        let data = frame?;
        match Frame::decode(&data) {
            Ok(Frame::Done) => {
                summary.completed = true;
                break;
            }
            Ok(Frame::Delta(Some(content))) => {
                for line in accumulator.push(&content) {
                    handle_line(&line, batch_len, &mut summary, &mut on_line);
                }
            }
            Ok(Frame::Delta(None)) | Ok(Frame::Ignored) => {}
            Err(e) => warn!("Skipping frame: {}", e),
        }
    }

    if let Some(line) = accumulator.finish() {
        handle_line(&line, batch_len, &mut summary, &mut on_line);
    }

    debug!(
        "DONE ({} parsed, {} rejected, terminated: {})",
        summary.parsed, summary.rejected, summary.completed
    );
    Ok(summary)
}

fn handle_line<F>(line: &str, batch_len: usize, summary: &mut StreamSummary, on_line: &mut F)
where
    F: FnMut(ParsedLine),
{
    match parse_line(line, batch_len) {
        Ok(parsed) => {
            summary.parsed += 1;
            on_line(parsed);
        }
        Err(e) => {
            summary.rejected += 1;
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk(content: &str) -> String {
        serde_json::json!({
            "object": "chat.completion.chunk",
            "choices": [{ "delta": { "content": content } }]
        })
        .to_string()
    }

    fn frames(items: Vec<String>) -> impl Stream<Item = Result<String>> + Unpin {
        stream::iter(items.into_iter().map(Ok))
    }

    #[test]
    fn test_decode_done() {
        assert_eq!(Frame::decode("[DONE]").unwrap(), Frame::Done);
    }

    #[test]
    fn test_decode_delta() {
        assert_eq!(
            Frame::decode(&chunk("1|Сайн")).unwrap(),
            Frame::Delta(Some("1|Сайн".to_string()))
        );
    }

    #[test]
    fn test_decode_delta_without_content() {
        let data = r#"{"object":"chat.completion.chunk","choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(Frame::decode(data).unwrap(), Frame::Delta(None));
    }

    #[test]
    fn test_decode_ignores_other_objects() {
        let data = r#"{"object":"chat.completion","choices":[{"delta":{"content":"x"}}]}"#;
        assert_eq!(Frame::decode(data).unwrap(), Frame::Ignored);

        let empty = r#"{"object":"chat.completion.chunk","choices":[]}"#;
        assert_eq!(Frame::decode(empty).unwrap(), Frame::Ignored);

        let filtered = r#"{"object":"","choices":[],"prompt_filter_results":[]}"#;
        assert_eq!(Frame::decode(filtered).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(
            Frame::decode("{not json"),
            Err(TranslateError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_accumulator_rebuilds_lines() {
        let mut acc = LineAccumulator::new();
        let mut lines = Vec::new();
        for delta in ["1", "|Сайн", " уу", "н\n", "2|Баярла", "лаа\n"] {
            lines.extend(acc.push(delta));
        }
        assert_eq!(lines, vec!["1|Сайн уун", "2|Баярлалаа"]);
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn test_accumulator_splits_multi_line_delta() {
        let mut acc = LineAccumulator::new();
        let lines = acc.push("\n1|a\r\n2|b\n3|c");
        assert_eq!(lines, vec!["1|a", "2|b"]);
        assert_eq!(acc.pending(), "3|c");
        assert_eq!(acc.finish(), Some("3|c".to_string()));
        assert_eq!(acc.pending(), "");
    }

    #[test]
    fn test_parse_line() {
        let parsed = parse_line("2|Баярлалаа", 2).unwrap();
        assert_eq!(parsed.index, 2);
        assert_eq!(parsed.position(), 1);
        assert_eq!(parsed.text, "Баярлалаа");
    }

    #[test]
    fn test_parse_line_splits_on_first_separator() {
        let parsed = parse_line(" 1 |a|b", 1).unwrap();
        assert_eq!(parsed.text, "a|b");
    }

    #[test]
    fn test_parse_line_rejects_malformed() {
        assert!(parse_line("no separator", 3).is_err());
        assert!(parse_line("one|text", 3).is_err());
        assert!(parse_line("0|text", 3).is_err());
        assert!(parse_line("4|text", 3).is_err());
        assert!(parse_line("-1|text", 3).is_err());
        assert!(parse_line("1|   ", 3).is_err());
    }

    #[tokio::test]
    async fn test_consume_fragmented_stream() {
        let data = ["1", "|Сайн", " уу", "н\n", "2|Баярла", "лаа\n"]
            .iter()
            .map(|d| chunk(d))
            .chain(std::iter::once(DONE_MARKER.to_string()))
            .collect();

        let mut applied = Vec::new();
        let summary = consume(frames(data), 2, |line| applied.push(line)).await.unwrap();

        assert_eq!(
            applied,
            vec![
                ParsedLine { index: 1, text: "Сайн уун".to_string() },
                ParsedLine { index: 2, text: "Баярлалаа".to_string() },
            ]
        );
        assert_eq!(summary.parsed, 2);
        assert_eq!(summary.rejected, 0);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn test_consume_skips_malformed_lines() {
        let data = vec![
            chunk("garbage without separator\n"),
            chunk("x|not numeric\n"),
            chunk("9|out of range\n"),
            chunk("2|хоёр\n"),
            "{broken".to_string(),
            chunk("1|нэг"),
            DONE_MARKER.to_string(),
        ];

        let mut applied = Vec::new();
        let summary = consume(frames(data), 2, |line| applied.push((line.index, line.text)))
            .await
            .unwrap();

        assert_eq!(
            applied,
            vec![(2, "хоёр".to_string()), (1, "нэг".to_string())]
        );
        assert_eq!(summary.rejected, 3);
    }

    #[tokio::test]
    async fn test_consume_flushes_trailing_line_at_eof() {
        let data = vec![chunk("1|эцсийн")];
        let mut applied = Vec::new();
        let summary = consume(frames(data), 1, |line| applied.push(line.text)).await.unwrap();

        assert_eq!(applied, vec!["эцсийн".to_string()]);
        assert!(!summary.completed);
    }

    #[tokio::test]
    async fn test_consume_stops_on_transport_error() {
        let items: Vec<Result<String>> = vec![
            Ok(chunk("1|нэг\n2|хо")),
            Err(TranslateError::Api("connection reset".to_string())),
            Ok(chunk("ёр\n")),
        ];

        let mut applied = Vec::new();
        let result = consume(stream::iter(items), 2, |line| applied.push(line.index)).await;

        assert!(result.is_err());
        assert_eq!(applied, vec![1]);
    }

    #[tokio::test]
    async fn test_consume_ignores_content_after_done() {
        let data = vec![chunk("1|a\n"), DONE_MARKER.to_string(), chunk("2|b\n")];
        let mut applied = Vec::new();
        consume(frames(data), 2, |line| applied.push(line.index)).await.unwrap();
        assert_eq!(applied, vec![1]);
    }
}
