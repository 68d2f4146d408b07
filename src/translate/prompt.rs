use serde::Serialize;

/// Fixed instruction sent with every batch.
pub const SYSTEM_PROMPT: &str = r#"You are a translation expert in the Mongolian Cyrillic language.

You will be provided English text, along with its index in the list.
Each line of text needs a Mongolian Cyrillic translation along with the original index.

RULES:
  - The order of the output MUST match the order of the inputs.
  - Each output must contain the row index copied from the input
  - The output must only contain the translated text, and the row index.

Here's an example:

Input:
1|What time is it?
2|Is it hot today?

Output:
1|Цаг хэд болж байна?
2|Өнөөдөр халуун байна уу?"#;

/// Render a batch as newline-prefixed `<k>|<text>` lines, `k` starting at 1.
///
/// Embedded newlines are collapsed to spaces so each item stays on one line.
/// The body starts with a blank line, which the far end tolerates.
pub fn encode_batch<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .enumerate()
        .fold(String::new(), |mut body, (i, text)| {
            body.push('\n');
            body.push_str(&format!("{}|{}", i + 1, collapse_newlines(text.as_ref())));
            body
        })
}

fn collapse_newlines(text: &str) -> String {
    text.replace('\n', " ")
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatRequest {
    /// Streaming request pairing [`SYSTEM_PROMPT`] with the encoded batch.
    pub fn for_batch<S: AsRef<str>>(texts: &[S]) -> Self {
        Self {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: encode_batch(texts),
                },
            ],
            stream: true,
        }
    }

    /// The encoded batch carried in the user message.
    pub fn user_content(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}
