//! SSE (Server-Sent Events) line parser for OpenAI-compatible streaming.
//!
//! Parses the `data:` lines from an SSE stream into [`StreamChunk`] values.
//! The streaming format sends lines like:
//!
//! ```text
//! data: {"id":"...","choices":[{"delta":{"content":"Hello"},...}],...}
//!
//! data: {"id":"...","choices":[{"delta":{"content":" world"},...}],...}
//!
//! data: [DONE]
//! ```

use serde::Deserialize;

use crate::error::{ProviderError, Result};
use crate::types::StreamChunk;

/// The sentinel value that marks the end of an SSE stream.
const DONE_SENTINEL: &str = "[DONE]";

/// A streaming delta message, mirroring the `chat.completion.chunk` format.
#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    choices: Vec<StreamDeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamDeltaChoice {
    #[serde(default)]
    delta: StreamDeltaContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a single SSE line into zero or more [`StreamChunk`] values.
///
/// Returns `Ok(vec![])` for empty lines (event boundaries), comment lines,
/// `event:`/`id:`/`retry:` lines, and `data:` lines with empty payloads.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidResponse`] if a `data:` line contains
/// JSON that cannot be parsed as a streaming delta.
pub fn parse_sse_line(line: &str) -> Result<Vec<StreamChunk>> {
    let line = line.trim_end();

    if line.is_empty() || line.starts_with(':') {
        return Ok(vec![]);
    }

    let payload = if let Some(rest) = line.strip_prefix("data:") {
        rest.trim_start()
    } else {
        // event:, id:, retry: lines
        return Ok(vec![]);
    };

    if payload.is_empty() {
        return Ok(vec![]);
    }

    if payload == DONE_SENTINEL {
        return Ok(vec![StreamChunk::Done]);
    }

    let delta: StreamDelta = serde_json::from_str(payload)
        .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse SSE delta: {e}")))?;

    let mut chunks = Vec::new();
    if let Some(choice) = delta.choices.first() {
        if let Some(ref text) = choice.delta.content
            && !text.is_empty()
        {
            chunks.push(StreamChunk::TextDelta(text.clone()));
        }
        if choice.finish_reason.is_some() {
            chunks.push(StreamChunk::Done);
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_returns_empty() {
        assert!(parse_sse_line("").unwrap().is_empty());
        assert!(parse_sse_line("   ").unwrap().is_empty());
    }

    #[test]
    fn comment_and_meta_lines_skipped() {
        assert!(parse_sse_line(": keepalive").unwrap().is_empty());
        assert!(parse_sse_line("event: message").unwrap().is_empty());
        assert!(parse_sse_line("id: 123").unwrap().is_empty());
        assert!(parse_sse_line("retry: 1000").unwrap().is_empty());
    }

    #[test]
    fn data_empty_payload_returns_empty() {
        assert!(parse_sse_line("data:").unwrap().is_empty());
        assert!(parse_sse_line("data: ").unwrap().is_empty());
    }

    #[test]
    fn done_sentinel() {
        let chunks = parse_sse_line("data: [DONE]").unwrap();
        assert_eq!(chunks, vec![StreamChunk::Done]);
    }

    #[test]
    fn done_sentinel_no_space() {
        let chunks = parse_sse_line("data:[DONE]").unwrap();
        assert_eq!(chunks, vec![StreamChunk::Done]);
    }

    #[test]
    fn text_delta() {
        let line = r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let chunks = parse_sse_line(line).unwrap();
        assert_eq!(chunks, vec![StreamChunk::TextDelta("Hello".into())]);
    }

    #[test]
    fn empty_content_delta_skipped() {
        let line = r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":""},"finish_reason":null}]}"#;
        assert!(parse_sse_line(line).unwrap().is_empty());
    }

    #[test]
    fn role_only_delta_no_content() {
        // First chunk often has role but no content.
        let line = r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert!(parse_sse_line(line).unwrap().is_empty());
    }

    #[test]
    fn finish_reason_yields_done() {
        let line = r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let chunks = parse_sse_line(line).unwrap();
        assert_eq!(chunks, vec![StreamChunk::Done]);
    }

    #[test]
    fn text_and_finish_in_same_delta() {
        let line = r#"data: {"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":"stop"}]}"#;
        let chunks = parse_sse_line(line).unwrap();
        assert_eq!(
            chunks,
            vec![StreamChunk::TextDelta("!".into()), StreamChunk::Done]
        );
    }

    #[test]
    fn invalid_json_returns_error() {
        let err = parse_sse_line("data: {not valid json}").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn data_with_no_choices() {
        let line = r#"data: {"id":"chatcmpl-1","choices":[]}"#;
        assert!(parse_sse_line(line).unwrap().is_empty());
    }

    #[test]
    fn parse_full_stream() {
        let stream = [
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}",
            "",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}",
            "",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" world\"},\"finish_reason\":null}]}",
            "",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}",
            "",
            "data: [DONE]",
        ];

        let mut all: Vec<StreamChunk> = Vec::new();
        for line in &stream {
            all.extend(parse_sse_line(line).unwrap());
        }
        assert_eq!(
            all,
            vec![
                StreamChunk::TextDelta("Hello".into()),
                StreamChunk::TextDelta(" world".into()),
                StreamChunk::Done,
                StreamChunk::Done,
            ]
        );
    }
}
