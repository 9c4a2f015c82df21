//! Decoding of individual `data:` payloads into delta frames.

use serde_json::Value;
use tracing::warn;

use crate::api::StreamChunk;
use crate::core::error::{extract_error_summary, ChatError, Result};

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug)]
pub enum Frame {
    /// The backend signalled a normal end of stream.
    Done,
    Chunk(Box<StreamChunk>),
    /// Nothing usable in this payload (blank, or malformed in lenient mode).
    Skip,
}

/// Decode one SSE data payload.
///
/// Payloads that carry an `error` member and no `choices` are backend
/// failures and become [`ChatError::Http`]. Malformed JSON is skipped with a
/// warning unless `strict` is set.
pub fn decode_frame(payload: &str, provider: &str, strict: bool) -> Result<Frame> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(Frame::Skip);
    }
    if payload == DONE_SENTINEL {
        return Ok(Frame::Done);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => return malformed(payload, provider, strict, err),
    };

    if value.get("error").is_some() && value.get("choices").is_none() {
        let message = extract_error_summary(&value).unwrap_or_else(|| payload.to_string());
        let status = value
            .pointer("/error/code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        return Err(ChatError::Http {
            status,
            provider: provider.to_string(),
            message,
        });
    }

    match serde_json::from_value::<StreamChunk>(value) {
        Ok(chunk) => Ok(Frame::Chunk(Box::new(chunk))),
        Err(err) => malformed(payload, provider, strict, err),
    }
}

fn malformed(
    payload: &str,
    provider: &str,
    strict: bool,
    err: serde_json::Error,
) -> Result<Frame> {
    if strict {
        return Err(ChatError::Parse(format!("invalid stream frame: {err}")));
    }
    warn!(provider, error = %err, payload_len = payload.len(), "skipping malformed stream frame");
    Ok(Frame::Skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel_is_a_normal_end() {
        assert!(matches!(decode_frame("[DONE]", "openai", true), Ok(Frame::Done)));
        assert!(matches!(decode_frame(" [DONE] ", "openai", false), Ok(Frame::Done)));
    }

    #[test]
    fn delta_frames_decode_to_chunks() {
        let frame = decode_frame(
            r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
            "openai",
            true,
        )
        .unwrap();
        let Frame::Chunk(chunk) = frame else {
            panic!("expected chunk");
        };
        assert_eq!(chunk.id, "c1");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
    }

    #[test]
    fn malformed_frames_are_skipped_when_lenient() {
        assert!(matches!(decode_frame("{not json", "groq", false), Ok(Frame::Skip)));
        assert!(matches!(
            decode_frame(r#"{"choices":"nope"}"#, "groq", false),
            Ok(Frame::Skip)
        ));
    }

    #[test]
    fn malformed_frames_abort_when_strict() {
        assert!(matches!(
            decode_frame("{not json", "groq", true),
            Err(ChatError::Parse(_))
        ));
    }

    #[test]
    fn error_payloads_surface_backend_message() {
        let err = decode_frame(
            r#"{"error":{"message":"Provider overloaded","code":503}}"#,
            "openrouter",
            false,
        )
        .unwrap_err();
        match err {
            ChatError::Http {
                status,
                provider,
                message,
            } => {
                assert_eq!(status, 503);
                assert_eq!(provider, "openrouter");
                assert_eq!(message, "Provider overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_payloads_are_skipped() {
        assert!(matches!(decode_frame("   ", "openai", true), Ok(Frame::Skip)));
    }
}
