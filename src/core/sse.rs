//! Server-Sent-Events transport reader.
//!
//! Bytes are split into lines, lines are folded into `(event, data)` pairs,
//! and each completed pair is handed to a caller-supplied handler. `id:`,
//! `retry:` and comment lines are ignored. Any other line is kept (up to
//! [`UNPARSED_CAP`] bytes) so a body that was never an event stream can still
//! be reported.

use std::ops::ControlFlow;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use tokio::time::Instant;

use crate::core::error::{ChatError, Result};

/// Bytes of non-SSE text retained per stream.
pub const UNPARSED_CAP: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Empty when no `event:` line preceded the data.
    pub event: String,
    pub data: String,
}

/// Splits a byte stream into trimmed lines, keeping blank lines because they
/// terminate events.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = memchr(b'\n', &self.buffer[search_index..]) {
            let newline_index = search_index + relative_pos;
            // Lines that are not UTF-8 are dropped.
            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..newline_index]) {
                lines.push(text.trim().to_string());
            }
            search_index = newline_index + 1;
        }

        if flush {
            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

fn sse_event_name(line: &str) -> Option<&str> {
    line.strip_prefix("event:").map(str::trim)
}

fn is_ignored_field(line: &str) -> bool {
    line.starts_with(':') || line.starts_with("id:") || line.starts_with("retry:")
}

/// Incremental SSE parser: feed it chunks, collect completed events.
#[derive(Default)]
pub struct SseParser {
    lines: SseLineBuffer,
    event: String,
    data: String,
    unparsed: String,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let lines = self.lines.push(chunk);
        lines
            .iter()
            .filter_map(|line| self.feed_line(line))
            .collect()
    }

    /// Drain the trailing partial line and flush any pending data.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let lines = self.lines.finish();
        let mut events: Vec<SseEvent> = lines
            .iter()
            .filter_map(|line| self.feed_line(line))
            .collect();
        events.extend(self.flush());
        events
    }

    /// Lines that were not SSE fields, newline-joined and capped.
    pub fn unparsed(&self) -> &str {
        &self.unparsed
    }

    fn keep_unparsed(&mut self, line: &str) {
        let room = UNPARSED_CAP.saturating_sub(self.unparsed.len() + 1);
        if room == 0 {
            return;
        }
        let mut end = line.len().min(room);
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        if !self.unparsed.is_empty() {
            self.unparsed.push('\n');
        }
        self.unparsed.push_str(&line[..end]);
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.flush();
        }

        if let Some(name) = sse_event_name(line) {
            self.event = name.to_string();
        } else if let Some(payload) = sse_data_payload(line) {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(payload);
        } else if !is_ignored_field(line) {
            self.keep_unparsed(line);
        }
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data),
        })
    }
}

/// Deadlines applied while draining a stream. Either one elapsing yields
/// [`ChatError::Timeout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SseReadOptions {
    /// Longest silence tolerated between two reads.
    pub idle_timeout: Option<Duration>,
    /// Upper bound on the whole drain.
    pub total_timeout: Option<Duration>,
}

fn next_wait(
    options: &SseReadOptions,
    deadline: Option<Instant>,
) -> Option<(Duration, ChatError)> {
    let idle = options.idle_timeout.map(|idle| {
        (
            idle,
            ChatError::Timeout(format!("no stream data received for {}s", idle.as_secs_f64())),
        )
    });
    let total = deadline.zip(options.total_timeout).map(|(deadline, total)| {
        (
            deadline.saturating_duration_since(Instant::now()),
            ChatError::Timeout(format!(
                "stream did not finish within {}s",
                total.as_secs_f64()
            )),
        )
    });

    match (idle, total) {
        (Some(idle), Some(total)) => Some(if total.0 < idle.0 { total } else { idle }),
        (idle, total) => idle.or(total),
    }
}

/// What a completed drain saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseSummary {
    /// Events handed to the handler.
    pub events: usize,
    /// See [`SseParser::unparsed`].
    pub unparsed: String,
}

/// Drain `stream`, invoking `handler` for every completed event.
///
/// The handler stops the drain early with `ControlFlow::Break`, or aborts it
/// by returning an error, which is propagated unchanged.
pub async fn read_sse_stream<S, B, E, F>(
    stream: S,
    options: SseReadOptions,
    mut handler: F,
) -> Result<SseSummary>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ChatError>,
    F: FnMut(SseEvent) -> Result<ControlFlow<()>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut parser = SseParser::default();
    let deadline = options.total_timeout.map(|total| Instant::now() + total);
    let mut events = 0;

    loop {
        let item = match next_wait(&options, deadline) {
            Some((limit, timeout_err)) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(item) => item,
                Err(_) => return Err(timeout_err),
            },
            None => stream.next().await,
        };

        let Some(chunk) = item else {
            break;
        };
        let chunk = chunk.map_err(Into::into)?;

        for event in parser.push(chunk.as_ref()) {
            events += 1;
            if handler(event)?.is_break() {
                return Ok(summary(events, parser));
            }
        }
    }

    for event in parser.finish() {
        events += 1;
        if handler(event)?.is_break() {
            break;
        }
    }

    Ok(summary(events, parser))
}

fn summary(events: usize, parser: SseParser) -> SseSummary {
    SseSummary {
        events,
        unparsed: parser.unparsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn parse_all(input: &str) -> Vec<SseEvent> {
        let mut parser = SseParser::default();
        let mut events = parser.push(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    fn chunks(parts: &[&str]) -> Vec<std::result::Result<Vec<u8>, ChatError>> {
        parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect()
    }

    #[test]
    fn sse_buffer_handles_partial_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: one").is_empty());
        assert_eq!(buffer.push(b"\r\n\n"), vec!["data: one", ""]);
        assert!(buffer.finish().is_empty());
    }

    #[test]
    fn single_data_line_yields_one_unnamed_event() {
        let events = parse_all("data: {\"text\":\"Hello\"}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: String::new(),
                data: "{\"text\":\"Hello\"}".to_string(),
            }]
        );
    }

    #[test]
    fn event_line_names_the_following_data() {
        let events = parse_all("event: message\ndata: payload\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "payload");
    }

    #[test]
    fn multiline_data_is_joined_with_newlines() {
        let events = parse_all("data: first\ndata: second\ndata: third\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond\nthird");
    }

    #[test]
    fn unknown_fields_and_comments_are_ignored() {
        let events = parse_all(": keepalive\nid: 7\nretry: 100\ndata: ok\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn blank_line_without_data_resets_event_name() {
        let events = parse_all("event: ping\n\ndata: after\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "");
        assert_eq!(events[0].data, "after");
    }

    #[test]
    fn end_of_stream_flushes_pending_data_once() {
        let events = parse_all("data: a\n\ndata: tail");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "tail");
    }

    #[test]
    fn events_split_across_chunks_are_reassembled() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"da").is_empty());
        assert!(parser.push(b"ta: hel").is_empty());
        assert!(parser.push(b"lo\n").is_empty());
        let events = parser.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn extracts_sse_payload() {
        assert_eq!(sse_data_payload("data: {\"id\":1}"), Some("{\"id\":1}"));
        assert_eq!(sse_data_payload("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data_payload("event: ping"), None);
    }

    #[tokio::test]
    async fn reader_delivers_events_in_order() {
        let body = stream::iter(chunks(&["data: one\n\nda", "ta: two\n\n", "data: three"]));
        let mut seen = Vec::new();
        read_sse_stream(body, SseReadOptions::default(), |event| {
            seen.push(event.data);
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn handler_error_aborts_the_read() {
        let body = stream::iter(chunks(&["data: one\n\ndata: two\n\n"]));
        let mut calls = 0;
        let err = read_sse_stream(body, SseReadOptions::default(), |_| {
            calls += 1;
            Err(ChatError::ProtocolViolation("stop".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::ProtocolViolation(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn non_sse_lines_are_kept_for_diagnostics() {
        let mut parser = SseParser::default();
        parser.push(b": keep-alive\nid: 7\n{\"error\":\n");
        parser.push(b"  {\"message\":\"down\"}}");
        assert!(parser.finish().is_empty());
        assert_eq!(parser.unparsed(), "{\"error\":\n{\"message\":\"down\"}}");
    }

    #[test]
    fn unparsed_text_is_capped_on_a_char_boundary() {
        let mut parser = SseParser::default();
        let line = "é".repeat(UNPARSED_CAP);
        parser.push(line.as_bytes());
        parser.push(b"\n");
        assert!(parser.unparsed().len() <= UNPARSED_CAP);
        assert!(parser.unparsed().len() > UNPARSED_CAP - 4);
        assert!(parser.unparsed().chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn summary_counts_events_and_keeps_stray_text() {
        let body = stream::iter(chunks(&["<html>\n", "data: one\n\n", "data: two\n\n"]));
        let summary = read_sse_stream(body, SseReadOptions::default(), |_| {
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.unparsed, "<html>");
    }

    #[tokio::test]
    async fn handler_break_ends_the_read_normally() {
        let body = stream::iter(chunks(&["data: one\n\ndata: two\n\n"])).chain(stream::pending());
        let mut seen = Vec::new();
        read_sse_stream(body, SseReadOptions::default(), |event| {
            seen.push(event.data);
            Ok(ControlFlow::Break(()))
        })
        .await
        .unwrap();
        assert_eq!(seen, vec!["one"]);
    }

    #[tokio::test]
    async fn stream_errors_are_propagated() {
        let body = stream::iter(vec![
            Ok(b"data: one\n\n".to_vec()),
            Err(ChatError::TransientNetwork("connection reset".into())),
        ]);
        let err = read_sse_stream(body, SseReadOptions::default(), |_| {
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::TransientNetwork(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_deadline_bounds_a_silent_backend() {
        let body = stream::iter(chunks(&["data: one\n\n"])).chain(stream::pending());
        let options = SseReadOptions {
            idle_timeout: Some(Duration::from_secs(30)),
            total_timeout: None,
        };
        let started = Instant::now();
        let mut seen = 0;
        let err = read_sse_stream(body, options, |_| {
            seen += 1;
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
        assert_eq!(seen, 1);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn total_deadline_applies_even_while_data_flows() {
        let ticks = stream::unfold(0u32, |n| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Some((Ok::<_, ChatError>(format!("data: {n}\n\n").into_bytes()), n + 1))
        });
        let options = SseReadOptions {
            idle_timeout: Some(Duration::from_secs(5)),
            total_timeout: Some(Duration::from_secs(10)),
        };
        let mut seen = 0;
        let err = read_sse_stream(ticks, options, |_| {
            seen += 1;
            Ok(ControlFlow::Continue(()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Timeout(message) if message.contains("did not finish")));
        assert!((9..=10).contains(&seen));
    }
}
