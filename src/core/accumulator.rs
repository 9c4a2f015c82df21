//! Folds streamed delta frames into one finalized [`ChatResponse`].
//!
//! Content and reasoning are appended in arrival order. Tool-call fragments
//! are merged per backend-assigned `index` and read back sorted by that index,
//! which is not necessarily the order they arrived in.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::api::{
    ChatResponse, Choice, ResponseMessage, Role, StreamChunk, ToolCall, ToolCallDelta,
    ToolCallFunction, Usage,
};

/// Receives each newly arrived content fragment exactly once.
pub type TokenCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl ToolCallBuilder {
    fn apply(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            if self.id.is_empty() {
                self.id = id.to_string();
            }
        }
        if let Some(kind) = delta.kind.as_deref().filter(|kind| !kind.is_empty()) {
            if self.kind.is_empty() {
                self.kind = kind.to_string();
            }
        }
        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|name| !name.is_empty()) {
                if self.name.is_empty() {
                    self.name = name.to_string();
                }
            }
            if let Some(arguments) = &function.arguments {
                self.arguments.push_str(arguments);
            }
        }
    }

    fn finish(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            kind: if self.kind.is_empty() {
                "function".to_string()
            } else {
                self.kind.clone()
            },
            function: ToolCallFunction {
                name: self.name.clone(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

#[derive(Default)]
struct AccumulatorState {
    id: String,
    object: String,
    created: i64,
    model: String,
    content: String,
    reasoning: String,
    tool_calls: BTreeMap<u32, ToolCallBuilder>,
    finish_reason: String,
    usage: Option<Usage>,
    first_token_at: Option<Instant>,
    last_token_at: Option<Instant>,
    frames: usize,
}

/// Single-owner accumulator for one streamed request.
///
/// Writers are serialized through an internal lock so an in-progress snapshot
/// can be read from another task without observing a torn update.
#[derive(Default)]
pub struct StreamAccumulator {
    state: Mutex<AccumulatorState>,
    on_token: Mutex<Option<TokenCallback>>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(on_token: TokenCallback) -> Self {
        Self {
            state: Mutex::default(),
            on_token: Mutex::new(Some(on_token)),
        }
    }

    fn state(&self) -> MutexGuard<'_, AccumulatorState> {
        // A panicking token callback never holds this lock, so the data is intact.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one delta frame.
    pub fn process_chunk(&self, chunk: &StreamChunk) {
        let mut fragments = Vec::new();
        {
            let mut state = self.state();
            state.frames += 1;
            if state.id.is_empty() && !chunk.id.is_empty() {
                state.id = chunk.id.clone();
                state.object = chunk.object.clone();
                state.created = chunk.created;
                state.model = chunk.model.clone();
            }

            for choice in &chunk.choices {
                let delta = &choice.delta;
                let mut touched = false;

                if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
                    state.content.push_str(content);
                    fragments.push(content.to_string());
                    if state.first_token_at.is_none() {
                        state.first_token_at = Some(Instant::now());
                    }
                    touched = true;
                }

                if let Some(reasoning) = delta.reasoning_content.as_deref().filter(|r| !r.is_empty())
                {
                    state.reasoning.push_str(reasoning);
                    touched = true;
                }

                for tool_delta in delta.tool_calls.iter().flatten() {
                    state
                        .tool_calls
                        .entry(tool_delta.index)
                        .or_default()
                        .apply(tool_delta);
                    touched = true;
                }

                if touched {
                    state.last_token_at = Some(Instant::now());
                }

                if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
                    state.finish_reason = reason.to_string();
                }
            }

            if let Some(usage) = &chunk.usage {
                state.usage = Some(usage.clone());
            }
        }

        if fragments.is_empty() {
            return;
        }
        let mut callback = self
            .on_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(callback) = callback.as_mut() {
            for fragment in &fragments {
                callback(fragment);
            }
        }
    }

    /// Number of frames applied so far.
    pub fn frame_count(&self) -> usize {
        self.state().frames
    }

    /// Whether any content fragment has been applied.
    pub fn has_content(&self) -> bool {
        !self.state().content.is_empty()
    }

    /// Finalized view of everything applied so far.
    ///
    /// Calling this mid-stream returns a consistent partial snapshot.
    pub fn response(&self) -> ChatResponse {
        let state = self.state();

        let content = if state.content.is_empty() {
            state.reasoning.clone()
        } else {
            state.content.clone()
        };
        let tool_calls = state
            .tool_calls
            .values()
            .map(ToolCallBuilder::finish)
            .collect();

        ChatResponse {
            id: state.id.clone(),
            object: state.object.clone(),
            created: state.created,
            model: state.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content,
                    reasoning_content: state.reasoning.clone(),
                    tool_calls,
                },
                finish_reason: state.finish_reason.clone(),
            }],
            usage: state.usage.clone().unwrap_or_default(),
        }
    }

    /// Span between the first content fragment and the most recent fragment.
    pub fn token_generation_duration(&self) -> Option<Duration> {
        let state = self.state();
        match (state.first_token_at, state.last_token_at) {
            (Some(first), Some(last)) => Some(last.saturating_duration_since(first)),
            _ => None,
        }
    }
}
