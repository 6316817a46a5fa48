//! Prompt augmentation stage
//!
//! Merges retrieved chunks, conversation history, and the system prompt into
//! the final message list sent to the backend. Deterministic: identical
//! inputs always produce identical output.

use crate::message::ChatMessage;
use crate::retrieval::RetrievedChunk;
use std::cmp::Ordering;

/// What augmentation did to this request, for logging and metrics
///
/// `NoMatches` (retrieval ran but nothing cleared the threshold) is
/// deliberately distinct from `Disabled` (no index requested, retrieval
/// skipped entirely).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentOutcome {
    /// No retrieval index was requested; the retriever was never called
    Disabled,
    /// Retrieval ran but returned no chunks above the threshold
    NoMatches,
    /// Context was injected
    Applied {
        /// Chunks included in the context block
        used: usize,
        /// Chunks dropped to fit the character budget
        dropped: usize,
    },
}

fn render_chunk(chunk: &RetrievedChunk) -> String {
    match chunk.metadata.get("file_path").and_then(|v| v.as_str()) {
        Some(path) => format!("{}\nSource: {}", chunk.text, path),
        None => chunk.text.clone(),
    }
}

/// Build the model-ready message list
///
/// Chunks are concatenated in descending relevance order into a context block
/// appended to the system message. Ties keep their original retrieval order.
/// When the rendered block would exceed `budget_chars`, chunks are dropped
/// from the lowest-relevance end first. The single highest-relevance chunk is
/// kept even when it alone exceeds the budget: a chunk that matched the query
/// is worth more than a strictly-met budget. User-authored turns are never
/// truncated.
pub fn augment(
    conversation: &[ChatMessage],
    mut chunks: Vec<RetrievedChunk>,
    system_prompt: &str,
    budget_chars: usize,
) -> (Vec<ChatMessage>, AugmentOutcome) {
    if chunks.is_empty() {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(conversation);
        return (messages, AugmentOutcome::NoMatches);
    }

    // Stable sort: equal scores keep retrieval order
    chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut rendered: Vec<String> = chunks.iter().map(render_chunk).collect();
    let block_len = |parts: &[String]| -> usize {
        parts.iter().map(|p| p.len()).sum::<usize>() + parts.len().saturating_sub(1) * 2
    };

    let mut dropped = 0;
    while rendered.len() > 1 && block_len(&rendered) > budget_chars {
        rendered.pop();
        dropped += 1;
    }

    let context_block = rendered.join("\n\n");
    let system = format!("{}\n\nContext:\n{}", system_prompt, context_block);

    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend_from_slice(conversation);

    (
        messages,
        AugmentOutcome::Applied {
            used: rendered.len(),
            dropped,
        },
    )
}
