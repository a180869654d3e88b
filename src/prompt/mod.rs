//! Prompt assembly for the three ingress kinds (spec §4.5, §2 "prompt assembler").

use crate::types::{ChatContext, ChatMessage, Role, SearchHit};

const RAG_SYSTEM_PREAMBLE: &str = "You are a careful reader answering questions about a book using only the passages provided below. If the passages do not contain the answer, say so plainly.";

const CONTINUE_SYSTEM_PREAMBLE: &str = "Continue the story below, preserving its established voice, tense, and characters. Write only the continuation, not a summary.";

/// Assemble the prompt for `rag_stream`: retrieved passages + the question.
pub fn rag_prompt(question: &str, hits: &[SearchHit]) -> String {
    let mut passages = String::new();
    for (i, hit) in hits.iter().enumerate() {
        passages.push_str(&format!("[{}] {}\n\n", i + 1, hit.chunk.text));
    }
    format!("{RAG_SYSTEM_PREAMBLE}\n\nPassages:\n{passages}Question: {question}\n")
}

/// Assemble the prompt for `chat_stream`: persisted context + new turn.
pub fn chat_prompt(context: &ChatContext, messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    if let Some(summary) = &context.summary {
        out.push_str(&format!("Summary of earlier conversation: {}\n\n", summary.text));
    }
    for m in &context.messages {
        out.push_str(&format!("{}: {}\n", role_label(m.role), m.content));
    }
    for m in messages {
        out.push_str(&format!("{}: {}\n", role_label(m.role), m.content));
    }
    out
}

/// Assemble the prompt for `continue_stream`: style-preservation + seed text.
pub fn continue_prompt(prompt: &str) -> String {
    format!("{CONTINUE_SYSTEM_PREAMBLE}\n\n{prompt}")
}

/// The system prompt handed to the summarizer when compaction triggers
/// (spec §4.3 "delegated to the LLM with the system-configured summarizer prompt").
pub fn summarizer_prompt(existing_summary: Option<&str>, messages: &[ChatMessage]) -> String {
    let mut out = String::from(
        "Summarize the conversation so far in a few sentences, preserving any facts, decisions, or open questions a later turn would need.\n\n",
    );
    if let Some(summary) = existing_summary {
        out.push_str(&format!("Existing summary: {summary}\n\n"));
    }
    out.push_str("Messages to fold in:\n");
    for m in messages {
        out.push_str(&format!("{}: {}\n", role_label(m.role), m.content));
    }
    out
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    #[test]
    fn rag_prompt_includes_question_and_passages() {
        let hits = vec![SearchHit {
            chunk: Chunk::new(0, "the dragon slept"),
            score: 1.0,
            keyword_score: 1.0,
            vector_score: 0.0,
            method: crate::types::SearchMethod::Hybrid,
        }];
        let prompt = rag_prompt("what did the dragon do?", &hits);
        assert!(prompt.contains("the dragon slept"));
        assert!(prompt.contains("what did the dragon do?"));
    }

    #[test]
    fn continue_prompt_wraps_seed_text() {
        let prompt = continue_prompt("Once upon a time");
        assert!(prompt.contains("Once upon a time"));
        assert!(prompt.contains("Continue"));
    }
}
