//! Grounding prompt rendering.

use std::fmt::Write;

use crate::excerpt::Excerpt;

/// Canned reply when retrieval finds nothing to ground an answer in.
pub const NO_CONTEXT_ANSWER: &str = "I'm sorry, I don't have enough context to answer that question.";

const PREAMBLE: &str = "Always cite sources in links only.\n\nAnswer based solely on the following excerpts:\n\n";

/// Question with extracted side text (e.g. OCR of an attached image) appended.
pub fn augment_query(question: &str, extra: Option<&str>) -> String {
    match extra.map(str::trim).filter(|e| !e.is_empty()) {
        Some(extra) => format!("{question}\n\nOCR result:\n{extra}"),
        None => question.to_string(),
    }
}

/// Numbered excerpt blocks followed by the question, ready for a chat model.
pub fn build_prompt(excerpts: &[Excerpt], question: &str) -> String {
    let mut prompt = String::from(PREAMBLE);
    for (i, excerpt) in excerpts.iter().enumerate() {
        let _ = write!(
            prompt,
            "Excerpt [{}] (source: {} | chunk_id: {}):\n{}\n\n",
            i + 1,
            excerpt.metadata.source,
            excerpt.metadata.chunk_id,
            excerpt.text
        );
    }
    let _ = write!(prompt, "QUESTION: {question}\nANSWER:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkMetadata;

    fn excerpt(source: &str, chunk_id: usize, text: &str) -> Excerpt {
        Excerpt {
            text: text.into(),
            metadata: ChunkMetadata::new(source, chunk_id, text),
        }
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt(
            &[excerpt("https://a/#/docker", 0, "Use podman."), excerpt("b.txt", 2, "Or docker.")],
            "Which container tool?",
        );
        assert_eq!(
            prompt,
            "Always cite sources in links only.\n\n\
             Answer based solely on the following excerpts:\n\n\
             Excerpt [1] (source: https://a/#/docker | chunk_id: 0):\nUse podman.\n\n\
             Excerpt [2] (source: b.txt | chunk_id: 2):\nOr docker.\n\n\
             QUESTION: Which container tool?\nANSWER:"
        );
    }

    #[test]
    fn test_empty_excerpts_still_render_question() {
        let prompt = build_prompt(&[], "q");
        assert!(prompt.ends_with("QUESTION: q\nANSWER:"));
        assert!(!prompt.contains("Excerpt ["));
    }

    #[test]
    fn test_augment_query() {
        assert_eq!(augment_query("q", None), "q");
        assert_eq!(augment_query("q", Some("  ")), "q");
        assert_eq!(augment_query("q", Some("img text")), "q\n\nOCR result:\nimg text");
    }
}
