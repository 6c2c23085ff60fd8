//! Heading-aware paragraph chunker for prose documents.
//!
//! Three-stage strategy:
//! 1. Split at blank lines (natural paragraph boundaries)
//! 2. Merge short heading-like paragraphs into the paragraph that follows
//! 3. Greedily pack paragraphs into chunks up to the character budget,
//!    hard-slicing oversized paragraphs into overlapping windows

/// Heading-indicator phrases. A short paragraph containing one of these (or
/// ending with a colon) is a section heading; a heading alone carries no
/// retrievable content, so it is glued to the paragraph after it.
const HEADING_PHRASES: [&str; 4] = [
    "learning outcomes",
    "intended learning outcomes",
    "aims",
    "assessment",
];

const MAX_HEADING_LEN: usize = 80;

/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Consecutive windows cut from a single oversized paragraph share `overlap`
/// characters so context survives the cut. Precondition: `overlap <
/// chunk_size` (enforced by `Config::validate`); the step below stays
/// positive so the slice loop always makes forward progress.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size, "overlap must be < chunk_size");

    let paras = split_paragraphs(text);
    let merged = merge_headings(paras);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in merged {
        if current.len() + para.len() + 2 <= chunk_size {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&para);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        // Hard-slice paragraphs that alone exceed the budget
        let mut rest = para;
        while rest.chars().count() > chunk_size {
            let window: String = rest.chars().take(chunk_size).collect();
            chunks.push(window);
            rest = rest.chars().skip(chunk_size - overlap).collect();
        }
        current = rest;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split on blank-line boundaries, trimming each paragraph and dropping
/// whitespace-only ones. Empty input yields an empty list, not an error.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paras = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paras.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paras.push(current.join("\n").trim().to_string());
    }

    paras.retain(|p| !p.is_empty());
    paras
}

fn is_heading(para: &str) -> bool {
    if para.chars().count() > MAX_HEADING_LEN {
        return false;
    }
    if para.ends_with(':') {
        return true;
    }
    // Word-boundary match: "claims" must not trigger the "aims" phrase.
    let words: Vec<String> = para
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let normalized = format!(" {} ", words.join(" "));
    HEADING_PHRASES
        .iter()
        .any(|phrase| normalized.contains(&format!(" {phrase} ")))
}

/// Attach heading-like paragraphs to the paragraph that follows them.
fn merge_headings(paras: Vec<String>) -> Vec<String> {
    let mut merged = Vec::with_capacity(paras.len());
    let mut iter = paras.into_iter().peekable();

    while let Some(para) = iter.next() {
        if is_heading(&para) {
            if let Some(next) = iter.next() {
                merged.push(format!("{para}\n{next}"));
                continue;
            }
        }
        merged.push(para);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_text("", 600, 120).is_empty());
        assert!(split_text("   \n\n  \n", 600, 120).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("just one paragraph", 600, 120);
        assert_eq!(chunks, vec!["just one paragraph".to_string()]);
    }

    #[test]
    fn test_every_chunk_within_budget() {
        let text: String = (0..40)
            .map(|i| format!("Paragraph number {i} with a fair amount of text in it."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, 200, 40);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= 200,
                "chunk exceeded budget: {} chars",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn test_no_content_lost() {
        let text = "alpha beta gamma\n\ndelta epsilon\n\nzeta eta theta iota";
        let chunks = split_text(text, 25, 5);
        let joined: String = chunks.concat();
        for word in ["alpha", "gamma", "delta", "epsilon", "zeta", "iota"] {
            assert!(joined.contains(word), "lost word: {word}");
        }
    }

    #[test]
    fn test_heading_never_standalone() {
        let text = "Learning outcomes:\n\nStudents will be able to explain recursion.";
        let chunks = split_text(text, 600, 120);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Learning outcomes:"));
        assert!(chunks[0].contains("recursion"));
    }

    #[test]
    fn test_heading_phrase_without_colon_merged() {
        let text = "Intended Learning Outcomes\n\nExplain what a closure captures.";
        let chunks = split_text(text, 600, 120);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("closure"));
    }

    #[test]
    fn test_trailing_heading_kept() {
        // A heading with no following paragraph still must not be dropped.
        let chunks = split_text("Assessment:", 600, 120);
        assert_eq!(chunks, vec!["Assessment:".to_string()]);
    }

    #[test]
    fn test_long_paragraph_hard_sliced_with_overlap() {
        let para = "x".repeat(1000);
        let chunks = split_text(&para, 300, 50);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 300);
        }
        // Window 0 ends where window 1 begins minus the overlap
        assert_eq!(chunks[0].chars().count(), 300);
        assert!(chunks[1].starts_with('x'));
    }

    #[test]
    fn test_overlap_repeats_content_across_cut() {
        let para: String = ('a'..='z').cycle().take(500).collect();
        let chunks = split_text(&para, 200, 40);
        let first_tail: String = chunks[0].chars().skip(160).collect();
        let second_head: String = chunks[1].chars().take(40).collect();
        assert_eq!(first_tail, second_head);
    }

    #[test]
    fn test_long_non_heading_line_not_merged() {
        let long_line = "a".repeat(100) + ":";
        let text = format!("{long_line}\n\nfollowing paragraph");
        let chunks = split_text(&text, 600, 120);
        // Over 80 chars, so treated as an ordinary paragraph
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("following paragraph"));
    }
}
