//! Prompt composition: intent detection, greeting short-circuit, and the
//! grounded prompt with circled citation markers.

use std::sync::OnceLock;

use regex::RegexSet;

use crate::error::{AssistantError, Result};
use crate::models::{ChatMode, RetrievalCandidate, SourceCitation};

/// Passage count and snippet length tighten in fast mode to cut prompt size.
const MAX_PASSAGES: usize = 4;
const MAX_PASSAGES_FAST: usize = 3;
const SNIPPET_CHARS: usize = 1_200;
const SNIPPET_CHARS_FAST: usize = 800;

/// Inputs longer than this are never treated as greetings; a real question
/// that happens to open with "hi" should reach the full pipeline.
const MAX_GREETING_LEN: usize = 30;

/// Coarse intent classes, each steering the system instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    AssignmentHelp,
    ConceptClarification,
    ExamPreparation,
    StudyPlanning,
    ProgressFeedback,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AssignmentHelp => "assignment_help",
            Intent::ConceptClarification => "concept_clarification",
            Intent::ExamPreparation => "exam_preparation",
            Intent::StudyPlanning => "study_planning",
            Intent::ProgressFeedback => "progress_feedback",
            Intent::General => "general",
        }
    }
}

const ASSIGNMENT_KEYWORDS: [&str; 7] = [
    "assignment",
    "homework",
    "coursework",
    "submission",
    "submit",
    "deadline",
    "due date",
];

const EXAM_KEYWORDS: [&str; 7] = [
    "exam", "test", "quiz", "revision", "revise", "midterm", "final",
];

const PLANNING_KEYWORDS: [&str; 6] = [
    "study plan",
    "schedule",
    "timetable",
    "organize",
    "organise",
    "how should i study",
];

const PROGRESS_KEYWORDS: [&str; 6] = [
    "progress",
    "feedback",
    "grade",
    "mark",
    "how am i doing",
    "score",
];

const CONCEPT_KEYWORDS: [&str; 8] = [
    "explain",
    "what is",
    "what are",
    "how does",
    "how do",
    "define",
    "understand",
    "clarify",
];

/// Classify a message into an intent by keyword scan. First matching class
/// wins, checked from the most specific (assignment, exam) to the most
/// generic (concept).
pub fn detect_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();

    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if contains_any(&ASSIGNMENT_KEYWORDS) {
        Intent::AssignmentHelp
    } else if contains_any(&EXAM_KEYWORDS) {
        Intent::ExamPreparation
    } else if contains_any(&PLANNING_KEYWORDS) {
        Intent::StudyPlanning
    } else if contains_any(&PROGRESS_KEYWORDS) {
        Intent::ProgressFeedback
    } else if contains_any(&CONCEPT_KEYWORDS) {
        Intent::ConceptClarification
    } else {
        Intent::General
    }
}

fn greeting_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)^\s*(hi|hiya|hello|hey|yo|howdy)\s*[!.?]*\s*$",
            r"(?i)^\s*good\s+(morning|afternoon|evening|day)\s*[!.?]*\s*$",
            r"(?i)^\s*(thanks|thank\s+you|thx|cheers)\s*[!.?]*\s*$",
            r"(?i)^\s*(ok|okay|cool|great|nice|sure)\s*[!.?]*\s*$",
            r"(?i)^\s*(bye|goodbye|see\s+you|good\s+night)\s*[!.?]*\s*$",
            r"(?i)^\s*how\s+are\s+you\s*[!.?]*\s*$",
        ])
        .expect("greeting patterns are valid regexes")
    })
}

/// Detect a greeting or chitchat message that should be answered with a
/// canned reply instead of running retrieval and generation.
pub fn is_greeting_or_chitchat(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.chars().count() > MAX_GREETING_LEN {
        return false;
    }
    greeting_patterns().is_match(trimmed)
}

pub fn greeting_reply() -> String {
    "Hello! I'm your course assistant. Ask me anything about your course materials, \
     assignments, or exam preparation."
        .to_string()
}

/// A fully composed generation prompt plus the citations that back it.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub sources: Vec<SourceCitation>,
    pub intent: Intent,
}

/// Compose the generation prompt for one user message.
///
/// In `docs` mode the prompt embeds the top retrieved passages, each tagged
/// with a circled marker (①, ②, ...) the model is instructed to cite. Empty
/// candidates in docs mode are a `NoContext` error so the route layer can
/// answer honestly instead of letting the model improvise. `coach` and
/// `facts` modes never see passages.
pub fn compose(
    user_message: &str,
    candidates: &[RetrievalCandidate],
    conversation_context: Option<&str>,
    mode: ChatMode,
    fast_mode: bool,
) -> Result<ComposedPrompt> {
    let intent = detect_intent(user_message);

    if !mode.uses_retrieval() {
        return Ok(ComposedPrompt {
            prompt: compose_without_context(user_message, conversation_context, mode),
            sources: Vec::new(),
            intent,
        });
    }

    if candidates.is_empty() {
        return Err(AssistantError::NoContext);
    }

    let (max_passages, snippet_chars) = if fast_mode {
        (MAX_PASSAGES_FAST, SNIPPET_CHARS_FAST)
    } else {
        (MAX_PASSAGES, SNIPPET_CHARS)
    };

    let mut context_block = String::new();
    let mut sources = Vec::new();

    for (i, candidate) in candidates.iter().take(max_passages).enumerate() {
        let marker = citation_marker(i);
        let snippet: String = candidate.text.chars().take(snippet_chars).collect();
        context_block.push_str(&format!("{marker} {snippet}\n\n"));
        sources.push(format!(
            "{marker} {} (chunk {})",
            candidate.metadata.file, candidate.metadata.chunk
        ));
    }

    let mut prompt = String::new();
    prompt.push_str(intent_instruction(intent));
    prompt.push_str(
        "\n\nAnswer using ONLY the course material excerpts below. Cite the excerpts \
         you used with their markers (e.g. ①). If the excerpts do not contain the \
         answer, say so plainly instead of guessing.\n\n",
    );
    prompt.push_str("Course material:\n");
    prompt.push_str(&context_block);

    if let Some(context) = conversation_context {
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!("Student question: {user_message}\n\nAnswer:"));

    Ok(ComposedPrompt {
        prompt,
        sources,
        intent,
    })
}

/// Circled-digit citation marker: index 0 → ①, 1 → ②, ... Falls back to a
/// bracketed number past ⑳ (20 passages will not happen with current caps).
pub fn citation_marker(index: usize) -> String {
    if index < 20 {
        char::from_u32(0x2460 + index as u32)
            .map(String::from)
            .unwrap_or_else(|| format!("[{}]", index + 1))
    } else {
        format!("[{}]", index + 1)
    }
}

fn intent_instruction(intent: Intent) -> &'static str {
    match intent {
        Intent::AssignmentHelp => {
            "You are a course assistant helping a student with an assignment. Guide them \
             toward the solution with hints and references to the material; do not write \
             the assignment for them."
        }
        Intent::ConceptClarification => {
            "You are a course assistant. Explain the concept clearly, starting from what \
             the material says, with a short example where it helps."
        }
        Intent::ExamPreparation => {
            "You are a course assistant helping a student prepare for an exam. Focus on \
             what the material flags as assessed content and suggest how to practice it."
        }
        Intent::StudyPlanning => {
            "You are a course assistant helping a student plan their study time. Give \
             concrete, ordered steps grounded in the course material."
        }
        Intent::ProgressFeedback => {
            "You are a course assistant discussing a student's progress. Be encouraging \
             and specific, pointing at material they can use to improve."
        }
        Intent::General => {
            "You are a helpful course assistant. Answer the student's question using the \
             course material."
        }
    }
}

fn compose_without_context(
    user_message: &str,
    conversation_context: Option<&str>,
    mode: ChatMode,
) -> String {
    let persona = match mode {
        ChatMode::Coach => {
            "You are a supportive study coach. Help the student build motivation and good \
             study habits. Do not invent course-specific facts; for course content, tell \
             them to ask in documents mode."
        }
        ChatMode::Facts => {
            "You are a concise assistant. Answer the question factually in a few \
             sentences, without speculation."
        }
        ChatMode::Docs => "You are a helpful course assistant.",
    };

    let mut prompt = String::from(persona);
    prompt.push_str("\n\n");
    if let Some(context) = conversation_context {
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("Student question: {user_message}\n\nAnswer:"));
    prompt
}

/// A short follow-up block appended to non-streaming answers, keyed by the
/// detected intent.
pub fn suggestion_block(intent: Intent) -> &'static str {
    match intent {
        Intent::AssignmentHelp => {
            "\n\n---\nNext steps: check the submission requirements and marking criteria \
             in the assignment brief before you start writing."
        }
        Intent::ExamPreparation => {
            "\n\n---\nNext steps: try past questions under timed conditions and review \
             the topics you find hardest first."
        }
        Intent::StudyPlanning => {
            "\n\n---\nNext steps: block out regular short sessions and revisit this plan \
             at the end of each week."
        }
        Intent::ProgressFeedback => {
            "\n\n---\nNext steps: pick one area to improve and ask me for material on it."
        }
        Intent::ConceptClarification | Intent::General => "",
    }
}
