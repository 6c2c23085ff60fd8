//! Retrieval pipeline: query expansion, vector search, stable dedup, lexical
//! re-rank with fuzzy term matching, and fast-mode context trimming.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::error::Result;
use crate::models::RetrievalCandidate;
use crate::store::DocumentStore;

/// Fixed synonym table for query expansion. Only the first synonym of the
/// first matched term is substituted, producing at most one variant query,
/// which bounds the extra embed + search cost.
const SYNONYMS: [(&str, &str); 10] = [
    ("learn", "study"),
    ("study", "learn"),
    ("exam", "test"),
    ("test", "exam"),
    ("homework", "assignment"),
    ("assignment", "homework"),
    ("explain", "describe"),
    ("describe", "explain"),
    ("help", "assist"),
    ("understand", "comprehend"),
];

/// Terms shorter than this never participate in fuzzy matching; tiny words
/// produce spurious high similarity ratios.
const MIN_FUZZY_TERM_LEN: usize = 4;

/// Weight of a fuzzy match relative to an exact one.
const FUZZY_WEIGHT: f32 = 0.5;

pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Retrieve at most `top_k` candidates for `query`, best first.
    ///
    /// Candidate order is deterministic given deterministic embedder/store
    /// output: dedup keeps first occurrence, the sort is stable, so ties
    /// keep their vector-search order. Store or embedder failures surface
    /// as `AssistantError::Retrieval`; a wrong ranking is never returned
    /// silently.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalCandidate>> {
        let queries = expand_query(query);

        let mut candidates: Vec<RetrievalCandidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for q in &queries {
            let embedding = self.embedder.embed_one(q).await?;
            let hits = self.store.query(&embedding, self.config.n_results).await?;

            for hit in hits {
                // Stable dedup across variants: first occurrence wins
                if !seen.insert(hit.id.clone()) {
                    continue;
                }
                candidates.push(RetrievalCandidate {
                    id: hit.id,
                    text: hit.text,
                    metadata: hit.metadata,
                    vector_score: hit.score,
                    lexical_score: 0.0,
                    combined_score: 0.0,
                });
            }
        }

        // Lexical re-rank against the ORIGINAL query. Vector similarity got
        // the candidates into the shortlist; keyword overlap orders them.
        for c in &mut candidates {
            c.lexical_score = lexical_score(query, &c.text, self.config.fuzzy_threshold);
            c.combined_score = c.lexical_score * self.config.lexical_weight;
        }

        // Stable sort: ties keep vector-search order
        candidates.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);

        if self.config.fast_mode && self.config.max_context_chars > 0 {
            candidates = trim_to_budget(candidates, self.config.max_context_chars);
        }

        Ok(candidates)
    }

    pub fn top_k(&self) -> usize {
        self.config.top_k
    }
}

/// Produce the original query plus at most one synonym-substituted variant.
pub fn expand_query(query: &str) -> Vec<String> {
    let mut queries = vec![query.to_string()];

    let lower = query.to_lowercase();
    for term in tokenize(&lower) {
        if let Some((_, synonym)) = SYNONYMS.iter().find(|(from, _)| *from == term) {
            let variant = lower
                .split_whitespace()
                .map(|w| {
                    let stripped: String =
                        w.chars().filter(|c| c.is_alphanumeric()).collect();
                    if stripped == term {
                        synonym.to_string()
                    } else {
                        w.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            if variant != lower {
                queries.push(variant);
            }
            break; // at most one variant
        }
    }

    queries
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keyword-overlap relevance boost with fuzzy term expansion:
/// `(exact_overlap + 0.5 × fuzzy_matches) / sqrt(|query_terms|)`.
///
/// The fuzzy bonus catches singular/plural and minor inflection
/// ("exam"/"exams", "learn"/"learning") without a full edit-distance search:
/// only terms of at least 4 characters are considered, and only when their
/// Jaro-Winkler similarity to some document term exceeds the threshold.
pub fn lexical_score(query: &str, doc: &str, fuzzy_threshold: f64) -> f32 {
    let q_terms: HashSet<String> = tokenize(query).into_iter().collect();
    let d_terms: HashSet<String> = tokenize(doc).into_iter().collect();
    if q_terms.is_empty() || d_terms.is_empty() {
        return 0.0;
    }

    let mut exact = 0usize;
    let mut fuzzy = 0usize;

    for term in &q_terms {
        if d_terms.contains(term) {
            exact += 1;
        } else if term.chars().count() >= MIN_FUZZY_TERM_LEN {
            let matched = d_terms.iter().any(|d| {
                d.chars().count() >= MIN_FUZZY_TERM_LEN
                    && fuzzy_similarity(term, d) > fuzzy_threshold
            });
            if matched {
                fuzzy += 1;
            }
        }
    }

    (exact as f32 + FUZZY_WEIGHT * fuzzy as f32) / (q_terms.len() as f32).sqrt()
}

/// String similarity in 0.0..=1.0, case-insensitive.
pub fn fuzzy_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

/// Enforce the fast-mode context character budget: accumulate passage
/// lengths, truncate the passage that crosses the budget to exactly fill
/// it, and drop everything after.
fn trim_to_budget(
    candidates: Vec<RetrievalCandidate>,
    max_chars: usize,
) -> Vec<RetrievalCandidate> {
    let mut trimmed = Vec::new();
    let mut total = 0usize;

    for mut c in candidates {
        let len = c.text.chars().count();
        if total + len <= max_chars {
            total += len;
            trimmed.push(c);
        } else if total < max_chars {
            let remaining = max_chars - total;
            c.text = c.text.chars().take(remaining).collect();
            trimmed.push(c);
            break;
        } else {
            break;
        }
    }

    trimmed
}
