//! Post-processing of raw search hits.
//!
//! Turns whatever the search service returned into a short, ranked list of
//! snippets: unusable and low-scoring hits are dropped, each source appears
//! once, and every text is cut to a bounded length.

use bastion_core::config::RetrievalConfig;
use bastion_core::{Citation, RawHit, Snippet};
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

/// Appended to snippet text that was cut.
pub const TRUNCATION_MARKER: &str = "…";

/// Filters, deduplicates, ranks and truncates raw hits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultProcessor {
    min_score: f32,
    max_snippet_chars: usize,
}

impl ResultProcessor {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self::with_limits(config.min_score, config.max_snippet_chars)
    }

    /// `max_snippet_chars` is raised to 2 so a cut text keeps at least one character.
    pub fn with_limits(min_score: f32, max_snippet_chars: usize) -> Self {
        Self {
            min_score,
            max_snippet_chars: max_snippet_chars.max(2),
        }
    }

    /// Produce at most `top_k` snippets ordered by descending score.
    ///
    /// Equal scores keep retrieval order. When a source appears more than
    /// once, its highest-scoring hit wins and ties keep the earliest.
    pub fn process(&self, raw_hits: Vec<RawHit>, top_k: usize) -> Vec<Snippet> {
        let total = raw_hits.len();

        // (retrieval position, hit), one entry per source
        let mut kept: Vec<(usize, RawHit)> = Vec::with_capacity(total);
        let mut by_source: HashMap<String, usize> = HashMap::new();

        for (position, hit) in raw_hits.into_iter().enumerate() {
            if !hit.score.is_finite() || hit.score < self.min_score || hit.text.trim().is_empty() {
                continue;
            }

            match by_source.get(&hit.source_id) {
                Some(&slot) => {
                    if hit.score > kept[slot].1.score {
                        kept[slot] = (position, hit);
                    }
                }
                None => {
                    by_source.insert(hit.source_id.clone(), kept.len());
                    kept.push((position, hit));
                }
            }
        }

        kept.sort_by(|(pos_a, a), (pos_b, b)| {
            b.score.total_cmp(&a.score).then(pos_a.cmp(pos_b))
        });

        let snippets: Vec<Snippet> = kept
            .into_iter()
            .take(top_k)
            .map(|(_, hit)| {
                let text = truncate_chars(hit.text.trim(), self.max_snippet_chars);
                Snippet::new(hit.source_id, text, hit.score, hit.corpus_id)
                    .with_metadata(hit.metadata)
            })
            .collect();

        tracing::debug!(
            "Processed {} raw hits into {} snippets (min_score={}, top_k={})",
            total,
            snippets.len(),
            self.min_score,
            top_k
        );

        snippets
    }

    /// Merge hits from several corpora into at most `top_k` snippets.
    ///
    /// `min_score` applies to each corpus's raw scores. The survivors are
    /// then min-max normalized per corpus so the scales compare, and the
    /// merged list is ranked, deduplicated and truncated like [`process`].
    ///
    /// [`process`]: Self::process
    pub fn merge(&self, per_corpus: Vec<Vec<RawHit>>, top_k: usize) -> Vec<Snippet> {
        let merged: Vec<RawHit> = per_corpus
            .into_iter()
            .flat_map(|hits| {
                let kept = hits
                    .into_iter()
                    .filter(|hit| hit.score.is_finite() && hit.score >= self.min_score)
                    .collect();
                normalize_scores(kept)
            })
            .collect();

        let unfiltered = Self {
            min_score: f32::NEG_INFINITY,
            ..*self
        };
        unfiltered.process(merged, top_k)
    }

    /// Re-run processing over already processed snippets.
    pub fn reprocess(&self, snippets: Vec<Snippet>, top_k: usize) -> Vec<Snippet> {
        self.process(snippets.into_iter().map(RawHit::from).collect(), top_k)
    }
}

/// Number snippets from 1, matching the `[n]` labels of the context block.
pub fn citations(snippets: &[Snippet]) -> Vec<Citation> {
    snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| Citation {
            index: i + 1,
            source_id: snippet.source_id().to_string(),
            corpus_id: snippet.corpus_id().to_string(),
            score: snippet.score(),
            metadata: snippet.metadata().clone(),
        })
        .collect()
}

/// Rescale scores to `[0, 1]`. Left untouched when every score is equal.
fn normalize_scores(mut hits: Vec<RawHit>) -> Vec<RawHit> {
    let (min, max) = hits.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), hit| {
        (lo.min(hit.score), hi.max(hit.score))
    });

    if max > min {
        for hit in &mut hits {
            hit.score = (hit.score - min) / (max - min);
        }
    }

    hits
}

/// Cut `text` to at most `max_chars` characters on a grapheme boundary.
///
/// The marker counts toward the bound.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut used = 0;
    let mut out = String::new();

    for grapheme in text.graphemes(true) {
        let width = grapheme.chars().count();
        if used + width > budget {
            break;
        }
        used += width;
        out.push_str(grapheme);
    }

    out.push_str(TRUNCATION_MARKER);
    out
}
