/// Fuzzy free-text search over the index. Each track's title, artist and
/// album are scored independently; the best field wins, with title
/// outranking artist outranking album when similarity ties. Results come
/// back ordered, never as a set.
use std::sync::Arc;

use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchField {
    Album,
    Artist,
    Title,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub track: Arc<Track>,
    /// Position of the track in the input sequence.
    pub index: usize,
    pub score: u32,
    pub field: MatchField,
}

/// Score every track against `query` and return matches sorted by
/// (score desc, field priority desc, title asc). An empty query yields an
/// empty result, not the full library.
pub fn fuzzy_search(query: &str, tracks: &[Arc<Track>], limit: usize) -> Vec<SearchResult> {
    if query.is_empty() || tracks.is_empty() {
        return Vec::new();
    }
    let query = query.to_lowercase();
    let mut results = Vec::new();

    for (index, track) in tracks.iter().enumerate() {
        let mut best: Option<(u32, MatchField)> = None;
        for (field, value) in [
            (MatchField::Title, &track.title),
            (MatchField::Artist, &track.artist),
            (MatchField::Album, &track.album),
        ] {
            let score = score_match(&query, &value.to_lowercase());
            if score > 0 && best.map(|(s, f)| (score, field) > (s, f)).unwrap_or(true) {
                best = Some((score, field));
            }
        }
        if let Some((score, field)) = best {
            results.push(SearchResult {
                track: Arc::clone(track),
                index,
                score,
                field,
            });
        }
    }

    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.field.cmp(&a.field))
            .then_with(|| a.track.title.to_lowercase().cmp(&b.track.title.to_lowercase()))
    });
    results.truncate(limit);
    results
}

/// Tiered similarity: exact 1000, prefix 500+, substring 200+ with an
/// early-position bonus, in-order subsequence 100+ with coverage and
/// adjacency bonuses.
fn score_match(query: &str, text: &str) -> u32 {
    if query.is_empty() || text.is_empty() {
        return 0;
    }
    if query == text {
        return 1000;
    }
    if text.starts_with(query) {
        return 500 + query.chars().count() as u32 * 10;
    }
    if let Some(pos) = text.find(query) {
        let chars_before = text[..pos].chars().count() as u32;
        let position_bonus = 100u32.saturating_sub(chars_before * 5);
        return 200 + position_bonus + query.chars().count() as u32 * 5;
    }
    subsequence_score(query, text).map(|s| 100 + s).unwrap_or(0)
}

/// Score a subsequence match by how tight it is: coverage of the text plus
/// a bonus for adjacent matched characters. None when not a subsequence.
fn subsequence_score(query: &str, text: &str) -> Option<u32> {
    let mut positions = Vec::with_capacity(query.chars().count());
    let mut query_chars = query.chars().peekable();
    for (i, c) in text.chars().enumerate() {
        match query_chars.peek() {
            Some(&q) if q == c => {
                positions.push(i);
                query_chars.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    if query_chars.peek().is_some() {
        return None;
    }

    let coverage = (query.chars().count() as f64 / text.chars().count() as f64 * 50.0) as u32;
    let consecutive_bonus = positions.windows(2).filter(|w| w[1] == w[0] + 1).count() as u32 * 10;
    Some(coverage + consecutive_bonus)
}
