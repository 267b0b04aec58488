/// The filter module implements the chip expression language evaluated
/// against the index. A filter is whitespace-separated chips combined with
/// AND; within a chip, `|`-separated `field:value` alternatives combine
/// with OR. Malformed input is rejected with a diagnostic pointing at the
/// offending chip, never silently matched against nothing.
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::track::Track;

static YEAR_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,4})-(\d{1,4})$").unwrap());

pub const FILTER_FIELDS: &[&str] = &["artist", "album", "year", "genre", "codec", "favorite"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct FilterSyntaxError {
    pub filter: String,
    pub chip: String,
    pub index: usize,
    pub feedback: String,
}

impl fmt::Display for FilterSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to parse filter, invalid syntax:\n\n    {}\n    {}^\n    {}{}",
            self.filter,
            " ".repeat(self.index),
            " ".repeat(self.index),
            self.feedback
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Values are stored lowercased; text matching is case-insensitive
    /// exact match.
    Artist(String),
    Album(String),
    /// Matches any of the track's semicolon-separated genre values.
    Genre(String),
    Codec(String),
    Favorite(bool),
    Year(i32),
    /// Inclusive on both ends.
    YearRange(i32, i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    pub raw: String,
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub chips: Vec<Chip>,
}

impl Filter {
    pub fn parse(text: &str) -> Result<Filter, FilterSyntaxError> {
        let mut chips = Vec::new();
        let mut offset = 0;
        for raw in text.split_whitespace() {
            // The token came from this text, so the find cannot miss.
            let chip_start = text[offset..].find(raw).map(|i| i + offset).unwrap_or(offset);
            offset = chip_start + raw.len();
            chips.push(parse_chip(text, raw, chip_start)?);
        }
        Ok(Filter { chips })
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Chips AND together; clauses within a chip OR together.
    pub fn matches(&self, track: &Track) -> bool {
        self.chips.iter().all(|chip| chip.clauses.iter().any(|c| clause_matches(c, track)))
    }

    /// Single pass preserving the input sequence's order; results are
    /// never re-ranked.
    pub fn evaluate(&self, tracks: &[Arc<Track>]) -> Vec<Arc<Track>> {
        tracks.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}

fn parse_chip(text: &str, raw: &str, chip_start: usize) -> Result<Chip, FilterSyntaxError> {
    let err = |index: usize, feedback: String| FilterSyntaxError {
        filter: text.to_string(),
        chip: raw.to_string(),
        index,
        feedback,
    };

    let mut clauses = Vec::new();
    let mut clause_offset = 0;
    for part in raw.split('|') {
        let at = chip_start + clause_offset;
        clause_offset += part.len() + 1;

        let Some((field, value)) = part.split_once(':') else {
            return Err(err(at, format!("Expected a field:value clause, got {part:?}.")));
        };
        if value.is_empty() {
            return Err(err(at + field.len() + 1, format!("Missing value for field {field}.")));
        }
        let clause = match field {
            "artist" => Clause::Artist(value.to_lowercase()),
            "album" => Clause::Album(value.to_lowercase()),
            "genre" => Clause::Genre(value.to_lowercase()),
            "codec" => Clause::Codec(value.to_lowercase()),
            "favorite" => match value {
                "yes" => Clause::Favorite(true),
                "no" => Clause::Favorite(false),
                _ => return Err(err(at + field.len() + 1, format!("Favorite must be yes or no, got {value:?}."))),
            },
            "year" => parse_year_value(value).map_err(|feedback| err(at + field.len() + 1, feedback))?,
            _ => {
                return Err(err(at, format!("Unknown field {field}: expected one of {}.", FILTER_FIELDS.join(", "))));
            }
        };
        clauses.push(clause);
    }
    Ok(Chip {
        raw: raw.to_string(),
        clauses,
    })
}

fn parse_year_value(value: &str) -> Result<Clause, String> {
    if let Some(caps) = YEAR_RANGE_REGEX.captures(value) {
        let start: i32 = caps[1].parse().map_err(|_| format!("Invalid year {:?}.", &caps[1]))?;
        let end: i32 = caps[2].parse().map_err(|_| format!("Invalid year {:?}.", &caps[2]))?;
        if start > end {
            return Err(format!("Year range start {start} is after end {end}."));
        }
        return Ok(Clause::YearRange(start, end));
    }
    value
        .parse::<i32>()
        .map(Clause::Year)
        .map_err(|_| format!("Year must be YYYY or YYYY-YYYY, got {value:?}."))
}

fn clause_matches(clause: &Clause, track: &Track) -> bool {
    match clause {
        Clause::Artist(v) => track.artist.to_lowercase() == *v,
        Clause::Album(v) => track.album.to_lowercase() == *v,
        Clause::Genre(v) => track.genre.split(';').any(|g| g.trim().to_lowercase() == *v),
        Clause::Codec(v) => track.codec.to_lowercase() == *v,
        Clause::Favorite(v) => track.favorite == *v,
        Clause::Year(y) => track.year == Some(*y),
        Clause::YearRange(start, end) => track.year.map(|y| y >= *start && y <= *end).unwrap_or(false),
    }
}
