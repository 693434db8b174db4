//! Header-name to game-field mapping.
//!
//! Each header is matched against exact spellings first, then against an
//! ordered list of substring rules. The first rule that fires for a field
//! no other header has claimed wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    GameNumber,
    GameName,
    State,
    Price,
    TopPrize,
    TopPrizesRemaining,
    TotalTopPrizes,
    OverallOdds,
    StartDate,
    EndDate,
    ImageUrl,
    Source,
    SourceUrl,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::GameNumber,
        Field::GameName,
        Field::State,
        Field::Price,
        Field::TopPrize,
        Field::TopPrizesRemaining,
        Field::TotalTopPrizes,
        Field::OverallOdds,
        Field::StartDate,
        Field::EndDate,
        Field::ImageUrl,
        Field::Source,
        Field::SourceUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::GameNumber => "game_number",
            Field::GameName => "game_name",
            Field::State => "state",
            Field::Price => "price",
            Field::TopPrize => "top_prize",
            Field::TopPrizesRemaining => "top_prizes_remaining",
            Field::TotalTopPrizes => "total_top_prizes",
            Field::OverallOdds => "overall_odds",
            Field::StartDate => "start_date",
            Field::EndDate => "end_date",
            Field::ImageUrl => "image_url",
            Field::Source => "source",
            Field::SourceUrl => "source_url",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_header(s);
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("unknown field '{}'", s))
    }
}

/// Known header spellings, checked before any fuzzy rule.
const EXACT_HEADERS: &[(&str, Field)] = &[
    ("game_number", Field::GameNumber),
    ("game_no", Field::GameNumber),
    ("game_num", Field::GameNumber),
    ("game_id", Field::GameNumber),
    ("game_name", Field::GameName),
    ("name", Field::GameName),
    ("state_code", Field::State),
    ("state", Field::State),
    ("ticket_price", Field::Price),
    ("price", Field::Price),
    ("top_prize_amount", Field::TopPrize),
    ("top_prize", Field::TopPrize),
    ("top_prizes_remaining", Field::TopPrizesRemaining),
    ("remaining_top_prizes", Field::TopPrizesRemaining),
    ("top_prizes_total_original", Field::TotalTopPrizes),
    ("total_top_prizes", Field::TotalTopPrizes),
    ("top_prizes_total", Field::TotalTopPrizes),
    ("overall_odds", Field::OverallOdds),
    ("odds", Field::OverallOdds),
    ("start_date", Field::StartDate),
    ("launch_date", Field::StartDate),
    ("end_date", Field::EndDate),
    ("close_date", Field::EndDate),
    ("image_url", Field::ImageUrl),
    ("image", Field::ImageUrl),
    ("source", Field::Source),
    ("source_url", Field::SourceUrl),
];

type Rule = (fn(&str) -> bool, Field);

/// Substring rules, evaluated top to bottom when no exact spelling matched.
/// Short keywords are matched as whole tokens so that "announcement" is not
/// read as "no".
const FUZZY_RULES: &[Rule] = &[
    (
        |h| {
            h.contains("game")
                && (h.contains("number")
                    || h.contains('#')
                    || ["no", "num", "nbr", "id"].iter().any(|k| has_token(h, k)))
        },
        Field::GameNumber,
    ),
    (|h| has_token(h, "state") || has_token(h, "st"), Field::State),
    (|h| h.contains("name"), Field::GameName),
    (|h| h.contains("source") && h.contains("url"), Field::SourceUrl),
    (|h| h.contains("source"), Field::Source),
    (|h| h.contains("image") || h.contains("img"), Field::ImageUrl),
    (
        |h| h.contains("prize") && (h.contains("remaining") || h.contains("left")),
        Field::TopPrizesRemaining,
    ),
    (
        |h| h.contains("top") && h.contains("prize") && (h.contains("total") || h.contains("original")),
        Field::TotalTopPrizes,
    ),
    (
        |h| h.contains("top") && h.contains("prize") && !h.contains("claimed"),
        Field::TopPrize,
    ),
    (|h| h.contains("price") || h.contains("cost"), Field::Price),
    (|h| h.contains("odds"), Field::OverallOdds),
    (
        |h| h.contains("date") && (h.contains("start") || h.contains("launch")),
        Field::StartDate,
    ),
    (
        |h| h.contains("date") && (h.contains("end") || h.contains("close")),
        Field::EndDate,
    ),
];

/// Whether `header` contains `token` as a whole alphanumeric word.
fn has_token(header: &str, token: &str) -> bool {
    header
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == token)
}

/// Lower-case, trim, and strip surrounding quotes from a header cell.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}

pub fn exact_match(header: &str) -> Option<Field> {
    EXACT_HEADERS
        .iter()
        .find(|(spelling, _)| *spelling == header)
        .map(|(_, field)| *field)
}

pub fn fuzzy_match(header: &str) -> Option<Field> {
    fuzzy_candidates(header).next()
}

/// Every field whose fuzzy rule fires for `header`, in rule order.
pub fn fuzzy_candidates(header: &str) -> impl Iterator<Item = Field> + '_ {
    FUZZY_RULES
        .iter()
        .filter(move |(pred, _)| pred(header))
        .map(|(_, field)| *field)
}

/// Explicit header overrides supplied with an import request.
pub type ColumnOverrides = HashMap<String, Field>;

/// Resolved column index for every field that some header mapped to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: HashMap<Field, usize>,
}

impl ColumnMap {
    /// Map `headers` onto fields.
    ///
    /// Overrides outrank exact matches, which outrank fuzzy matches; within
    /// a tier the leftmost header claims the field. In the fuzzy tier a
    /// header takes the first matching rule whose field is still free.
    pub fn build(headers: &[String], overrides: &ColumnOverrides) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let overrides: HashMap<String, Field> = overrides
            .iter()
            .map(|(h, f)| (normalize_header(h), *f))
            .collect();

        let mut columns: HashMap<Field, usize> = HashMap::new();
        let tiers: [&dyn Fn(&str) -> Vec<Field>; 3] = [
            &|h: &str| overrides.get(h).copied().into_iter().collect(),
            &|h: &str| exact_match(h).into_iter().collect(),
            &|h: &str| fuzzy_candidates(h).collect(),
        ];
        let mut claimed = vec![false; normalized.len()];
        for tier in tiers {
            for (idx, header) in normalized.iter().enumerate() {
                if claimed[idx] || header.is_empty() {
                    continue;
                }
                let free = tier(header).into_iter().find(|f| !columns.contains_key(f));
                if let Some(field) = free {
                    columns.insert(field, idx);
                    claimed[idx] = true;
                }
            }
        }
        Self { columns }
    }

    pub fn index_of(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// (field, column index) pairs in column order, for diagnostics.
    pub fn describe(&self) -> Vec<(Field, usize)> {
        let mut pairs: Vec<(Field, usize)> = self.columns.iter().map(|(f, i)| (*f, *i)).collect();
        pairs.sort_by_key(|(_, i)| *i);
        pairs
    }
}
