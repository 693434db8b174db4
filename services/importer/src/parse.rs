//! Parser stage: delimiter detection, header mapping and row admission.
//!
//! Malformed rows never fail the parse; only a file with no data rows after
//! the header is a structural error.

use tracing::{debug, info, warn};

use crate::columns::{ColumnMap, ColumnOverrides, Field};
use crate::error::{ImportError, Result};
use crate::model::ParsedRow;

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// How many dropped rows get an individual log line.
const LOGGED_DROPS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub rows: Vec<ParsedRow>,
    pub delimiter: u8,
    /// Data lines seen after the header, admitted or not.
    pub data_lines: usize,
    pub dropped: usize,
}

/// Pick the delimiter occurring most often in the first line; ties go to the
/// earlier candidate, so comma wins any tie.
pub fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for d in DELIMITERS {
        let count = first_line.bytes().filter(|b| *b == d).count();
        if count > best_count {
            best = d;
            best_count = count;
        }
    }
    best
}

/// Strip currency symbols, thousands separators and whitespace, then parse.
/// Anything unparseable becomes 0.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(*c, '$' | '€' | '£' | '¥' | ',' | '_') && !c.is_whitespace())
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

pub fn parse_count(raw: &str) -> i64 {
    parse_amount(raw).trunc() as i64
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn parse_games(text: &str, overrides: &ColumnOverrides) -> Result<ParseOutcome> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(ImportError::csv_structure("file is empty"));
    }

    let delimiter = detect_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::csv_structure(format!("failed to read header row: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let columns = ColumnMap::build(&headers, overrides);
    let shown = (delimiter as char).escape_default().to_string();
    info!(
        delimiter = %shown,
        headers = headers.len(),
        mapped = columns.len(),
        "Parsed CSV header"
    );
    for (field, idx) in columns.describe() {
        debug!("  {} <- [{}] {}", field, idx, headers[idx]);
    }

    let mut rows = Vec::new();
    let mut data_lines = 0usize;
    let mut dropped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let fallback_line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                data_lines += 1;
                dropped += 1;
                if dropped <= LOGGED_DROPS {
                    warn!(line = fallback_line, "Skipping unreadable row: {}", e);
                }
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        data_lines += 1;

        let get = |field: Field| columns.index_of(field).and_then(|i| record.get(i));
        let text_of = |field: Field| non_empty(get(field));

        let game_number = text_of(Field::GameNumber);
        let game_name = text_of(Field::GameName);
        let state = text_of(Field::State).map(|s| s.to_uppercase());

        let (game_number, game_name, state) = match (game_number, game_name, state) {
            (Some(n), Some(g), Some(s)) => (n, g, s),
            (n, g, s) => {
                dropped += 1;
                if dropped <= LOGGED_DROPS {
                    let missing: Vec<&str> = [
                        (n.is_none(), "game_number"),
                        (g.is_none(), "game_name"),
                        (s.is_none(), "state"),
                    ]
                    .into_iter()
                    .filter(|(absent, _)| *absent)
                    .map(|(_, name)| name)
                    .collect();
                    warn!(line, missing = ?missing, "Dropping row without mandatory fields");
                }
                continue;
            }
        };

        rows.push(ParsedRow {
            line,
            game_number,
            game_name,
            state,
            price: get(Field::Price).map(parse_amount).unwrap_or(0.0),
            top_prize: get(Field::TopPrize).map(parse_amount).unwrap_or(0.0),
            top_prizes_remaining: get(Field::TopPrizesRemaining).map(parse_count).unwrap_or(0),
            total_top_prizes: get(Field::TotalTopPrizes).map(parse_count).unwrap_or(0),
            overall_odds: text_of(Field::OverallOdds),
            start_date: text_of(Field::StartDate),
            end_date: text_of(Field::EndDate),
            image_url: text_of(Field::ImageUrl),
            source: text_of(Field::Source),
            source_url: text_of(Field::SourceUrl),
        });
    }

    if dropped > LOGGED_DROPS {
        warn!("... and {} more dropped rows", dropped - LOGGED_DROPS);
    }

    if data_lines == 0 {
        return Err(ImportError::csv_structure("no data rows after the header"));
    }
    if rows.is_empty() {
        let mapped: Vec<&str> = columns.describe().iter().map(|(f, _)| f.as_str()).collect();
        warn!(
            mapped = ?mapped,
            "None of {} data rows had game_number, game_name and state",
            data_lines
        );
    }

    info!(rows = rows.len(), dropped, "Parsed CSV rows");
    Ok(ParseOutcome {
        rows,
        delimiter,
        data_lines,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseOutcome {
        parse_games(text, &ColumnOverrides::new()).unwrap()
    }

    #[test]
    fn basic_row_is_normalized() {
        let csv = "game_number,game_name,state_code,ticket_price\n\"123A\",\"Lucky 7\",\"ga\",\"5.00\"\n";
        let out = parse(csv);
        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row.game_number, "123A");
        assert_eq!(row.game_name, "Lucky 7");
        assert_eq!(row.state, "GA");
        assert_eq!(row.price, 5.0);
        assert_eq!(row.line, 2);
    }

    #[test]
    fn delimiter_detection() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a;b;c"), b';');
        assert_eq!(detect_delimiter("a|b|c"), b'|');
        // One of each: comma wins the tie.
        assert_eq!(detect_delimiter("a,b;c|d\te"), b',');
        assert_eq!(detect_delimiter("nodelimiter"), b',');
    }

    #[test]
    fn semicolon_file_with_quoted_delimiters() {
        let csv = "Game Number;Game Name;State;Top Prize\n42;\"Cash; Cash; Cash\";tx;\"$1,000,000\"\n";
        let out = parse(csv);
        assert_eq!(out.delimiter, b';');
        let row = &out.rows[0];
        assert_eq!(row.game_name, "Cash; Cash; Cash");
        assert_eq!(row.state, "TX");
        assert_eq!(row.top_prize, 1_000_000.0);
    }

    #[test]
    fn tab_separated_with_fuzzy_headers() {
        let csv = "Game #\tTicket Name\tState\tPrice ($)\tTop Prizes Remaining\tTotal Top Prizes\n\
                   1501\tGold Rush\tfl\t$10\t3\t12\n";
        let row = &parse(csv).rows[0];
        assert_eq!(row.game_number, "1501");
        assert_eq!(row.game_name, "Gold Rush");
        assert_eq!(row.price, 10.0);
        assert_eq!(row.top_prizes_remaining, 3);
        assert_eq!(row.total_top_prizes, 12);
    }

    #[test]
    fn rows_missing_mandatory_fields_are_dropped() {
        let csv = "game_number,game_name,state\n1,Lucky,GA\n2,,GA\n,Nameless,GA\n3,Keep,NC\n";
        let out = parse(csv);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.dropped, 2);
        assert_eq!(out.data_lines, 4);
        assert_eq!(out.rows[0].game_number, "1");
        assert_eq!(out.rows[1].game_number, "3");
        assert_eq!(out.rows[1].line, 5);
    }

    #[test]
    fn unparseable_numbers_default_to_zero() {
        let csv = "game_number,game_name,state,price,top_prize,top_prizes_remaining\n9,Odd,GA,N/A,,lots\n";
        let row = &parse(csv).rows[0];
        assert_eq!(row.price, 0.0);
        assert_eq!(row.top_prize, 0.0);
        assert_eq!(row.top_prizes_remaining, 0);
    }

    #[test]
    fn amounts_strip_currency_and_separators() {
        assert_eq!(parse_amount("$1,234.50"), 1234.5);
        assert_eq!(parse_amount(" 20 "), 20.0);
        assert_eq!(parse_amount("-5"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
        assert_eq!(parse_count("1,500"), 1500);
        assert_eq!(parse_count("7.9"), 7);
    }

    #[test]
    fn optional_fields_pass_through() {
        let csv = "game_number,game_name,state,overall_odds,start_date,end_date,image_url,source,source_url\n\
                   5,Blue,ga,1 in 3.5,2024-01-02,06/30/2025,https://img/5.png,GA Lottery,https://galottery.com/5\n";
        let row = &parse(csv).rows[0];
        assert_eq!(row.overall_odds.as_deref(), Some("1 in 3.5"));
        assert_eq!(row.start_date.as_deref(), Some("2024-01-02"));
        assert_eq!(row.end_date.as_deref(), Some("06/30/2025"));
        assert_eq!(row.image_url.as_deref(), Some("https://img/5.png"));
        assert_eq!(row.source.as_deref(), Some("GA Lottery"));
        assert_eq!(row.source_url.as_deref(), Some("https://galottery.com/5"));
    }

    #[test]
    fn blank_lines_and_bom_are_ignored() {
        let csv = "\u{feff}game_number,game_name,state\n\n1,Lucky,GA\n\n";
        let out = parse(csv);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.data_lines, 1);
    }

    #[test]
    fn short_rows_are_tolerated() {
        let csv = "game_number,game_name,state,price\n1,Lucky,GA\n";
        let row = &parse(csv).rows[0];
        assert_eq!(row.price, 0.0);
    }

    #[test]
    fn header_only_file_is_structural_error() {
        let err = parse_games("game_number,game_name,state\n", &ColumnOverrides::new()).unwrap_err();
        assert!(matches!(err, ImportError::CsvStructure(_)));
    }

    #[test]
    fn empty_file_is_structural_error() {
        let err = parse_games("  \n", &ColumnOverrides::new()).unwrap_err();
        assert!(matches!(err, ImportError::CsvStructure(_)));
    }

    #[test]
    fn unmapped_headers_drop_every_row_without_failing() {
        let out = parse("foo,bar\n1,2\n");
        assert!(out.rows.is_empty());
        assert_eq!(out.data_lines, 1);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn all_rows_dropped_is_not_structural() {
        let out = parse("game_number,game_name,state\n1,,GA\n2,,GA\n");
        assert!(out.rows.is_empty());
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn state_name_column_is_admitted() {
        let row = &parse("Game Number,Game Name,State Name,Top Prize\n101,Lucky,ga,500\n").rows[0];
        assert_eq!(row.state, "GA");
        assert_eq!(row.top_prize, 500.0);
    }

    #[test]
    fn statewide_remaining_column_keeps_its_count() {
        let row = &parse("game_number,game_name,state,Statewide Top Prizes Remaining\n1,Lucky,GA,7\n").rows[0];
        assert_eq!(row.state, "GA");
        assert_eq!(row.top_prizes_remaining, 7);
    }

    #[test]
    fn overrides_rescue_unknown_headers() {
        let mut overrides = ColumnOverrides::new();
        overrides.insert("foo".into(), Field::GameNumber);
        overrides.insert("bar".into(), Field::GameName);
        overrides.insert("baz".into(), Field::State);
        let out = parse_games("foo,bar,baz\n1,Lucky,ky\n", &overrides).unwrap();
        assert_eq!(out.rows[0].state, "KY");
    }

    #[test]
    fn parsing_is_deterministic() {
        let csv = "game_number,game_name,state,top_prize\n1,A,GA,100\n2,B,GA,200\n";
        let first = parse(csv);
        for _ in 0..5 {
            assert_eq!(parse(csv), first);
        }
    }
}
