use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::dates::parse_flexible_date;
use crate::table::RawRecord;

/// An input row ready for windowing and fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// 0-based position in the input table
    pub row_index: usize,
    pub url: String,
    pub publication_date: Option<NaiveDate>,
    pub custom_pattern: Option<String>,
}

/// A row skipped because its publication date is missing or unparseable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidEntry {
    /// 1-based, as a spreadsheet would number it
    pub row: usize,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct Validated {
    pub records: Vec<UrlRecord>,
    pub invalid: Vec<InvalidEntry>,
}

/// Splits rows into those that can be fetched and those whose required
/// publication date is absent or unparseable. Every input row ends up in
/// exactly one of the two lists.
pub fn validate(rows: &[RawRecord], require_date: bool) -> Validated {
    let mut validated = Validated::default();

    for (row_index, raw) in rows.iter().enumerate() {
        let publication_date = raw.date_published.as_deref().and_then(parse_flexible_date);

        if require_date && publication_date.is_none() {
            warn!(
                action = "skip",
                component = "row_validation",
                row = row_index + 1,
                url = %raw.url,
                raw_date = raw.date_published.as_deref().unwrap_or(""),
                "Missing or invalid publication date"
            );
            validated.invalid.push(InvalidEntry {
                row: row_index + 1,
                url: raw.url.clone(),
            });
            continue;
        }

        validated.records.push(UrlRecord {
            row_index,
            url: raw.url.clone(),
            publication_date,
            custom_pattern: raw.pattern.clone(),
        });
    }

    validated
}
