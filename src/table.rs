use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::config::ColumnConfig;
use crate::validate::InvalidEntry;

/// A CSV frame: input columns first, computed columns appended after them.
/// Row order is input order and never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// The cells of one input row the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub url: String,
    pub date_published: Option<String>,
    pub pattern: Option<String>,
}

impl ResultTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Builds a single-column table, as used for URLs given on the command line.
    pub fn from_urls(column: &str, urls: &[String]) -> Self {
        let mut table = Self::new(vec![column.to_string()]);
        for url in urls {
            table.rows.push(vec![url.clone()]);
        }
        table
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV row {}", index + 1))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!(action = "load", component = "input_table", file_path = ?path, "Loading input table");
        let file = File::open(path).with_context(|| format!("Failed to open input file {:?}", path))?;
        let table = Self::from_reader(file)
            .with_context(|| format!("Failed to parse input file {:?}", path))?;
        info!(
            action = "loaded",
            component = "input_table",
            row_count = table.len(),
            column_count = table.headers.len(),
            "Input table loaded"
        );
        Ok(table)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Failed to create output file {:?}", path))?;
        self.to_writer(file)
            .with_context(|| format!("Failed to write output file {:?}", path))?;
        info!(action = "save", component = "result_table", file_path = ?path, row_count = self.len(), "Results saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Returns the index of `name`, appending it filled with `default` if absent.
    pub fn ensure_column(&mut self, name: &str, default: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.to_string());
        }
        self.headers.len() - 1
    }

    /// Like [`ensure_column`](Self::ensure_column), but an existing column is
    /// cleared to `default` as well.
    pub fn reset_column(&mut self, name: &str, default: &str) -> usize {
        let index = self.ensure_column(name, default);
        for row in &mut self.rows {
            row[index] = default.to_string();
        }
        index
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    pub fn set(&mut self, row: usize, column: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value.into();
        }
    }

    /// Reads a count column; blank or non-numeric cells count as zero.
    pub fn count(&self, row: usize, column: usize) -> u64 {
        self.get(row, column)
            .and_then(|cell| cell.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(column).map(String::as_str).unwrap_or(""))
    }

    /// Extracts the engine's view of each row. A missing URL column, or a
    /// missing date column when `require_date` is set, is an input error.
    pub fn raw_records(&self, columns: &ColumnConfig, require_date: bool) -> Result<Vec<RawRecord>> {
        let url_index = self.column_index(&columns.url).with_context(|| {
            format!(
                "Input is missing the required '{}' column (found: {})",
                columns.url,
                self.headers.join(", ")
            )
        })?;
        let date_index = self.column_index(&columns.date_published);
        if require_date && date_index.is_none() {
            anyhow::bail!(
                "Input is missing the required '{}' column (found: {})",
                columns.date_published,
                self.headers.join(", ")
            );
        }
        let pattern_index = self.column_index(&columns.pattern);

        let non_blank = |row: &Vec<String>, index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
        };

        Ok(self
            .rows
            .iter()
            .map(|row| RawRecord {
                url: row.get(url_index).map(|u| u.trim().to_string()).unwrap_or_default(),
                date_published: non_blank(row, date_index),
                pattern: non_blank(row, pattern_index),
            })
            .collect())
    }
}

pub fn write_invalid_entries(path: &Path, entries: &[InvalidEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create invalid rows file {:?}", path))?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    info!(action = "save", component = "invalid_rows", file_path = ?path, row_count = entries.len(), "Saved rows with invalid publication dates");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "url,date_published,title\n\
https://www.yourpage.com/a,2023-01-05,First\n\
https://www.yourpage.com/b,,Second\n\
https://www.yourpage.com/c,01/05/2023\n";

    #[test]
    fn reads_short_rows_padded() {
        let table = ResultTable::from_reader(INPUT.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.headers(), ["url", "date_published", "title"]);
        assert_eq!(table.get(2, 2), Some(""));
    }

    #[test]
    fn ensure_column_appends_once() {
        let mut table = ResultTable::from_reader(INPUT.as_bytes()).unwrap();
        let first = table.ensure_column("users_30_days", "0");
        let second = table.ensure_column("users_30_days", "0");
        assert_eq!(first, 3);
        assert_eq!(first, second);
        assert_eq!(table.headers().len(), 4);
        assert_eq!(table.count(1, first), 0);

        table.set(1, first, "17");
        assert_eq!(table.count(1, first), 17);
        assert_eq!(table.get(0, first), Some("0"));
    }

    #[test]
    fn raw_records_blank_cells_are_none() {
        let table = ResultTable::from_reader(INPUT.as_bytes()).unwrap();
        let records = table.raw_records(&ColumnConfig::default(), true).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].date_published.as_deref(), Some("2023-01-05"));
        assert_eq!(records[1].date_published, None);
        assert_eq!(records[0].pattern, None);
    }

    #[test]
    fn missing_required_columns() {
        let table = ResultTable::from_reader("link,date_published\nx,2023-01-01\n".as_bytes()).unwrap();
        let err = table.raw_records(&ColumnConfig::default(), false).unwrap_err();
        assert!(err.to_string().contains("'url'"));

        let table = ResultTable::from_reader("url\nx\n".as_bytes()).unwrap();
        assert!(table.raw_records(&ColumnConfig::default(), true).is_err());
        assert!(table.raw_records(&ColumnConfig::default(), false).is_ok());
    }

    #[test]
    fn writes_back_all_columns() {
        let mut table = ResultTable::from_reader(INPUT.as_bytes()).unwrap();
        let users = table.ensure_column("users_30_days", "0");
        table.set(0, users, "12000");

        let mut out = Vec::new();
        table.to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("url,date_published,title,users_30_days"));
        assert_eq!(
            lines.next(),
            Some("https://www.yourpage.com/a,2023-01-05,First,12000")
        );
    }

    #[test]
    fn invalid_entries_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.csv");
        write_invalid_entries(
            &path,
            &[InvalidEntry {
                row: 2,
                url: "https://www.yourpage.com/b".to_string(),
            }],
        )
        .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "row,url\n2,https://www.yourpage.com/b\n");
    }
}
