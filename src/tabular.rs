// ============================================================================
// Tabular resources
// ============================================================================
//
// Header-keyed view over the comma-separated resources of the feed.
// Values stay raw strings; typed parsing belongs to the index builder.

use crate::error::Result;
use crate::feed_loader::FeedArchive;
use csv::StringRecord;
use log::debug;
use std::collections::HashMap;

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

/// One row of a [`Table`], addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a HashMap<String, usize>,
    row: &'a StringRecord,
}

impl<'a> Record<'a> {
    /// Raw value of `column`, `None` when the column or the cell is missing.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.columns.get(column).and_then(|&i| self.row.get(i))
    }

    /// Raw value of `column`, empty when absent.
    pub fn field(&self, column: &str) -> &'a str {
        self.get(column).unwrap_or("")
    }
}

impl Table {
    /// Parses `contents` using its first line as the header row.
    pub fn parse(name: &str, contents: &str) -> Result<Self> {
        let contents = contents.strip_prefix(BYTE_ORDER_MARK).unwrap_or(contents);

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());

        let columns = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_string(), i))
            .collect();

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            match result {
                Ok(record) if record.iter().all(|f| f.is_empty()) => {}
                Ok(record) => rows.push(record),
                Err(e) => {
                    skipped += 1;
                    debug!("Skipping unreadable row in {}: {}", name, e);
                }
            }
        }
        if skipped > 0 {
            debug!("{}: skipped {} unreadable rows", name, skipped);
        }

        Ok(Table {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    /// Reads and parses the resource `name` from the archive.
    pub fn read(archive: &mut FeedArchive, name: &str) -> Result<Self> {
        let contents = archive.read_resource(name)?;
        Self::parse(name, &contents)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows.iter().map(move |row| Record {
            columns: &self.columns,
            row,
        })
    }
}
