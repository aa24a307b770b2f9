//! Select expression over positional inventory CSV columns.

use std::fmt;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use bulkcopy_core::{FilterCriteria, LatestOnly, MigrationError, Result};

pub const IS_LATEST_COLUMN: &str = "IsLatest";

/// Date columns in order of preference.
pub const LAST_MODIFIED_COLUMNS: [&str; 2] = ["LastModifiedDate", "LastUpdated"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Column layout of a headerless inventory CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSchema {
    columns: Vec<String>,
}

impl FileSchema {
    /// Parse a comma-delimited schema such as `Bucket, Key, VersionId, IsLatest`.
    ///
    /// Bucket and key are always projected, so at least two columns are required.
    pub fn parse(schema: &str) -> Result<Self> {
        let columns: Vec<String> = schema.split(',').map(|c| c.trim().to_string()).collect();
        if columns.len() < 2 || columns[..2].iter().any(String::is_empty) {
            return Err(MigrationError::InvalidSchema(schema.to_string()));
        }
        Ok(Self { columns })
    }

    /// Positional reference (`s._N`, 1-based) of a named column.
    pub fn position(&self, name: &str) -> Option<String> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| format!("s._{}", idx + 1))
    }

    fn raw(&self) -> String {
        self.columns.join(", ")
    }
}

/// `SELECT s._1, s._2 FROM s3object s` plus optional `AND`-joined predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectExpression {
    predicates: Vec<String>,
}

impl SelectExpression {
    pub fn bucket_and_key() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    fn and_where(&mut self, predicate: String) {
        self.predicates.push(predicate);
    }
}

impl fmt::Display for SelectExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT s._1, s._2 FROM s3object s")?;
        if !self.predicates.is_empty() {
            write!(f, " WHERE {}", self.predicates.join(" AND "))?;
        }
        Ok(())
    }
}

/// Inputs of [`build_expression`] besides the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpressionFilters {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub latest_only: Option<LatestOnly>,
}

impl From<&FilterCriteria> for ExpressionFilters {
    fn from(criteria: &FilterCriteria) -> Self {
        Self {
            start: criteria.start,
            end: criteria.end,
            latest_only: criteria.latest_only,
        }
    }
}

/// Build the select expression for one filtered manifest.
///
/// A bucket without versioning has neither version flags nor versions to
/// exclude, so every filter is dropped and the bare projection is returned.
pub fn build_expression(
    schema: &str,
    filters: ExpressionFilters,
    versioning_disabled: bool,
) -> Result<SelectExpression> {
    let mut expression = SelectExpression::bucket_and_key();
    if versioning_disabled {
        debug!("Versioning disabled, selecting every object");
        return Ok(expression);
    }

    let schema = FileSchema::parse(schema)?;

    if let Some(latest_only) = filters.latest_only {
        let column = schema
            .position(IS_LATEST_COLUMN)
            .ok_or_else(|| MigrationError::MissingColumn {
                column: IS_LATEST_COLUMN.to_string(),
                schema: schema.raw(),
            })?;
        let flag = match latest_only {
            LatestOnly::Yes => "true",
            LatestOnly::No => "false",
        };
        expression.and_where(format!("{column} = '{flag}'"));
    }

    if filters.start.is_some() || filters.end.is_some() {
        let column = LAST_MODIFIED_COLUMNS
            .iter()
            .find_map(|name| schema.position(name));
        match column {
            Some(column) => expression.and_where(date_predicate(&column, filters.start, filters.end)),
            None => warn!(
                schema = %schema.raw(),
                "Inventory schema has no last-modified column, skipping date filter"
            ),
        }
    }

    Ok(expression)
}

fn date_predicate(column: &str, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> String {
    let fmt = |d: NaiveDateTime| d.format(TIMESTAMP_FORMAT).to_string();
    match (start, end) {
        (Some(start), Some(end)) => {
            format!("{column} BETWEEN '{}' AND '{}'", fmt(start), fmt(end))
        }
        (Some(start), None) => format!("{column} < '{}'", fmt(start)),
        (None, Some(end)) => format!("{column} > '{}'", fmt(end)),
        (None, None) => String::new(),
    }
}
