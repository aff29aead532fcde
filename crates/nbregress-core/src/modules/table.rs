//! Tab-delimited numeric tables.
//!
//! Loading is a two-stage parse. The strict stage treats `#` as a comment marker.
//! When the strict stage trips over a non-numeric first row (a plain header line),
//! the header-skipping stage drops exactly one leading line and re-parses with
//! comment handling disabled. Ragged rows are never recovered.

use crate::domain::{HarnessError, TableShape};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const DELIMITER: char = '\t';
const COMMENT_MARKER: char = '#';

/// Rectangular, row-major array of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    shape: TableShape,
    values: Vec<f64>,
}

impl Table {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, TableParseError> {
        let columns = rows.first().map(Vec::len).ok_or(TableParseError::Empty)?;
        let mut values = Vec::with_capacity(rows.len() * columns);
        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(TableParseError::Ragged {
                    line: row_index + 1,
                    expected: columns,
                    found: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            shape: TableShape {
                rows: rows.len(),
                columns,
            },
            values,
        })
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        if row >= self.shape.rows || column >= self.shape.columns {
            return None;
        }
        self.values.get(row * self.shape.columns + column).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStage {
    Strict,
    HeaderSkipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub table: Table,
    pub stage: ParseStage,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableParseError {
    #[error("line {line}, column {column} ('{token}') is not a valid number")]
    InvalidToken {
        line: usize,
        row: usize,
        column: usize,
        token: String,
    },
    #[error("line {line} has {found} column(s), expected {expected}")]
    Ragged {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("no numeric rows found")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum TableLoadError {
    #[error("failed to read table '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("table '{}' is not valid UTF-8: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: std::string::FromUtf8Error,
    },
    #[error("failed to parse table '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: TableParseError,
    },
}

impl From<TableLoadError> for HarnessError {
    fn from(error: TableLoadError) -> Self {
        let message = error.to_string();
        match error {
            TableLoadError::Read { .. } => HarnessError::io_system("IO.TABLE_READ", message),
            TableLoadError::Decode { .. } | TableLoadError::Parse { .. } => {
                HarnessError::input_validation("INPUT.TABLE_FORMAT", message)
            }
        }
    }
}

pub fn load_table(path: impl AsRef<Path>) -> Result<LoadedTable, TableLoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| TableLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|source| TableLoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table(&text).map_err(|source| TableLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_table(text: &str) -> Result<LoadedTable, TableParseError> {
    match parse_rows(text, 0, Some(COMMENT_MARKER)) {
        Ok(table) => Ok(LoadedTable {
            table,
            stage: ParseStage::Strict,
        }),
        Err(TableParseError::InvalidToken { row: 0, .. }) => {
            let table = parse_rows(text, 1, None)?;
            Ok(LoadedTable {
                table,
                stage: ParseStage::HeaderSkipped,
            })
        }
        Err(error) => Err(error),
    }
}

fn parse_rows(
    text: &str,
    skip_lines: usize,
    comment_marker: Option<char>,
) -> Result<Table, TableParseError> {
    let mut values = Vec::new();
    let mut columns: Option<usize> = None;
    let mut rows = 0usize;

    for (line_index, raw_line) in text.lines().enumerate().skip(skip_lines) {
        let content = match comment_marker {
            Some(marker) => raw_line
                .find(marker)
                .map_or(raw_line, |offset| &raw_line[..offset]),
            None => raw_line,
        };
        if content.trim().is_empty() {
            continue;
        }

        let mut width = 0usize;
        for (column, field) in content.split(DELIMITER).enumerate() {
            let token = field.trim();
            let value = token
                .parse::<f64>()
                .map_err(|_| TableParseError::InvalidToken {
                    line: line_index + 1,
                    row: rows,
                    column,
                    token: token.to_string(),
                })?;
            values.push(value);
            width += 1;
        }

        match columns {
            None => columns = Some(width),
            Some(expected) if expected != width => {
                return Err(TableParseError::Ragged {
                    line: line_index + 1,
                    expected,
                    found: width,
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let columns = columns.ok_or(TableParseError::Empty)?;
    Ok(Table {
        shape: TableShape { rows, columns },
        values,
    })
}
