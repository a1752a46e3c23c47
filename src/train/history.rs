//! Metric tables persisted alongside checkpoints.
//!
//! File format:
//! - UTF-8, comma-separated, one row per completed epoch, no header
//! - values written in scientific notation with 18 fractional digits
//! - on read, a leading header row (any non-numeric cell) is skipped and
//!   double-quoted fields are accepted
//!
//! Every table is rewritten in full after each epoch so the file on disk is
//! always a complete, self-consistent history.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TrainError};

pub const LOSS_FILE: &str = "loss.csv";
pub const TRAIN_SCORES_FILE: &str = "train_scores.csv";
pub const VALID_SCORES_FILE: &str = "valid_scores.csv";

// ---------------------------------------------------------------------------
// MetricsTable
// ---------------------------------------------------------------------------

/// A rows × columns numeric table; rows are epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsTable {
    columns: usize,
    rows: Vec<Vec<f64>>,
}

impl MetricsTable {
    pub fn new(columns: usize) -> MetricsTable {
        MetricsTable { columns, rows: Vec::new() }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.columns {
            return Err(TrainError::ShapeMismatch(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns
            )));
        }
        self.rows.push(row.to_vec());
        Ok(())
    }

    /// Keeps the first `rows` rows.
    pub fn truncate(&mut self, rows: usize) {
        self.rows.truncate(rows);
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path).map_err(|e| TrainError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|v| format!("{:.18e}", v)).collect();
            writeln!(writer, "{}", line.join(",")).map_err(|e| TrainError::io(path, e))?;
        }
        writer.flush().map_err(|e| TrainError::io(path, e))?;
        debug!(path = %path.display(), rows = self.rows.len(), "wrote metrics table");
        Ok(())
    }

    /// Reads a table written by `save_csv`, requiring `columns` columns on
    /// every row.
    pub fn load_csv(path: &Path, columns: usize) -> Result<MetricsTable> {
        let text = fs::read_to_string(path).map_err(|e| TrainError::io(path, e))?;
        let mut lines = text.lines().enumerate().peekable();

        if let Some((_, first)) = lines.peek() {
            if is_header(first) {
                lines.next();
            }
        }

        let mut table = MetricsTable::new(columns);
        for (idx, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let cells = parse_csv_row(line);
            if cells.len() != columns {
                return Err(TrainError::ColumnMismatch {
                    path: path.to_path_buf(),
                    expected: columns,
                    found: cells.len(),
                });
            }
            table.rows.push(parse_floats(&cells, path, idx + 1)?);
        }
        Ok(table)
    }
}

/// Returns `true` if the row looks like a header (any cell non-numeric).
fn is_header(line: &str) -> bool {
    parse_csv_row(line).iter().any(|c| {
        let t = c.trim();
        !t.is_empty() && t.parse::<f64>().is_err()
    })
}

/// Splits one CSV row, honouring double-quoted fields and `""` escapes.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_floats(cells: &[String], path: &Path, line: usize) -> Result<Vec<f64>> {
    cells
        .iter()
        .map(|c| {
            c.trim().parse::<f64>().map_err(|_| TrainError::Csv {
                path: path.to_path_buf(),
                line,
                message: format!("'{}' is not a valid number", c),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MetricsHistory
// ---------------------------------------------------------------------------

/// Loss history plus, when score callbacks exist, the per-score histories
/// of the training and validation passes.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    dir: PathBuf,
    loss: MetricsTable,
    train_scores: Option<MetricsTable>,
    valid_scores: Option<MetricsTable>,
}

impl MetricsHistory {
    /// Empty history for a fresh run.
    pub fn new(dir: impl Into<PathBuf>) -> MetricsHistory {
        MetricsHistory {
            dir: dir.into(),
            loss: MetricsTable::new(2),
            train_scores: None,
            valid_scores: None,
        }
    }

    /// Reloads the history of a previous run and cuts it back to `epoch` rows.
    ///
    /// The loss table must hold at least `epoch` rows; a shorter table means
    /// the history does not belong to the checkpoint being resumed and is
    /// reported as `HistoryMismatch`. Score tables are only read when
    /// `score_columns > 0`, must have exactly that many columns and exactly
    /// as many rows as the loss table (`ScoreRowsMismatch` otherwise).
    pub fn resume(dir: impl Into<PathBuf>, epoch: usize, score_columns: usize) -> Result<MetricsHistory> {
        let dir = dir.into();
        let mut history = MetricsHistory::new(dir.clone());

        let loss_path = dir.join(LOSS_FILE);
        let mut loss = load_or_empty(&loss_path, 2)?;
        if loss.len() < epoch {
            return Err(TrainError::HistoryMismatch {
                path: loss_path,
                checkpoint_epoch: epoch,
                history_rows: loss.len(),
            });
        }

        if score_columns > 0 {
            let mut scores = Vec::with_capacity(2);
            for name in [TRAIN_SCORES_FILE, VALID_SCORES_FILE] {
                let path = dir.join(name);
                let mut table = load_or_empty(&path, score_columns)?;
                if table.len() != loss.len() {
                    return Err(TrainError::ScoreRowsMismatch {
                        path,
                        loss_rows: loss.len(),
                        score_rows: table.len(),
                    });
                }
                table.truncate(epoch);
                scores.push(table);
            }
            history.valid_scores = scores.pop();
            history.train_scores = scores.pop();
        }

        loss.truncate(epoch);
        history.loss = loss;
        Ok(history)
    }

    pub fn loss(&self) -> &MetricsTable {
        &self.loss
    }

    pub fn train_scores(&self) -> Option<&MetricsTable> {
        self.train_scores.as_ref()
    }

    pub fn valid_scores(&self) -> Option<&MetricsTable> {
        self.valid_scores.as_ref()
    }

    /// Number of epochs recorded.
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn push_losses(&mut self, train_loss: f64, valid_loss: f64) -> Result<()> {
        self.loss.push_row(&[train_loss, valid_loss])
    }

    pub fn save_losses(&self) -> Result<()> {
        self.loss.save_csv(&self.dir.join(LOSS_FILE))
    }

    /// Appends one row to each score table, allocating the tables on first
    /// use, and rewrites both files.
    pub fn record_scores(&mut self, train: &[f64], valid: &[f64]) -> Result<()> {
        let train_table = self.train_scores.get_or_insert_with(|| MetricsTable::new(train.len()));
        train_table.push_row(train)?;
        let valid_table = self.valid_scores.get_or_insert_with(|| MetricsTable::new(valid.len()));
        valid_table.push_row(valid)?;

        train_table.save_csv(&self.dir.join(TRAIN_SCORES_FILE))?;
        valid_table.save_csv(&self.dir.join(VALID_SCORES_FILE))
    }
}

fn load_or_empty(path: &Path, columns: usize) -> Result<MetricsTable> {
    if path.exists() {
        MetricsTable::load_csv(path, columns)
    } else {
        Ok(MetricsTable::new(columns))
    }
}
