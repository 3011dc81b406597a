//! Table recovery from positioned text.
//!
//! pdfium exposes text runs with bounding boxes but no table structure, so
//! tables are inferred from alignment:
//!
//! 1. Group spans into lines by vertical centre
//! 2. Split each line into cells wherever the horizontal gap is at least
//!    `min_column_gap`
//! 3. A run of `min_rows` or more consecutive lines with `min_columns` or
//!    more cells is a table
//! 4. Cluster cell left edges into column anchors, so a row with a missing
//!    cell gets `None` in that column instead of shifting left
//!
//! Coordinates are PDF points with the origin at the bottom-left, so `top`
//! is greater than `bottom` and reading order is descending y.

use crate::document::{Row, Table};
use tracing::debug;

/// A run of text with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl TextSpan {
    fn center_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    fn height(&self) -> f32 {
        (self.top - self.bottom).abs()
    }
}

#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    pub min_rows: usize,
    pub min_columns: usize,
    /// Above this, the line is word-split prose rather than a table.
    pub max_columns: usize,
    /// Minimum horizontal gap (points) that separates two cells.
    pub min_column_gap: f32,
    /// Cell left edges closer than this (points) share a column.
    pub column_tolerance: f32,
    /// Line grouping tolerance as a fraction of span height.
    pub y_tolerance_factor: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 12,
            min_column_gap: 15.0,
            column_tolerance: 10.0,
            y_tolerance_factor: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
struct CellText {
    left: f32,
    right: f32,
    text: String,
}

type Line = Vec<CellText>;

/// Detect tables in the spans of one page, in reading order.
pub fn detect_tables(spans: &[TextSpan], config: &TableDetectorConfig) -> Vec<Table> {
    let lines: Vec<Line> = group_lines(spans, config)
        .into_iter()
        .map(|line| split_cells(line, config))
        .collect();

    let mut tables = Vec::new();
    let mut run: Vec<&Line> = Vec::new();
    for line in &lines {
        if line.len() >= config.min_columns && line.len() <= config.max_columns {
            run.push(line);
        } else {
            flush_run(&mut run, &mut tables, config);
        }
    }
    flush_run(&mut run, &mut tables, config);

    debug!("Detected {} tables from {} spans", tables.len(), spans.len());
    tables
}

fn flush_run(run: &mut Vec<&Line>, tables: &mut Vec<Table>, config: &TableDetectorConfig) {
    if run.len() >= config.min_rows {
        tables.push(build_table(run, config));
    }
    run.clear();
}

fn group_lines<'a>(spans: &'a [TextSpan], config: &TableDetectorConfig) -> Vec<Vec<&'a TextSpan>> {
    let mut sorted: Vec<&TextSpan> = spans.iter().filter(|s| !s.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| {
        b.center_y()
            .total_cmp(&a.center_y())
            .then(a.left.total_cmp(&b.left))
    });

    let mut lines: Vec<Vec<&TextSpan>> = Vec::new();
    let mut line_y = f32::NAN;
    for span in sorted {
        let tolerance = (span.height() * config.y_tolerance_factor).max(1.0);
        match lines.last_mut() {
            Some(line) if (span.center_y() - line_y).abs() <= tolerance => line.push(span),
            _ => {
                line_y = span.center_y();
                lines.push(vec![span]);
            }
        }
    }
    lines
}

fn split_cells(mut line: Vec<&TextSpan>, config: &TableDetectorConfig) -> Line {
    line.sort_by(|a, b| a.left.total_cmp(&b.left));

    let mut cells: Line = Vec::new();
    for span in line {
        let text = span.text.trim();
        match cells.last_mut() {
            Some(cell) if span.left - cell.right < config.min_column_gap => {
                if span.left - cell.right > 1.0 {
                    cell.text.push(' ');
                }
                cell.text.push_str(text);
                cell.right = cell.right.max(span.right);
            }
            _ => cells.push(CellText {
                left: span.left,
                right: span.right,
                text: text.to_string(),
            }),
        }
    }
    cells
}

fn build_table(lines: &[&Line], config: &TableDetectorConfig) -> Table {
    let anchors = column_anchors(lines, config.column_tolerance);

    let rows = lines
        .iter()
        .map(|line| {
            let mut cells: Vec<Option<String>> = vec![None; anchors.len()];
            for cell in line.iter() {
                let col = nearest_anchor(&anchors, cell.left);
                match &mut cells[col] {
                    Some(existing) => {
                        existing.push(' ');
                        existing.push_str(&cell.text);
                    }
                    slot => *slot = Some(cell.text.clone()),
                }
            }
            Row::new(cells)
        })
        .collect();

    Table::new(rows)
}

/// Cluster left edges; each anchor is the mean of its cluster.
fn column_anchors(lines: &[&Line], tolerance: f32) -> Vec<f32> {
    let mut lefts: Vec<f32> = lines.iter().flat_map(|l| l.iter().map(|c| c.left)).collect();
    lefts.sort_by(f32::total_cmp);

    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for x in lefts {
        match clusters.last_mut() {
            Some(c) if x - c[c.len() - 1] <= tolerance => c.push(x),
            _ => clusters.push(vec![x]),
        }
    }
    clusters
        .iter()
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

fn nearest_anchor(anchors: &[f32], x: f32) -> usize {
    anchors
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (x - **a).abs().total_cmp(&(x - **b).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
