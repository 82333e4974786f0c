//! Plain-text 4×4 affine matrix files (`*_affine.mat`).
//!
//! One matrix row per line, four whitespace separated numbers per row. The
//! matrix maps physical points of the reference space to the moving space.

use anyhow::{bail, Context, Result};
use ctlesion_core::transform::AffineMatrix;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

/// Render a matrix in the `.mat` text layout.
pub fn format_affine(matrix: &AffineMatrix) -> String {
    let mut out = String::new();
    for row in matrix.to_rows() {
        let cells: Vec<String> = row.iter().map(|v| format!("{}", v)).collect();
        let _ = writeln!(out, "{}", cells.join("  "));
    }
    out
}

/// Parse the `.mat` text layout.
pub fn parse_affine(text: &str) -> Result<AffineMatrix> {
    let mut rows = Vec::with_capacity(4);
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|cell| cell.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid number on line {}", line_no + 1))?;
        let row: [f64; 4] = match row.try_into() {
            Ok(row) => row,
            Err(row) => bail!("Line {} has {} values, expected 4", line_no + 1, row.len()),
        };
        rows.push(row);
    }
    let rows: [[f64; 4]; 4] = match rows.try_into() {
        Ok(rows) => rows,
        Err(rows) => bail!("Affine file has {} rows, expected 4", rows.len()),
    };
    Ok(AffineMatrix::from_rows(rows)?)
}

pub fn write_affine<P: AsRef<Path>>(path: P, matrix: &AffineMatrix) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, format_affine(matrix))
        .with_context(|| format!("Failed to write affine matrix {}", path.display()))?;
    debug!(path = %path.display(), "wrote affine matrix");
    Ok(())
}

pub fn read_affine<P: AsRef<Path>>(path: P) -> Result<AffineMatrix> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read affine matrix {}", path.display()))?;
    parse_affine(&text).with_context(|| format!("Malformed affine matrix {}", path.display()))
}
