//! Pure numeric operations over rectangular grids.
//!
//! Nothing here mutates its inputs; every function returns a freshly
//! allocated grid or scalar, or a [`CollabError`] before any work is done.

use super::model::Grid;
use crate::error::{CollabError, CollabResult};

/// Determinant magnitude below which a matrix is treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-10;

/// Returns (rows, columns) or rejects empty and ragged grids.
pub fn shape(grid: &[Vec<f64>]) -> CollabResult<(usize, usize)> {
    let rows = grid.len();
    let columns = grid.first().map(|r| r.len()).unwrap_or(0);
    if rows == 0 || columns == 0 {
        return Err(CollabError::InvalidInput(
            "Matrix must have at least one row and one column".to_string(),
        ));
    }
    if grid.iter().any(|r| r.len() != columns) {
        return Err(CollabError::InvalidInput(
            "Matrix rows must all have the same length".to_string(),
        ));
    }
    Ok((rows, columns))
}

pub fn transpose(grid: &[Vec<f64>]) -> CollabResult<Grid> {
    let (rows, columns) = shape(grid)?;
    Ok((0..columns)
        .map(|c| (0..rows).map(|r| grid[r][c]).collect())
        .collect())
}

/// Determinant by Laplace expansion along the first row.
///
/// Cost grows factorially with the dimension. Callers that accept
/// user-supplied sizes should cap them before calling.
pub fn determinant(grid: &[Vec<f64>]) -> CollabResult<f64> {
    let (rows, columns) = shape(grid)?;
    if rows != columns {
        return Err(CollabError::NotSquare);
    }
    let row_idx: Vec<usize> = (0..rows).collect();
    let col_idx: Vec<usize> = (0..columns).collect();
    Ok(cofactor_expansion(grid, &row_idx, &col_idx))
}

/// Determinant of the sub-grid selected by `rows` x `cols`.
/// Minors are described by index lists; the grid itself is never copied.
fn cofactor_expansion(grid: &[Vec<f64>], rows: &[usize], cols: &[usize]) -> f64 {
    match cols.len() {
        1 => grid[rows[0]][cols[0]],
        2 => {
            let (r0, r1) = (rows[0], rows[1]);
            let (c0, c1) = (cols[0], cols[1]);
            grid[r0][c0] * grid[r1][c1] - grid[r0][c1] * grid[r1][c0]
        }
        n => {
            let top = rows[0];
            let below = &rows[1..];
            let mut minor_cols = Vec::with_capacity(n - 1);
            let mut det = 0.0;
            for (i, &col) in cols.iter().enumerate() {
                minor_cols.clear();
                minor_cols.extend(cols.iter().copied().filter(|&c| c != col));
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                det += sign * grid[top][col] * cofactor_expansion(grid, below, &minor_cols);
            }
            det
        }
    }
}

/// Closed-form inverse. Only 2x2 grids are supported.
pub fn inverse(grid: &[Vec<f64>]) -> CollabResult<Grid> {
    let (rows, columns) = shape(grid)?;
    if rows != columns {
        return Err(CollabError::NotSquare);
    }
    if rows != 2 {
        return Err(CollabError::UnsupportedOperation(format!(
            "inverse is only implemented for 2x2 matrices, got {}x{}",
            rows, columns
        )));
    }
    let det = determinant(grid)?;
    if det.abs() < SINGULAR_EPSILON {
        return Err(CollabError::SingularMatrix);
    }
    let (a, b) = (grid[0][0], grid[0][1]);
    let (c, d) = (grid[1][0], grid[1][1]);
    Ok(vec![vec![d / det, -b / det], vec![-c / det, a / det]])
}

pub fn add(left: &[Vec<f64>], right: &[Vec<f64>]) -> CollabResult<Grid> {
    elementwise(left, right, |a, b| a + b)
}

pub fn subtract(left: &[Vec<f64>], right: &[Vec<f64>]) -> CollabResult<Grid> {
    elementwise(left, right, |a, b| a - b)
}

fn elementwise(
    left: &[Vec<f64>],
    right: &[Vec<f64>],
    op: impl Fn(f64, f64) -> f64,
) -> CollabResult<Grid> {
    let left_shape = shape(left)?;
    let right_shape = shape(right)?;
    if left_shape != right_shape {
        return Err(CollabError::DimensionMismatch(format!(
            "operands must have the same dimensions ({}x{} vs {}x{})",
            left_shape.0, left_shape.1, right_shape.0, right_shape.1
        )));
    }
    Ok(left
        .iter()
        .zip(right)
        .map(|(l, r)| l.iter().zip(r).map(|(&a, &b)| op(a, b)).collect())
        .collect())
}

pub fn multiply(left: &[Vec<f64>], right: &[Vec<f64>]) -> CollabResult<Grid> {
    let (rows, inner) = shape(left)?;
    let (right_rows, columns) = shape(right)?;
    if inner != right_rows {
        return Err(CollabError::DimensionMismatch(format!(
            "left columns ({}) must equal right rows ({})",
            inner, right_rows
        )));
    }
    Ok((0..rows)
        .map(|i| {
            (0..columns)
                .map(|j| (0..inner).map(|k| left[i][k] * right[k][j]).sum())
                .collect()
        })
        .collect())
}

/// `left * inverse(right)`.
pub fn divide(left: &[Vec<f64>], right: &[Vec<f64>]) -> CollabResult<Grid> {
    shape(left)?;
    let inv = inverse(right)?;
    multiply(left, &inv)
}
