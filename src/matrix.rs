//! Dense matrices and vectors, and how they are stored on disk.
//!
//! Matrices are written as a flat, row-major sequence of `f64`s encoded with `bincode`. The only
//! header is bincode's element count; the shape of a matrix is not stored and must be recovered
//! from its companion zone and destination files.
use crate::error::ModelError;
use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, CowArray, Data, Ix2};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// A dense matrix, indexed as `[origin, destination]`
pub type Matrix = Array2<f64>;

/// A dense vector
pub type Vector = Array1<f64>;

/// A borrowed view of a [`Matrix`]
pub type MatrixView<'a> = ArrayView2<'a, f64>;

/// A matrix which is either owned or borrowed from the caller
pub type CowMatrix<'a> = CowArray<'a, f64, Ix2>;

/// Check that a vector has the expected length
pub fn check_length(what: &str, vector: &Vector, expected: usize) -> Result<()> {
    if vector.len() != expected {
        Err(ModelError::length_mismatch(what, expected, vector.len()))?;
    }

    Ok(())
}

/// Check that a matrix has the expected shape
pub fn check_shape<S>(what: &str, matrix: &ArrayBase<S, Ix2>, expected: (usize, usize)) -> Result<()>
where
    S: Data<Elem = f64>,
{
    if matrix.dim() != expected {
        Err(ModelError::shape_mismatch(what, expected, matrix.dim()))?;
    }

    Ok(())
}

/// Check that every value is finite and non-negative
pub fn check_non_negative<'a, I>(what: &str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    for (idx, value) in values.into_iter().enumerate() {
        anyhow::ensure!(
            value.is_finite() && *value >= 0.0,
            "{what} must contain finite, non-negative values (found {value} at position {idx})"
        );
    }

    Ok(())
}

/// The total of each row (for a flow matrix, the predicted origin totals)
pub fn row_totals(matrix: &Matrix) -> Vector {
    matrix.sum_axis(Axis(1))
}

/// The total of each column (for a flow matrix, the predicted destination totals)
pub fn column_totals(matrix: &Matrix) -> Vector {
    matrix.sum_axis(Axis(0))
}

/// Write a file so that readers only ever see the old contents or the complete new contents.
///
/// The data is written to a temporary file in the same directory, which is then renamed over
/// `file_path`.
pub fn write_atomically<F>(file_path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Could not create temporary file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }

    file.persist(file_path)
        .with_context(|| format!("Could not write {}", file_path.display()))?;

    Ok(())
}

/// Save a matrix to the specified path
pub fn save_matrix(file_path: &Path, matrix: &Matrix) -> Result<()> {
    let matrix = matrix.as_standard_layout();
    let values = matrix
        .as_slice()
        .context("Matrix is not contiguous in memory")?;

    write_atomically(file_path, |writer| {
        bincode::serialize_into(writer, values)?;
        Ok(())
    })
}

/// Load a matrix of the given shape from the specified path
pub fn load_matrix(file_path: &Path, shape: (usize, usize)) -> Result<Matrix> {
    let file =
        File::open(file_path).with_context(|| format!("Could not open {}", file_path.display()))?;
    let values: Vec<f64> = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Could not decode matrix in {}", file_path.display()))?;

    let (rows, cols) = shape;
    if values.len() != rows * cols {
        Err(ModelError::DimensionMismatch {
            what: format!("Matrix in {}", file_path.display()),
            expected: format!("{rows}x{cols} ({} values)", rows * cols),
            actual: format!("{} values", values.len()),
        })?;
    }

    Ok(Matrix::from_shape_vec(shape, values)?)
}
