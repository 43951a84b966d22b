use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Dense row-major matrix of feature values
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Create a matrix from row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, CoreError> {
        if rows * cols != data.len() {
            return Err(CoreError::ValidationError(format!(
                "Matrix shape {}x{} does not match {} values",
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Create an all-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from per-row vectors; every row must have the same width
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, CoreError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(CoreError::ValidationError(format!(
                    "Row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Build a single-column matrix
    pub fn column(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
        }
    }

    /// Number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the matrix has no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Value at (row, col)
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Slice of one row
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterate over rows
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Copy the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self, CoreError> {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            if i >= self.rows {
                return Err(CoreError::ValidationError(format!(
                    "Row index {} out of range for {} rows",
                    i, self.rows
                )));
            }
            data.extend_from_slice(self.row(i));
        }
        Ok(Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        })
    }

    /// Copy a contiguous range of columns
    pub fn select_columns(&self, columns: Range<usize>) -> Result<Self, CoreError> {
        if columns.start > columns.end || columns.end > self.cols {
            return Err(CoreError::ValidationError(format!(
                "Column range {:?} out of range for {} columns",
                columns, self.cols
            )));
        }
        let width = columns.end - columns.start;
        let mut data = Vec::with_capacity(self.rows * width);
        for r in 0..self.rows {
            data.extend_from_slice(&self.row(r)[columns.clone()]);
        }
        Ok(Self {
            rows: self.rows,
            cols: width,
            data,
        })
    }

    /// Concatenate matrices column-wise; all must have the same row count
    pub fn hstack(parts: &[&FeatureMatrix]) -> Result<Self, CoreError> {
        let rows = parts.first().map(|m| m.rows).unwrap_or(0);
        if let Some(bad) = parts.iter().find(|m| m.rows != rows) {
            return Err(CoreError::ValidationError(format!(
                "Cannot stack matrices with {} and {} rows",
                rows, bad.rows
            )));
        }
        let cols = parts.iter().map(|m| m.cols).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(r));
            }
        }
        Ok(Self { rows, cols, data })
    }
}

/// A value flowing between pipeline steps
///
/// Everything except `Scalar` is row-aligned: the i-th element belongs to the
/// i-th input row, which is what lets the dispatcher re-run steps on a subset
/// of rows.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum DataPacket {
    /// One raw value per row (texts, records)
    Rows(Vec<serde_json::Value>),
    /// Dense features, one matrix row per input row
    Matrix(FeatureMatrix),
    /// One boolean per row
    Labels(Vec<bool>),
    /// A value not tied to rows, passed through row selection unchanged
    Scalar(serde_json::Value),
}

impl DataPacket {
    /// Row-aligned packet from any iterator of JSON-convertible values
    pub fn rows<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<serde_json::Value>,
    {
        DataPacket::Rows(values.into_iter().map(Into::into).collect())
    }

    /// Number of rows, `None` for scalars
    pub fn num_rows(&self) -> Option<usize> {
        match self {
            DataPacket::Rows(values) => Some(values.len()),
            DataPacket::Matrix(matrix) => Some(matrix.rows()),
            DataPacket::Labels(labels) => Some(labels.len()),
            DataPacket::Scalar(_) => None,
        }
    }

    /// Borrow as a feature matrix
    pub fn as_matrix(&self) -> Option<&FeatureMatrix> {
        match self {
            DataPacket::Matrix(matrix) => Some(matrix),
            _ => None,
        }
    }

    /// Borrow as raw row values
    pub fn as_rows(&self) -> Option<&[serde_json::Value]> {
        match self {
            DataPacket::Rows(values) => Some(values),
            _ => None,
        }
    }

    /// Borrow as labels
    pub fn as_labels(&self) -> Option<&[bool]> {
        match self {
            DataPacket::Labels(labels) => Some(labels),
            _ => None,
        }
    }

    /// Borrow as a scalar
    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            DataPacket::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Keep only the given rows; scalars are returned unchanged
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self, CoreError> {
        let out_of_range = |len: usize| {
            indices
                .iter()
                .find(|&&i| i >= len)
                .map(|i| {
                    CoreError::ValidationError(format!(
                        "Row index {} out of range for {} rows",
                        i, len
                    ))
                })
        };

        match self {
            DataPacket::Rows(values) => match out_of_range(values.len()) {
                Some(err) => Err(err),
                None => Ok(DataPacket::Rows(
                    indices.iter().map(|&i| values[i].clone()).collect(),
                )),
            },
            DataPacket::Labels(labels) => match out_of_range(labels.len()) {
                Some(err) => Err(err),
                None => Ok(DataPacket::Labels(indices.iter().map(|&i| labels[i]).collect())),
            },
            DataPacket::Matrix(matrix) => Ok(DataPacket::Matrix(matrix.select_rows(indices)?)),
            DataPacket::Scalar(value) => Ok(DataPacket::Scalar(value.clone())),
        }
    }
}

impl From<FeatureMatrix> for DataPacket {
    fn from(matrix: FeatureMatrix) -> Self {
        DataPacket::Matrix(matrix)
    }
}
