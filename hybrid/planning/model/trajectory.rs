use serde::{Deserialize, Serialize};

use crate::module::PlanningError;

/// Dense `rows x cols` buffer for one attribute, stored column-major, with a parallel
/// free mask. Cells only ever move from free to locked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrBuffer {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    free: Vec<bool>,
}

impl AttrBuffer {
    /// Creates an undefined (NaN), fully free buffer.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![f64::NAN; rows * cols],
            free: vec![true; rows * cols],
        }
    }

    /// Row count.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    fn offset(&self, col: usize) -> Result<usize, PlanningError> {
        if col >= self.cols {
            return Err(PlanningError::StepOutOfRange {
                step: col,
                horizon: self.cols,
            });
        }
        Ok(col * self.rows)
    }

    fn check_len(&self, values: &[f64]) -> Result<(), PlanningError> {
        if values.len() == self.rows {
            Ok(())
        } else {
            Err(PlanningError::DimensionMismatch {
                what: "attribute column".into(),
                expected: self.rows,
                actual: values.len(),
            })
        }
    }

    /// Values of one column.
    pub fn column(&self, col: usize) -> Result<&[f64], PlanningError> {
        let start = self.offset(col)?;
        Ok(&self.values[start..start + self.rows])
    }

    /// Free mask of one column.
    pub fn free_mask(&self, col: usize) -> Result<&[bool], PlanningError> {
        let start = self.offset(col)?;
        Ok(&self.free[start..start + self.rows])
    }

    /// True when the cell may still be written.
    pub fn is_free(&self, row: usize, col: usize) -> Result<bool, PlanningError> {
        Ok(self.free_mask(col)?.get(row).copied().unwrap_or(false))
    }

    /// True when every row of the column is locked.
    pub fn is_locked(&self, col: usize) -> Result<bool, PlanningError> {
        Ok(self.free_mask(col)?.iter().all(|free| !free))
    }

    /// True when every value in the column is finite.
    pub fn is_defined(&self, col: usize) -> Result<bool, PlanningError> {
        Ok(self.column(col)?.iter().all(|value| value.is_finite()))
    }

    /// Writes `values` into the free rows of a column and returns the rows written.
    /// Locked rows are left untouched.
    pub fn write_free(&mut self, col: usize, values: &[f64]) -> Result<Vec<usize>, PlanningError> {
        self.check_len(values)?;
        let start = self.offset(col)?;
        let mut written = Vec::new();
        for (row, value) in values.iter().enumerate() {
            if self.free[start + row] {
                self.values[start + row] = *value;
                written.push(row);
            }
        }
        Ok(written)
    }

    /// Locks the given rows of a column. A row that is locked but undefined is a
    /// contract violation.
    pub fn lock_rows(&mut self, col: usize, rows: &[usize]) -> Result<(), PlanningError> {
        let start = self.offset(col)?;
        for &row in rows {
            if row >= self.rows {
                return Err(PlanningError::DimensionMismatch {
                    what: "lock row".into(),
                    expected: self.rows,
                    actual: row + 1,
                });
            }
            if !self.values[start + row].is_finite() {
                return Err(PlanningError::Config(format!(
                    "cannot lock undefined cell ({row}, {col})"
                )));
            }
            self.free[start + row] = false;
        }
        Ok(())
    }

    /// Locks every row of a column.
    pub fn lock(&mut self, col: usize) -> Result<(), PlanningError> {
        let rows: Vec<usize> = (0..self.rows).collect();
        self.lock_rows(col, &rows)
    }

    /// Writes free rows then locks the whole column; used to commit known values.
    pub fn fix(&mut self, col: usize, values: &[f64]) -> Result<(), PlanningError> {
        self.write_free(col, values)?;
        self.lock(col)
    }

    /// Number of locked cells; never decreases.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.free.iter().filter(|free| !**free).count()
    }
}
