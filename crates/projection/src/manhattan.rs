use crate::error::{ProjectionError, Result};
use crate::projector::DataProjector;
use crate::types::{
    Coordinates, ProgressReporter, ProjectionInput, ProjectionOptions, ProjectionOutput,
};
use async_trait::async_trait;
use ndarray::{Array1, ArrayView1};

/// Reference value per dimension when no voter row is given: the centre of
/// the normalised answer space.
pub const DEFAULT_REFERENCE_FILL: f64 = 0.5;

/// Places every row by its distance to a reference vector (the voter, or a
/// fixed point).
///
/// - x: L1 distance, summed over dimensions. Callers divide by the number of
///   questions to get a value in `[0, 1]`.
/// - y: L∞ distance, the largest single-dimension difference.
///
/// Dimensions where the reference is `NaN` are skipped.
#[derive(Debug, Clone)]
pub struct ManhattanProjector {
    reference_fill: f64,
    reference: Option<Array1<f64>>,
}

impl ManhattanProjector {
    #[must_use]
    pub fn new() -> Self {
        Self::with_reference_fill(DEFAULT_REFERENCE_FILL)
    }

    #[must_use]
    pub fn with_reference_fill(reference_fill: f64) -> Self {
        Self {
            reference_fill,
            reference: None,
        }
    }

    fn place(reference: ArrayView1<'_, f64>, row: ArrayView1<'_, f64>) -> Coordinates {
        let mut l1 = 0.0;
        let mut linf: f64 = 0.0;
        for (r, v) in reference.iter().zip(row.iter()) {
            if r.is_nan() || v.is_nan() {
                continue;
            }
            let diff = (v - r).abs();
            l1 += diff;
            linf = linf.max(diff);
        }
        [l1, linf]
    }
}

impl Default for ManhattanProjector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProjector for ManhattanProjector {
    fn name(&self) -> &str {
        "Manhattan"
    }

    async fn project(
        &mut self,
        input: ProjectionInput,
        progress: ProgressReporter,
        options: ProjectionOptions,
    ) -> Result<ProjectionOutput> {
        input.validate()?;
        let matrix = input.to_matrix(false)?;
        let voter = input.voter.filter(|_| !options.disable_voter);
        let reference = match &voter {
            Some(voter) => Array1::from_vec(voter.clone()),
            None => Array1::from_elem(matrix.ncols(), self.reference_fill),
        };

        log::debug!(
            "Manhattan projection of {} rows x {} dims (voter: {})",
            matrix.nrows(),
            matrix.ncols(),
            voter.is_some()
        );

        let coordinates = matrix
            .rows()
            .into_iter()
            .map(|row| Self::place(reference.view(), row))
            .collect();
        let voter = voter.map(|_| [0.0, 0.0]);

        self.reference = Some(reference);
        progress.report(100);

        Ok(ProjectionOutput { coordinates, voter })
    }

    fn supports_predict(&self) -> bool {
        true
    }

    fn predict(&self, datum: &[f64]) -> Result<Coordinates> {
        let reference = self.reference.as_ref().ok_or_else(|| {
            ProjectionError::Computation("predict called before project".to_string())
        })?;
        if datum.len() != reference.len() {
            return Err(ProjectionError::DimensionMismatch {
                expected: reference.len(),
                actual: datum.len(),
            });
        }
        Ok(Self::place(reference.view(), ArrayView1::from(datum)))
    }
}
