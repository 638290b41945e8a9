use crate::error::{ProjectionError, Result};
use ndarray::Array2;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A point on the 2-D map.
pub type Coordinates = [f64; 2];

/// Coordinates index-aligned with the projected rows.
pub type ProjectedMapping = Vec<Coordinates>;

/// One row per candidate plus an optional voter row. All rows share the
/// same length. Missing voter dimensions are `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionInput {
    pub data: Vec<Vec<f64>>,
    pub voter: Option<Vec<f64>>,
}

impl ProjectionInput {
    #[must_use]
    pub fn new(data: Vec<Vec<f64>>, voter: Option<Vec<f64>>) -> Self {
        Self { data, voter }
    }

    /// Row length, taken from the first row (or the voter when there are no
    /// rows).
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.data
            .first()
            .or(self.voter.as_ref())
            .map_or(0, Vec::len)
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self.dimension();
        let rows = self.data.iter().chain(self.voter.iter());
        for row in rows {
            if row.len() != expected {
                return Err(ProjectionError::DimensionMismatch {
                    expected,
                    actual: row.len(),
                });
            }
        }
        Ok(())
    }

    /// Candidate rows as a matrix, optionally with the voter as the last row.
    pub fn to_matrix(&self, include_voter: bool) -> Result<Array2<f64>> {
        let dim = self.dimension();
        let voter = self.voter.as_ref().filter(|_| include_voter);
        let rows = self.data.len() + usize::from(voter.is_some());
        let flat: Vec<f64> = self
            .data
            .iter()
            .chain(voter)
            .flat_map(|row| row.iter().copied())
            .collect();
        Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| ProjectionError::Computation(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// Ignore the voter row even when one is supplied.
    pub disable_voter: bool,
}

/// Result of a full projection run. The voter's position is kept apart from
/// the candidate coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionOutput {
    pub coordinates: ProjectedMapping,
    pub voter: Option<Coordinates>,
}

/// Publishes completion percentages. Values are clamped to `[0, 100]` and
/// never go backwards; with no subscriber reports are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<broadcast::Sender<u8>>,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(tx: broadcast::Sender<u8>) -> Self {
        Self {
            tx: Some(tx),
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent < previous {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(percent);
        }
    }
}
