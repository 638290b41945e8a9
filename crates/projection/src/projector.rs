use crate::error::{ProjectionError, Result};
use crate::types::{Coordinates, ProgressReporter, ProjectionInput, ProjectionOptions, ProjectionOutput};
use async_trait::async_trait;

/// Maps equal-length answer vectors to 2-D coordinates.
///
/// `project` resolves once with coordinates for every candidate row, or
/// fails; it never yields a partial mapping. Progress may be reported any
/// number of times, including not at all.
#[async_trait]
pub trait DataProjector: Send + Sync {
    fn name(&self) -> &str;

    async fn project(
        &mut self,
        input: ProjectionInput,
        progress: ProgressReporter,
        options: ProjectionOptions,
    ) -> Result<ProjectionOutput>;

    /// Whether [`DataProjector::predict`] can place an entity directly.
    fn supports_predict(&self) -> bool {
        false
    }

    /// Place a single vector using the state of the last run.
    fn predict(&self, _datum: &[f64]) -> Result<Coordinates> {
        Err(ProjectionError::PredictUnsupported(self.name().to_string()))
    }

    /// Stop an outstanding run. No-op for projectors that never suspend.
    fn cancel(&mut self) {}
}
