use crate::error::{ProjectionError, Result};
use crate::projector::DataProjector;
use crate::types::{
    Coordinates, ProgressReporter, ProjectionInput, ProjectionOptions, ProjectionOutput,
};
use async_trait::async_trait;
use ndarray::{Array2, ArrayView1};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
const MIN_DISTANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct StressOptions {
    pub learning_rate: f64,
    /// Descent steps per tick.
    pub step_chunk: usize,
    pub max_chunks: usize,
    /// Steps between progress reports.
    pub progress_every: usize,
    /// Pause between chunks, giving other tasks a turn.
    pub tick: Duration,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            step_chunk: 25,
            max_chunks: 40,
            progress_every: 100,
            tick: Duration::from_millis(1),
        }
    }
}

impl StressOptions {
    fn total_steps(&self) -> usize {
        self.step_chunk * self.max_chunks
    }
}

/// Gradient descent on raw stress against normalised L1 distances.
#[derive(Debug, Clone)]
struct StressLayout {
    targets: Array2<f64>,
    positions: Array2<f64>,
    learning_rate: f64,
}

impl StressLayout {
    fn new(matrix: &Array2<f64>, learning_rate: f64) -> Self {
        let n = matrix.nrows();
        let mut targets = Array2::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let t = mean_abs_difference(matrix.row(i), matrix.row(j));
                targets[[i, j]] = t;
                targets[[j, i]] = t;
            }
        }

        // Deterministic sunflower start so runs are reproducible
        let mut positions = Array2::zeros((n, 2));
        for i in 0..n {
            let radius = 0.5 * ((i as f64 + 0.5) / n as f64).sqrt();
            let theta = i as f64 * GOLDEN_ANGLE;
            positions[[i, 0]] = radius * theta.cos();
            positions[[i, 1]] = radius * theta.sin();
        }

        Self {
            targets,
            positions,
            learning_rate,
        }
    }

    fn len(&self) -> usize {
        self.positions.nrows()
    }

    fn step(&mut self) {
        let n = self.len();
        if n < 2 {
            return;
        }
        let mut gradient = Array2::<f64>::zeros((n, 2));
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = self.positions[[i, 0]] - self.positions[[j, 0]];
                let dy = self.positions[[i, 1]] - self.positions[[j, 1]];
                let distance = dx.hypot(dy);
                if distance < MIN_DISTANCE {
                    continue;
                }
                let factor = 2.0 * (distance - self.targets[[i, j]]) / distance;
                gradient[[i, 0]] += factor * dx;
                gradient[[i, 1]] += factor * dy;
                gradient[[j, 0]] -= factor * dx;
                gradient[[j, 1]] -= factor * dy;
            }
        }
        let scale = self.learning_rate / (n - 1) as f64;
        self.positions.scaled_add(-scale, &gradient);
    }

    /// Fits the layout into the unit square, keeping its aspect ratio.
    fn finish(self) -> Vec<Coordinates> {
        let n = self.len();
        if n == 0 {
            return Vec::new();
        }
        let column = |axis: usize| self.positions.column(axis);
        let bounds = |axis: usize| {
            column(axis)
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        };
        let (min_x, max_x) = bounds(0);
        let (min_y, max_y) = bounds(1);
        let span = (max_x - min_x).max(max_y - min_y);
        if span < MIN_DISTANCE {
            return vec![[0.5, 0.5]; n];
        }
        self.positions
            .rows()
            .into_iter()
            .map(|p| [(p[0] - min_x) / span, (p[1] - min_y) / span])
            .collect()
    }
}

fn mean_abs_difference(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let (sum, count) = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .fold((0.0, 0usize), |(sum, count), (x, y)| {
            (sum + (x - y).abs(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Stops the run that was current when [`CancelHandle::cancel`] was called.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled_through: Arc<watch::Sender<u64>>,
    current_run: Arc<AtomicU64>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let run = self.current_run.load(Ordering::SeqCst);
        self.cancelled_through.send_if_modified(|through| {
            if *through < run {
                *through = run;
                true
            } else {
                false
            }
        });
    }
}

/// Iterative 2-D layout that runs in a background task and yields between
/// chunks of work.
///
/// Starting a new run cancels any run still in flight; a cancelled run
/// resolves with [`ProjectionError::Cancelled`].
#[derive(Debug)]
pub struct StressProjector {
    options: StressOptions,
    handle: CancelHandle,
}

impl StressProjector {
    #[must_use]
    pub fn new(options: StressOptions) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            options,
            handle: CancelHandle {
                cancelled_through: Arc::new(tx),
                current_run: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

impl Default for StressProjector {
    fn default() -> Self {
        Self::new(StressOptions::default())
    }
}

// A dropped `project` future takes its projector with it; stop the task too.
impl Drop for StressProjector {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

#[async_trait]
impl DataProjector for StressProjector {
    fn name(&self) -> &str {
        "Stress"
    }

    async fn project(
        &mut self,
        input: ProjectionInput,
        progress: ProgressReporter,
        options: ProjectionOptions,
    ) -> Result<ProjectionOutput> {
        input.validate()?;
        self.handle.cancel();
        let run = self.handle.current_run.fetch_add(1, Ordering::SeqCst) + 1;
        let cancelled = self.handle.cancelled_through.subscribe();

        let with_voter = input.voter.is_some() && !options.disable_voter;
        let matrix = input.to_matrix(with_voter)?;
        let rows = input.data.len();
        let mut layout = StressLayout::new(&matrix, self.options.learning_rate);
        let settings = self.options.clone();

        log::debug!(
            "Stress projection run {} started: {} rows x {} dims",
            run,
            matrix.nrows(),
            matrix.ncols()
        );

        let task = tokio::spawn(async move {
            let total = settings.total_steps().max(1);
            let mut interval = tokio::time::interval(settings.tick);
            let mut done = 0usize;
            for _ in 0..settings.max_chunks {
                interval.tick().await;
                if *cancelled.borrow() >= run {
                    return None;
                }
                for _ in 0..settings.step_chunk {
                    layout.step();
                    done += 1;
                    if settings.progress_every > 0 && done % settings.progress_every == 0 {
                        // 100 is reserved for the resolved result
                        let percent = (done * 100 / total).min(99);
                        progress.report(u8::try_from(percent).unwrap_or(99));
                    }
                }
            }
            Some((layout.finish(), progress))
        });

        let (mut coordinates, progress) = task
            .await
            .map_err(|e| ProjectionError::Computation(e.to_string()))?
            .ok_or_else(|| {
                log::debug!("Stress projection run {} cancelled", run);
                ProjectionError::Cancelled
            })?;

        let voter = if with_voter {
            coordinates.pop()
        } else {
            None
        };
        debug_assert_eq!(coordinates.len(), rows);
        progress.report(100);

        Ok(ProjectionOutput { coordinates, voter })
    }

    fn cancel(&mut self) {
        self.handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clustered() -> ProjectionInput {
        ProjectionInput::new(
            vec![
                vec![0.0, 0.0, 0.0],
                vec![0.0, 0.1, 0.0],
                vec![1.0, 1.0, 1.0],
                vec![1.0, 0.9, 1.0],
            ],
            Some(vec![0.0, f64::NAN, 0.0]),
        )
    }

    fn distance(a: Coordinates, b: Coordinates) -> f64 {
        (a[0] - b[0]).hypot(a[1] - b[1])
    }

    #[tokio::test(start_paused = true)]
    async fn separates_clusters_within_unit_square() {
        let mut projector = StressProjector::default();
        let output = projector
            .project(clustered(), ProgressReporter::silent(), ProjectionOptions::default())
            .await
            .unwrap();

        assert_eq!(output.coordinates.len(), 4);
        let voter = output.voter.unwrap();
        for point in output.coordinates.iter().chain(std::iter::once(&voter)) {
            assert!((0.0..=1.0).contains(&point[0]));
            assert!((0.0..=1.0).contains(&point[1]));
        }
        let c = &output.coordinates;
        assert!(distance(c[0], c[1]) < distance(c[0], c[2]));
        assert!(distance(c[2], c[3]) < distance(c[1], c[3]));
        assert!(distance(voter, c[0]) < distance(voter, c[2]));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_ends_at_100() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(64);
        let mut projector = StressProjector::default();
        projector
            .project(clustered(), ProgressReporter::new(tx), ProjectionOptions::default())
            .await
            .unwrap();

        let mut reports = Vec::new();
        while let Ok(p) = rx.try_recv() {
            reports.push(p);
        }
        assert_eq!(reports.last(), Some(&100));
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert!(reports[..reports.len() - 1].iter().all(|p| *p < 100));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_never_resolves_with_a_mapping() {
        let mut projector = StressProjector::default();
        let handle = projector.cancel_handle();
        let run = projector.project(
            clustered(),
            ProgressReporter::silent(),
            ProjectionOptions::default(),
        );
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel);
        assert_eq!(result, Err(ProjectionError::Cancelled));

        // The next run is unaffected by the earlier cancel
        let output = projector
            .project(clustered(), ProgressReporter::silent(), ProjectionOptions::default())
            .await
            .unwrap();
        assert_eq!(output.coordinates.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_projector_stops_its_run() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(64);
        let mut projector = StressProjector::new(StressOptions {
            tick: Duration::from_millis(10),
            max_chunks: 1000,
            ..StressOptions::default()
        });
        let run = projector.project(
            clustered(),
            ProgressReporter::new(tx),
            ProjectionOptions::default(),
        );
        assert!(tokio::time::timeout(Duration::from_millis(50), run)
            .await
            .is_err());
        drop(projector);
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_voter_is_not_laid_out() {
        let mut projector = StressProjector::default();
        let output = projector
            .project(
                clustered(),
                ProgressReporter::silent(),
                ProjectionOptions {
                    disable_voter: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(output.voter, None);
        assert_eq!(output.coordinates.len(), 4);
    }

    #[test]
    fn degenerate_layouts_sit_in_the_middle() {
        let matrix = Array2::from_elem((1, 2), 0.3);
        let layout = StressLayout::new(&matrix, 0.1);
        assert_eq!(layout.finish(), vec![[0.5, 0.5]]);
    }

    #[test]
    fn predict_is_unsupported() {
        let projector = StressProjector::default();
        assert!(!projector.supports_predict());
        assert!(matches!(
            projector.predict(&[0.0]),
            Err(ProjectionError::PredictUnsupported(_))
        ));
    }
}
