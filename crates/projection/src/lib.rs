//! # Votematch Projection
//!
//! Maps equal-length answer vectors to 2-D coordinates.
//!
//! ## Architecture
//!
//! ```text
//! ProjectionInput (rows + optional voter row)
//!     │
//!     ├──> ManhattanProjector
//!     │      ├─ x: L1 distance to the voter (or the 0.5 centre)
//!     │      ├─ y: L∞ distance (visual spread)
//!     │      └─ predict(): place a party from its own vector
//!     │
//!     └──> StressProjector (iterative)
//!            ├─ background task, N steps per tick
//!            ├─ progress over broadcast::Sender<u8>
//!            └─ watch-based cancellation
//!     │
//!     ▼
//! ProjectionOutput { coordinates (row-aligned), voter }
//! ```

mod error;
mod manhattan;
mod projector;
mod stress;
mod types;

pub use error::{ProjectionError, Result};
pub use manhattan::{ManhattanProjector, DEFAULT_REFERENCE_FILL};
pub use projector::DataProjector;
pub use stress::{CancelHandle, StressOptions, StressProjector};
pub use types::{
    Coordinates, ProgressReporter, ProjectedMapping, ProjectionInput, ProjectionOptions,
    ProjectionOutput,
};
