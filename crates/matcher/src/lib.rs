//! # Votematch Matcher
//!
//! Loads one constituency's election data, keeps the voter's answers and
//! favourites, applies candidate filters and runs projections.
//!
//! ## Readiness
//!
//! ```text
//! init() ──> constituencies Ready
//!
//! set_municipality()
//!     │  questions, candidates, mapping, filters ──> NotReady
//!     │  load categories, questions, correlations, parties, candidates
//!     │  restore stored answers, cull parties and candidates
//!     ▼
//! questions Ready ──> candidates Ready
//!                          │
//!                          ├──> restore favourites ──> favourites Ready
//!                          └──> rebuild filters ────> filters Ready
//!
//! set_voter_answer() ──> questions Updated ──> mapping NotReady
//! init_mapping()     ──> mapping Ready
//! ```
//!
//! Every cascade is declared in [`status::CASCADE`] and dispatched before the
//! triggering call returns.

pub mod config;
mod error;
mod matcher;
pub mod provider;
pub mod registry;
pub mod status;
pub mod storage;

pub use config::{FilterSpec, MatcherConfig};
pub use error::{MatcherError, Result};
pub use matcher::{MappingResult, Matcher, MatcherState, PARTY_FILTER, QUESTION_FILTER};
pub use provider::{CorrelationMatrix, DataProvider, EventParams, SessionStatistics};
pub use registry::{MethodProperties, ProjectorFactory, ProjectorRegistry};
pub use status::{DataStatus, DataStream, StatusChange};
pub use storage::{KeyValueStore, MemoryStore, StoredValue};
