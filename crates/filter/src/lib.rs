//! # Votematch Filter
//!
//! Composable, rule-based candidate filters.
//!
//! ## Variants
//!
//! - **Exact match** - required/excluded values over a candidate attribute,
//!   the candidate's party or a question's answers
//! - **Range** - inclusive numeric bounds
//! - **Question agreement** - per-question agreement with the voter, keyed by
//!   [`AgreementType`](votematch_model::AgreementType)
//!
//! Every variant implements [`CandidateFilter`]; `apply` records the verdict
//! on each candidate and returns the number excluded.

mod agreement;
mod error;
mod exact;
mod filter;
mod range;
mod value;

pub use agreement::{QuestionAgreementFilter, RuleTable, ValueGetter};
pub use error::{FilterError, Result};
pub use exact::{ExactMatchFilter, LogicOperator};
pub use filter::{CandidateFilter, Filter};
pub use range::RangeFilter;
pub use value::{FilterValue, ValueSource};
