//! # Votematch Model
//!
//! Questions, answers and the entities a voter is matched against.
//!
//! ## Question Model
//!
//! ```text
//! Question
//!     │
//!     ├──> QuestionKind::Numeric (NumericScale)
//!     │      ├─ ordered {key, label} domain
//!     │      ├─ min / max / neutral answers
//!     │      └─ distance, inversion, agreement classification
//!     │
//!     ├──> QuestionKind::PreferenceOrder (PreferenceScale)
//!     │      └─ pairwise expansion for projection
//!     │
//!     └──> QuestionKind::Text (background information)
//! ```
//!
//! ## Example
//!
//! ```
//! use votematch_model::{AgreementType, Answer, NumericScale, Question};
//!
//! let mut question = Question::numeric("taxes", NumericScale::default());
//! question.set_voter_answer(Answer::Number(3.0)).unwrap();
//!
//! let candidate = Answer::Number(4.0);
//! let kind = question
//!     .match_answers(question.voter_answer(), Some(&candidate), false)
//!     .unwrap();
//! assert_eq!(kind, AgreementType::MostlyAgree);
//! ```

mod agreement;
mod answer;
mod entity;
mod error;
mod question;
mod scale;

pub use agreement::AgreementType;
pub use answer::Answer;
pub use entity::{
    AnswerSource, Candidate, CandidateDict, Category, CategoryDict, Constituency,
    ConstituencyDict, Municipality, MunicipalityDict, Party, PartyDict,
};
pub use error::{ModelError, Result};
pub use question::{Question, QuestionDict, QuestionKind};
pub use scale::{NumericScale, PreferenceScale, ScaleValue};
