use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Filter '{name}' is not a {expected} filter")]
    WrongKind { name: String, expected: &'static str },
}
