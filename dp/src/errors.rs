use crate::{Cost, Value};
use thiserror::Error;

/// Structural problems detected when finalizing a model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelCheckError {
    #[error("state variable `{0}` has an empty domain")]
    EmptyDomain(String),
    #[error("initial value {value} of `{variable}` is outside of its domain")]
    InvalidInitialValue { variable: String, value: Value },
    #[error("`{context}` refers to an unknown state variable (index {index})")]
    UnknownVariable { context: String, index: usize },
    #[error("`{context}` uses value {value} that is outside of the domain of `{variable}`")]
    ValueOutOfDomain { context: String, variable: String, value: Value },
    #[error("transition `{transition}` assigns `{variable}` more than once")]
    DuplicateAssignment { transition: String, variable: String },
    #[error("transition `{transition}` has a negative cost ({cost})")]
    NegativeCost { transition: String, cost: Cost },
}
