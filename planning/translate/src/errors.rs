use dp_model::ModelCheckError;
use plan_lang::Message;
use thiserror::Error;

/// Inconsistencies in the declared types, objects, predicates, functions and action schemas.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("undeclared type `{0}`")]
    UndeclaredType(String),
    #[error("undeclared object `{0}`")]
    UndeclaredObject(String),
    #[error("undeclared predicate `{0}`")]
    UndeclaredPredicate(String),
    #[error("undeclared function `{0}`")]
    UndeclaredFunction(String),
    #[error("type `{0}` is declared more than once")]
    DuplicateType(String),
    #[error("object `{name}` is declared with type `{previous}` and `{new}`")]
    DuplicateObject { name: String, previous: String, new: String },
    #[error("predicate `{0}` is declared more than once")]
    DuplicatePredicate(String),
    #[error("function `{0}` is declared more than once")]
    DuplicateFunction(String),
    #[error("action `{0}` is declared more than once")]
    DuplicateSchema(String),
    #[error("`{symbol}` expects {expected} arguments but got {found}")]
    ArityMismatch { symbol: String, expected: usize, found: usize },
    #[error("object `{object}` is not of type `{expected}`")]
    TypeMismatch { object: String, expected: String },
    #[error("type `{0}` is its own ancestor")]
    CyclicTypeHierarchy(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroundingError {
    #[error("action `{schema}` refers to the undeclared parameter `{parameter}`")]
    UnboundParameter { schema: String, parameter: String },
    #[error("grounding was cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("the mutex group seeded by `{seed}` exceeds the maximal group size ({size} atoms)")]
    GroupTooLarge { seed: String, size: usize },
    #[error("atoms `{first}` and `{second}` of variable {variable} are both true")]
    MutexViolation { variable: String, first: String, second: String },
    #[error("no value for variable {0} whose domain is exhaustive")]
    MissingValue(String),
    #[error("atom `{0}` is not represented by exactly one state variable")]
    BrokenPartition(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("action `{action}` has a negative cost ({cost})")]
    NegativeCost { action: String, cost: i64 },
    #[error("action `{action}` deletes `{atom}` of a mutex group without requiring it")]
    UnguardedDelete { action: String, atom: String },
    #[error(transparent)]
    Check(#[from] ModelCheckError),
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("{0}")]
    Parse(Message),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error(transparent)]
    Grounding(#[from] GroundingError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("unsupported feature: {0}")]
    Unsupported(String),
}

impl From<Message> for TranslateError {
    fn from(msg: Message) -> Self {
        TranslateError::Parse(msg)
    }
}

impl From<ModelCheckError> for TranslateError {
    fn from(err: ModelCheckError) -> Self {
        TranslateError::Model(ModelError::Check(err))
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
