//! Textual inputs of the translator: PDDL domains and problems, and SAS+ tasks.
//!
//! All parsers report failures as [`errors::Message`] diagnostics that point to the offending
//! part of the source.

pub mod errors;
pub mod input;
pub mod pddl;
pub mod sas;
pub mod sexpr;
mod sym;

pub use errors::{Message, Res, Span, Spanned};
pub use input::Input;
pub use sym::Sym;
