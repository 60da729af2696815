//! A finite-domain dynamic-programming model, in the form consumed by DP solvers.
//!
//! A [`Model`] is made of:
//!  - state variables, each with a finite domain of labelled values and an initial value,
//!  - transitions, each with a conjunction of tests on the state variables, a set of
//!    assignments applied in parallel and a non-negative cost,
//!  - base cases: conjunctions of tests that terminate the recursion with a cost of zero.
//!
//! The model is assembled through a [`ModelBuilder`] and is immutable once built.
//! Solving is delegated to an external implementation of the [`Solver`] trait.

#[macro_use]
pub mod refs;
mod errors;
mod model;
mod solver;
mod state;

pub use errors::ModelCheckError;
pub use model::*;
pub use solver::*;
pub use state::*;

/// Value of a state variable: index of the value in the variable's domain.
pub type Value = u32;

/// Cost of a transition or of a sequence of transitions.
pub type Cost = i64;
