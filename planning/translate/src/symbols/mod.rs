//! Registries of the symbols of a lifted planning task: types, objects, predicates,
//! static numeric functions and action schemas.

mod schema;
mod table;
mod types;

pub use schema::*;
pub use table::*;
pub use types::*;

dp_model::create_ref_type!(ObjectId);
dp_model::create_ref_type!(PredId);
dp_model::create_ref_type!(FunId);
dp_model::create_ref_type!(SchemaId);

/// Arguments of an atom or of a function application.
pub type Args = smallvec::SmallVec<[ObjectId; 4]>;
