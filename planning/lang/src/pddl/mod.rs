mod find_file;
mod parser;

pub use find_file::find_domain_of;
pub use parser::*;
