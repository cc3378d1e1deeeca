mod interface;
mod sqlite;

pub use interface::*;
pub use sqlite::*;
