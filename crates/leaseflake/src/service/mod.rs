mod id_service;
mod slot_source;

pub use id_service::*;
pub use slot_source::*;
