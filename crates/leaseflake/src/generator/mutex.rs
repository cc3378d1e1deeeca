#[cfg(not(feature = "parking-lot"))]
pub(crate) use std::sync::{Mutex, RwLock};

#[cfg(feature = "parking-lot")]
pub(crate) use parking_lot::{Mutex, RwLock};
