#![doc = include_str!("../README.md")]

mod config;
mod coordinator;
mod error;
mod owner;
mod store;

pub use crate::config::*;
pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::owner::*;
pub use crate::store::*;
