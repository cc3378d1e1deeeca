#![doc = include_str!("../README.md")]

mod error;
mod generator;
mod id;
mod rand;
mod service;
mod time;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::rand::*;
pub use crate::service::*;
pub use crate::time::*;
