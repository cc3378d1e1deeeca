mod mutex;
mod status;
#[cfg(test)]
mod tests;
mod worker;

pub(crate) use mutex::*;
pub use status::*;
pub use worker::*;
