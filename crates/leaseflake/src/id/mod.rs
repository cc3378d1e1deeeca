mod leaseflake;

pub use leaseflake::*;
