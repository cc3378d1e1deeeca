mod lease_coordinator;
mod state;
mod task;

pub use lease_coordinator::*;
pub use state::LeaseStatus;
pub use task::*;
