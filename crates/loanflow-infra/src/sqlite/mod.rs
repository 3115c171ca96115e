pub mod loan;
pub mod message;
pub mod pool;
pub mod workflow;

mod convert;
