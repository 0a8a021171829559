pub mod job;
pub mod scheduler;

pub use job::*;
pub use scheduler::*;
