pub mod downstream;
pub mod gateway;

pub use gateway::*;
