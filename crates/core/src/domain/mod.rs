pub mod failure;
pub mod outcome;
pub mod plan;
pub mod session;
