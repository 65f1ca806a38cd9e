pub mod launch;
pub mod plan;
pub mod schedule;
