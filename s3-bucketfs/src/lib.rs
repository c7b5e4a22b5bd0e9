pub mod commands;
pub mod metrics;
