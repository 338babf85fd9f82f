pub mod bayesian;
pub mod discount;
pub mod frontier;
pub mod growth;
pub mod metrics;
pub mod projection;
pub mod sampling;
pub mod simulation;
pub mod statistics;
