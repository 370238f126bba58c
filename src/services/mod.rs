pub mod ai;
pub mod calendar;
pub mod gateway;
pub mod messaging;
pub mod runs;
pub mod scheduling;
pub mod workflow;
