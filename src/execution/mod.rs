/// Position monitoring and exit policy

pub mod monitor;
pub mod policy;

pub use monitor::{CycleReport, PositionMonitor, PositionOutcome};
pub use policy::{evaluate, SellTrigger};
