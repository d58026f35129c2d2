// src/sweep/mod.rs - Pan plan and the loop that walks it
pub mod plan;
pub mod runner;

pub use plan::{PanPlan, PlanError, PlanWalker};
pub use runner::{SweepReport, SweepRunner, SweepSettings};
