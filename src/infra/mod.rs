//! Infrastructure declaration - the Cloud SQL stack as a typed resource graph,
//! rendered to a Pulumi YAML program for the engine to plan and apply

pub mod graph;
pub mod program;
pub mod render;
pub mod stack;
pub mod value;

pub use graph::{PlanStep, apply_order};
pub use render::to_pulumi_yaml;
pub use stack::{StackConfig, declare};
