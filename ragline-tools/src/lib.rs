//! # ragline-tools
//!
//! Tool system for ragline agent pipelines: the [`Tool`] trait,
//! schema-validated parameters, and the [`ToolRegistry`] that generation
//! steps call into during their tool loops.

pub mod core;
pub mod error;
pub mod registry;

pub use crate::{
    core::{Tool, ToolOutput, ToolParameters, ToolSpec},
    error::{Result, ToolError},
    registry::ToolRegistry,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        core::{Tool, ToolOutput, ToolParameters, ToolSpec},
        error::{Result, ToolError},
        registry::ToolRegistry,
    };
}
