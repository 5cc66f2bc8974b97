//! Core domain models
//!
//! This module defines the pipeline definition, the execution state that
//! the engine records while running it, and the level grouping used for
//! display.

pub mod config;
pub mod definition;
pub mod levels;
pub mod state;

pub use definition::*;
pub use levels::{plan_levels, Level};
pub use state::*;
