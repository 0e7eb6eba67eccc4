//! # View Module
//!
//! Everything between the store and the screen.
//!
//! This module handles:
//! - Filter and sort state driven by user toggles
//! - Projecting the store into a filtered, ordered, capped row set
//! - Rendering rows as a text table

pub mod filter;
pub mod project;
pub mod render;

pub use filter::{FilterController, FilterState};
pub use project::{project, DisplayCap};
pub use render::{Frame, Renderer, TableRenderer};
