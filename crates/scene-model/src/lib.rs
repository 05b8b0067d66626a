//! Vellum Scene Model
//!
//! Defines the core data contracts for Vellum scenes:
//! - **Geometry:** Conversions between pixel and percent coordinates
//! - **Elements:** Images, texts, rectangles, and selection overlays
//! - **Scene:** Top-level document, canvas size, and export settings
//!
//! Element geometry is mirrored as percentages of the canvas so the same
//! layout can be re-derived at any surface size.

pub mod element;
pub mod geometry;
pub mod scene;

pub use element::*;
pub use geometry::*;
pub use scene::*;
