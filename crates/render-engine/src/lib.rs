//! Vellum Render Engine
//!
//! Headless surfaces, the session image cache, and the export pipeline
//! that re-derives a scene at any output size.
//!
//! # Pipeline Architecture
//!
//! ```text
//! live surface ──┐
//!                ├── Snapshot & Clone (overlays dropped)
//!                │          │
//! canvas size ───┴──────────┼── Normalize (percent geometry)
//!                           │          │
//! image cache ──────────────┴──────────┼── Re-resolve images (full resolution)
//!                                      │          │
//!                                      ▼          ▼
//!                              export surface (target size)
//!                                      │
//!                                      ▼
//!                              Render + Rasterize (PNG)
//!                                      │
//!                                      ▼
//!                                  FileSaver
//! ```

pub mod cache;
pub mod compositor;
pub mod export;
pub mod save;
pub mod session;
pub mod surface;

pub use export::*;
