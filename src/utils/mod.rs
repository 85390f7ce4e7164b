//! Helpers outside the core pipeline

pub mod overlay;

pub use overlay::{draw_detections, draw_prompts, OverlayStyle};
