//! Box Tracking
//!
//! Turns one backend's raw candidates into stable per-category boxes:
//! - Suppression: geometry/class validation and per-category NMS
//! - Tracking: IoU matching against the previous frame, blending, and
//!   short carry-forward of boxes a detector missed

pub mod suppression;
pub mod tracker;

pub use suppression::{Detection, Suppressed, SuppressionStage};
pub use tracker::{TemporalTracker, TrackedBox, TrackerConfig};
