//! Detector backend trait

use serde::{Deserialize, Serialize};
use vision_frame::VideoFrame;

use crate::candidate::Candidate;
use crate::profile::SuppressionProfile;
use crate::DetectorError;

/// Which kind of backend produced a set of candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    Precision,
    Improved,
    CascadeVehicle,
    HogPerson,
    GenericNetwork,
    Face,
    Synthetic,
}

impl BackendKind {
    pub fn is_synthetic(&self) -> bool {
        *self == BackendKind::Synthetic
    }
}

/// One object detector producing raw candidates for a frame.
///
/// An uninitialized backend returns `Ok(vec![])` from `detect`.
pub trait CandidateDetector: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Whether the backend's model artifact was loaded
    fn is_initialized(&self) -> bool;

    /// Thresholds this backend's output is suppressed with
    fn profile(&self) -> &SuppressionProfile;

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError>;
}

pub type BoxedDetector = Box<dyn CandidateDetector>;
