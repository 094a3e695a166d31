//! Detector backends

mod cascade;
mod cascade_xml;
mod face;
mod generic;
mod grouping;
mod hog;
mod improved;
mod precision;
mod synthetic;

pub use cascade::{
    Branch, CascadeModel, CascadeVehicleDetector, HaarFeature, HaarRect, HaarStage, TreeNode,
    WeakTree,
};
pub use face::FaceDetector;
pub use generic::GenericNetworkDetector;
pub use grouping::group_rectangles;
pub use hog::{HogDescriptor, HogPersonDetector, HogSvm};
pub use improved::ImprovedDetector;
pub use precision::PrecisionDetector;
pub use synthetic::SyntheticDetector;

use std::path::Path;

use tracing::warn;

use crate::onnx::{InputScaling, OnnxNetwork};

/// Load an optional square-input network; failures leave it unloaded
pub(crate) fn load_network(
    name: &str,
    path: Option<&Path>,
    input_size: u32,
    scaling: InputScaling,
) -> Option<OnnxNetwork> {
    let Some(path) = path else {
        warn!("No {} model path configured. Backend stays unavailable.", name);
        return None;
    };
    match OnnxNetwork::load(path, input_size, input_size, scaling) {
        Ok(network) => Some(network),
        Err(e) => {
            warn!("Failed to load {} model: {}", name, e);
            None
        }
    }
}

/// SSD-style networks expect `pixel - 127.5`
pub(crate) const SSD_SCALING: InputScaling = InputScaling::MeanSubtract([127.5, 127.5, 127.5]);
