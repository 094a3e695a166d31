//! Size-ratio to distance calibration
//!
//! Distances come from per-category step tables calibrated against real
//! objects. Each step is checked from the largest size down.

use serde::{Deserialize, Serialize};

/// Calibration table family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceFamily {
    Face,
    Person,
    /// Bicycles and motorcycles
    SmallVehicle,
    /// Cars, buses, trucks
    LargeVehicle,
    Generic,
}

impl DistanceFamily {
    /// Map a class label ("face", "person", "car", ...) to its table
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "face" => DistanceFamily::Face,
            "person" | "human" => DistanceFamily::Person,
            "bicycle" | "motorcycle" => DistanceFamily::SmallVehicle,
            "car" | "truck" | "bus" | "vehicle" => DistanceFamily::LargeVehicle,
            _ => DistanceFamily::Generic,
        }
    }
}

/// (size percent strictly above, meters)
type Step = (f32, f32);

const FACE_STEPS: &[Step] = &[
    (15.0, 0.5),
    (10.0, 0.7),
    (7.0, 1.0),
    (4.0, 1.5),
    (2.0, 2.0),
    (1.0, 2.5),
    (0.5, 3.0),
    (0.25, 4.0),
];
const FACE_FAR: f32 = 5.0;

const PERSON_STEPS: &[Step] = &[
    (50.0, 0.5),
    (30.0, 1.0),
    (15.0, 1.5),
    (8.0, 2.0),
    (4.0, 3.0),
    (2.0, 4.0),
    (1.0, 5.0),
    (0.5, 6.0),
    (0.25, 8.0),
];
const PERSON_FAR: f32 = 10.0;

const SMALL_VEHICLE_STEPS: &[Step] = &[
    (40.0, 1.0),
    (20.0, 2.0),
    (10.0, 3.0),
    (5.0, 5.0),
    (2.0, 8.0),
    (1.0, 12.0),
];
const SMALL_VEHICLE_FAR: f32 = 15.0;

const LARGE_VEHICLE_STEPS: &[Step] = &[
    (60.0, 1.0),
    (40.0, 2.0),
    (20.0, 3.0),
    (10.0, 5.0),
    (5.0, 8.0),
    (2.0, 12.0),
    (1.0, 15.0),
];
const LARGE_VEHICLE_FAR: f32 = 20.0;

const GENERIC_STEPS: &[Step] = &[
    (40.0, 1.0),
    (20.0, 2.0),
    (10.0, 3.0),
    (5.0, 4.0),
    (2.0, 6.0),
    (1.0, 8.0),
    (0.5, 10.0),
];
const GENERIC_FAR: f32 = 15.0;

/// Stateless distance lookup
pub struct DistanceEstimator;

impl DistanceEstimator {
    /// Estimated distance in meters for a box covering `size_ratio` of the frame
    pub fn estimate(size_ratio: f32, family: DistanceFamily) -> f32 {
        let (steps, far) = match family {
            DistanceFamily::Face => (FACE_STEPS, FACE_FAR),
            DistanceFamily::Person => (PERSON_STEPS, PERSON_FAR),
            DistanceFamily::SmallVehicle => (SMALL_VEHICLE_STEPS, SMALL_VEHICLE_FAR),
            DistanceFamily::LargeVehicle => (LARGE_VEHICLE_STEPS, LARGE_VEHICLE_FAR),
            DistanceFamily::Generic => (GENERIC_STEPS, GENERIC_FAR),
        };

        let percent = size_ratio * 100.0;
        steps
            .iter()
            .find(|(above, _)| percent > *above)
            .map_or(far, |(_, meters)| *meters)
    }

    /// Same lookup keyed by class label
    pub fn estimate_for_label(size_ratio: f32, label: &str) -> f32 {
        Self::estimate(size_ratio, DistanceFamily::from_label(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FAMILIES: [DistanceFamily; 5] = [
        DistanceFamily::Face,
        DistanceFamily::Person,
        DistanceFamily::SmallVehicle,
        DistanceFamily::LargeVehicle,
        DistanceFamily::Generic,
    ];

    #[test]
    fn test_large_vehicle_near_range() {
        assert_eq!(DistanceEstimator::estimate(0.61, DistanceFamily::LargeVehicle), 1.0);
        assert_eq!(DistanceEstimator::estimate(0.50, DistanceFamily::LargeVehicle), 2.0);
        assert_eq!(DistanceEstimator::estimate(0.059, DistanceFamily::LargeVehicle), 8.0);
        assert_eq!(DistanceEstimator::estimate(0.005, DistanceFamily::LargeVehicle), 20.0);
    }

    #[test]
    fn test_person_table() {
        assert_eq!(DistanceEstimator::estimate(0.55, DistanceFamily::Person), 0.5);
        assert_eq!(DistanceEstimator::estimate(0.10, DistanceFamily::Person), 2.0);
        assert_eq!(DistanceEstimator::estimate(0.0, DistanceFamily::Person), 10.0);
    }

    #[test]
    fn test_face_and_small_vehicle_tables() {
        assert_eq!(DistanceEstimator::estimate(0.2, DistanceFamily::Face), 0.5);
        assert_eq!(DistanceEstimator::estimate(0.001, DistanceFamily::Face), 5.0);
        assert_eq!(DistanceEstimator::estimate(0.25, DistanceFamily::SmallVehicle), 2.0);
        assert_eq!(DistanceEstimator::estimate(0.0, DistanceFamily::SmallVehicle), 15.0);
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(DistanceFamily::from_label("Human"), DistanceFamily::Person);
        assert_eq!(DistanceFamily::from_label("motorcycle"), DistanceFamily::SmallVehicle);
        assert_eq!(DistanceFamily::from_label("truck"), DistanceFamily::LargeVehicle);
        assert_eq!(DistanceFamily::from_label("dog"), DistanceFamily::Generic);
        assert_eq!(DistanceEstimator::estimate_for_label(0.45, "bus"), 2.0);
    }

    #[test]
    fn test_non_finite_ratio_maps_to_far() {
        assert_eq!(DistanceEstimator::estimate(f32::NAN, DistanceFamily::Generic), 15.0);
    }

    proptest! {
        #[test]
        fn prop_monotonic_non_increasing(a in 0.0f32..1.0, b in 0.0f32..1.0, idx in 0usize..5) {
            let family = FAMILIES[idx];
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let near = DistanceEstimator::estimate(large, family);
            let far = DistanceEstimator::estimate(small, family);
            prop_assert!(near <= far);
        }

        #[test]
        fn prop_distance_positive(ratio in 0.0f32..=1.0, idx in 0usize..5) {
            prop_assert!(DistanceEstimator::estimate(ratio, FAMILIES[idx]) > 0.0);
        }
    }
}
