//! Raw detector output (persons, vehicles, faces)

use serde::{Deserialize, Serialize};
use vision_frame::BoundingBox;

/// Object class reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    /// Vehicle of unknown type (cascade detector)
    Vehicle,
    Face,
    /// Any other class, keyed by its 0-based COCO index
    Other(u32),
}

/// Semantic category the engine counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Person,
    Vehicle,
}

impl ObjectClass {
    /// Class for a 0-based COCO-80 index (YOLO heads)
    pub fn from_coco_index(index: usize) -> Self {
        match index {
            0 => ObjectClass::Person,
            1 => ObjectClass::Bicycle,
            2 => ObjectClass::Car,
            3 => ObjectClass::Motorcycle,
            5 => ObjectClass::Bus,
            7 => ObjectClass::Truck,
            other => ObjectClass::Other(other as u32),
        }
    }

    /// Class for a 1-based COCO id (SSD heads, id 0 is background)
    pub fn from_coco_id(id: i64) -> Option<Self> {
        if id < 1 {
            return None;
        }
        Some(Self::from_coco_index((id - 1) as usize))
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            ObjectClass::Person => Some(Category::Person),
            ObjectClass::Bicycle
            | ObjectClass::Car
            | ObjectClass::Motorcycle
            | ObjectClass::Bus
            | ObjectClass::Truck
            | ObjectClass::Vehicle => Some(Category::Vehicle),
            ObjectClass::Face | ObjectClass::Other(_) => None,
        }
    }

    pub fn is_person(&self) -> bool {
        *self == ObjectClass::Person
    }

    pub fn is_vehicle(&self) -> bool {
        self.category() == Some(Category::Vehicle)
    }

    /// Lowercase label used for overlays and distance lookup
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Bicycle => "bicycle",
            ObjectClass::Car => "car",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Bus => "bus",
            ObjectClass::Truck => "truck",
            ObjectClass::Vehicle => "vehicle",
            ObjectClass::Face => "face",
            ObjectClass::Other(_) => "object",
        }
    }
}

/// Unfiltered detection from exactly one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Box in frame pixel coordinates
    pub bbox: BoundingBox,

    pub class: ObjectClass,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,
}

impl Candidate {
    pub fn new(bbox: BoundingBox, class: ObjectClass, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
