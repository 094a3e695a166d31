//! Fusion engine: priority chain, fallback tier, faces, tracking, distance

use std::time::Instant;

use box_tracking::{Detection, Suppressed, SuppressionStage, TemporalTracker, TrackedBox};
use detectors::{
    BackendKind, BoxedDetector, CandidateDetector, CascadeVehicleDetector, Category, FaceDetector,
    GenericNetworkDetector, HogPersonDetector, ImprovedDetector, PrecisionDetector,
    SyntheticDetector,
};
use scene_analysis::{DistanceEstimator, FrameAnalyzer};
use tracing::{debug, info, warn};
use vision_frame::VideoFrame;

use crate::config::EngineConfig;
use crate::overlay::{Annotation, Overlay, PanelSummary, FACE_COLOR, PERSON_COLOR, VEHICLE_COLOR};
use crate::result::{DetectionResult, SensorSummary};
use crate::InitError;

/// Run one backend and suppress its output; failures count as no output
fn run_backend(backend: &mut dyn CandidateDetector, frame: &VideoFrame) -> Suppressed {
    match backend.detect(frame) {
        Ok(candidates) => {
            let found = candidates.len();
            let suppressed =
                SuppressionStage::apply(backend.profile(), candidates, frame.width, frame.height);
            debug!(
                "{}: {} candidates -> {} persons, {} vehicles, {} faces",
                backend.name(),
                found,
                suppressed.persons.len(),
                suppressed.vehicles.len(),
                suppressed.faces.len()
            );
            suppressed
        }
        Err(e) => {
            warn!("Backend {} failed: {}", backend.name(), e);
            Suppressed::default()
        }
    }
}

fn initialized(backend: &Option<BoxedDetector>) -> bool {
    backend.as_ref().is_some_and(|b| b.is_initialized())
}

/// Body boxes chosen for one frame
struct BodySelection {
    suppressed: Suppressed,
    source: Option<BackendKind>,
    synthetic: bool,
}

/// Builds a [`FusionEngine`], loading any backend not supplied explicitly
pub struct EngineBuilder {
    config: EngineConfig,
    chain: Option<Vec<BoxedDetector>>,
    fallback_network: Option<BoxedDetector>,
    fallback_person: Option<BoxedDetector>,
    face: Option<BoxedDetector>,
    synthetic: Option<BoxedDetector>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            chain: None,
            fallback_network: None,
            fallback_person: None,
            face: None,
            synthetic: None,
        }
    }

    /// Replace the configured priority chain
    pub fn chain(mut self, chain: Vec<BoxedDetector>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn fallback_network(mut self, backend: BoxedDetector) -> Self {
        self.fallback_network = Some(backend);
        self
    }

    pub fn fallback_person(mut self, backend: BoxedDetector) -> Self {
        self.fallback_person = Some(backend);
        self
    }

    pub fn face(mut self, backend: BoxedDetector) -> Self {
        self.face = Some(backend);
        self
    }

    pub fn synthetic(mut self, backend: BoxedDetector) -> Self {
        self.synthetic = Some(backend);
        self
    }

    /// Validate the configuration and load missing backends.
    ///
    /// Missing or broken model artifacts leave backends uninitialized; only
    /// invalid configuration is an error.
    pub fn build(self) -> Result<FusionEngine, InitError> {
        self.config.validate()?;
        let config = self.config;
        let dc = &config.detectors;

        let chain = match self.chain {
            Some(chain) => chain,
            None => config
                .chain
                .iter()
                .filter_map(|kind| -> Option<BoxedDetector> {
                    match kind {
                        BackendKind::Precision => Some(Box::new(PrecisionDetector::new(dc))),
                        BackendKind::Improved => Some(Box::new(ImprovedDetector::new(dc))),
                        BackendKind::CascadeVehicle => {
                            Some(Box::new(CascadeVehicleDetector::new(dc)))
                        }
                        _ => None,
                    }
                })
                .collect(),
        };
        let fallback_network = self
            .fallback_network
            .unwrap_or_else(|| Box::new(GenericNetworkDetector::new(dc)));
        let fallback_person = self
            .fallback_person
            .unwrap_or_else(|| Box::new(HogPersonDetector::new(dc)));
        let face = self.face.unwrap_or_else(|| Box::new(FaceDetector::new(dc)));
        let synthetic = match self.synthetic {
            Some(backend) => Some(backend),
            None if dc.enable_synthetic => {
                Some(Box::new(SyntheticDetector::new(dc.synthetic_seed)) as BoxedDetector)
            }
            None => None,
        };

        let all = chain
            .iter()
            .chain([&fallback_network, &fallback_person, &face])
            .chain(synthetic.iter());
        for backend in all {
            backend
                .profile()
                .validate()
                .map_err(|e| InitError::Config(format!("{} profile: {}", backend.name(), e)))?;
        }

        let engine = FusionEngine {
            analyzer: FrameAnalyzer::new(config.analyzer.clone()),
            tracker: TemporalTracker::new(config.tracker.clone()),
            overlay: Overlay::new(config.overlay.clone()),
            chain,
            fallback_network: Some(fallback_network),
            fallback_person: Some(fallback_person),
            face: Some(face),
            synthetic,
            prev_frame: None,
            latest: None,
            config,
        };
        engine.log_backends();
        Ok(engine)
    }
}

/// Per-stream perception engine.
///
/// Not safe to share between threads without a lock; use one instance per
/// stream or wrap it in a mutex.
pub struct FusionEngine {
    config: EngineConfig,
    analyzer: FrameAnalyzer,
    tracker: TemporalTracker,
    overlay: Overlay,
    chain: Vec<BoxedDetector>,
    fallback_network: Option<BoxedDetector>,
    fallback_person: Option<BoxedDetector>,
    face: Option<BoxedDetector>,
    synthetic: Option<BoxedDetector>,
    prev_frame: Option<VideoFrame>,
    latest: Option<DetectionResult>,
}

impl FusionEngine {
    /// Engine with every backend loaded from `config`
    pub fn initialize(config: EngineConfig) -> Result<Self, InitError> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    fn log_backends(&self) {
        for backend in &self.chain {
            info!("Chain backend {}: initialized={}", backend.name(), backend.is_initialized());
        }
        for backend in [&self.fallback_network, &self.fallback_person, &self.face, &self.synthetic]
            .into_iter()
            .flatten()
        {
            info!("Backend {}: initialized={}", backend.name(), backend.is_initialized());
        }
        if !self.has_real_backend() {
            warn!("No detection model available; results will be synthetic if enabled");
        }
    }

    /// Any chain, generic network or HOG backend loaded
    pub fn has_real_backend(&self) -> bool {
        self.chain.iter().any(|b| b.is_initialized())
            || initialized(&self.fallback_network)
            || initialized(&self.fallback_person)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process a frame at the current time
    pub fn process_frame(&mut self, frame: &VideoFrame) -> DetectionResult {
        self.process_frame_at(frame, Instant::now())
    }

    /// Process a frame captured at `now`
    pub fn process_frame_at(&mut self, frame: &VideoFrame, now: Instant) -> DetectionResult {
        let sentinel = self.config.distance_sentinel_m;

        if let Err(e) = frame.validate() {
            warn!("Skipping invalid frame {}: {}", frame.sequence, e);
            let result = DetectionResult::neutral(frame, self.analyzer.light_level(), sentinel);
            self.latest = Some(result.clone());
            return result;
        }

        let light_level = self.analyzer.analyze_brightness(frame);
        let motion_detected = match &self.prev_frame {
            Some(prev) => self.analyzer.detect_motion_at(prev, frame, now),
            None => false,
        };

        let bodies = self.select_bodies(frame);

        let faces: Vec<Detection> = match self.face.as_mut() {
            Some(face) if face.is_initialized() => run_backend(face.as_mut(), frame).faces,
            _ => Vec::new(),
        };

        let to_tracked = |list: &[Detection], category: Category| -> Vec<TrackedBox> {
            list.iter().map(|d| TrackedBox::from_detection(d, category)).collect()
        };
        let persons = self.tracker.update(
            Category::Person,
            to_tracked(&bodies.suppressed.persons, Category::Person),
            now,
        );
        let vehicles = self.tracker.update(
            Category::Vehicle,
            to_tracked(&bodies.suppressed.vehicles, Category::Vehicle),
            now,
        );

        let counted_faces = match self.config.face_body_dedup {
            Some(threshold) => faces
                .iter()
                .filter(|f| !persons.iter().any(|p| f.bbox.containment_in(&p.bbox) >= threshold))
                .count(),
            None => faces.len(),
        };
        let human_count = persons.len() + counted_faces;
        let vehicle_count = vehicles.len();

        let (fw, fh) = (frame.width, frame.height);
        let closest_distance_m = persons
            .iter()
            .chain(&vehicles)
            .map(|t| (t.bbox, t.class.label()))
            .chain(faces.iter().map(|f| (f.bbox, f.class.label())))
            .map(|(bbox, label)| {
                DistanceEstimator::estimate_for_label(bbox.area_ratio(fw, fh), label)
            })
            .fold(sentinel, f32::min);

        let mut annotations: Vec<Annotation<'_>> =
            Vec::with_capacity(persons.len() + vehicles.len() + faces.len());
        annotations.extend(persons.iter().map(|t| Annotation {
            bbox: t.bbox,
            color: PERSON_COLOR,
            label: "Person",
        }));
        annotations.extend(vehicles.iter().map(|t| Annotation {
            bbox: t.bbox,
            color: VEHICLE_COLOR,
            label: t.class.label(),
        }));
        annotations.extend(faces.iter().map(|f| Annotation {
            bbox: f.bbox,
            color: FACE_COLOR,
            label: "Face",
        }));
        let panel = PanelSummary {
            humans: human_count,
            vehicles: vehicle_count,
            faces: faces.len(),
            light_level,
            motion: motion_detected,
            distance_m: closest_distance_m,
            simulated: bodies.synthetic,
        };
        let annotated_frame = self.overlay.annotate(frame, &annotations, &panel.lines());

        let result = DetectionResult {
            human_count,
            vehicle_count,
            face_count: faces.len(),
            light_level,
            motion_detected,
            closest_distance_m,
            annotated_frame,
            persons,
            vehicles,
            faces,
            source: bodies.source,
            synthetic: bodies.synthetic,
            frame_sequence: frame.sequence,
        };

        self.prev_frame = Some(frame.clone());
        self.latest = Some(result.clone());
        result
    }

    /// Walk the chain, then the fallback tier, then the synthetic generator
    fn select_bodies(&mut self, frame: &VideoFrame) -> BodySelection {
        for backend in self.chain.iter_mut() {
            if !backend.is_initialized() {
                continue;
            }
            let suppressed = run_backend(backend.as_mut(), frame);
            if suppressed.has_bodies() {
                return BodySelection {
                    suppressed,
                    source: Some(backend.kind()),
                    synthetic: false,
                };
            }
        }

        let mut selection = BodySelection {
            suppressed: Suppressed::default(),
            source: None,
            synthetic: false,
        };

        if let Some(network) = self.fallback_network.as_mut().filter(|b| b.is_initialized()) {
            let out = run_backend(network.as_mut(), frame);
            if out.has_bodies() {
                selection.source = Some(network.kind());
            }
            selection.suppressed.persons = out.persons;
            selection.suppressed.vehicles = out.vehicles;
        }

        if selection.suppressed.persons.is_empty() {
            if let Some(hog) = self.fallback_person.as_mut().filter(|b| b.is_initialized()) {
                let out = run_backend(hog.as_mut(), frame);
                if !out.persons.is_empty() {
                    selection.source = selection.source.or(Some(hog.kind()));
                    selection.suppressed.persons = out.persons;
                }
            }
        }

        if !self.has_real_backend() {
            if let Some(synthetic) = self.synthetic.as_mut().filter(|b| b.is_initialized()) {
                let out = run_backend(synthetic.as_mut(), frame);
                debug!("Synthetic generator produced {} persons", out.persons.len());
                selection = BodySelection {
                    source: Some(synthetic.kind()),
                    synthetic: synthetic.kind().is_synthetic(),
                    suppressed: out,
                };
                selection.suppressed.faces.clear();
            }
        }

        selection
    }

    /// Last result, if any frame was processed
    pub fn latest(&self) -> Option<&DetectionResult> {
        self.latest.as_ref()
    }

    /// Flat snapshot of the latest result
    pub fn sensor_summary(&self) -> SensorSummary {
        match &self.latest {
            Some(result) => SensorSummary {
                light_level: result.light_level,
                motion_detected: result.motion_detected,
                distance: result.closest_distance_m,
                resolution: result.resolution(),
                framerate: self.config.framerate,
                quality: self.config.quality,
                humans_count: result.human_count,
                vehicles_count: result.vehicle_count,
            },
            None => SensorSummary {
                light_level: self.analyzer.light_level(),
                motion_detected: false,
                distance: self.config.distance_sentinel_m,
                resolution: "0x0".to_string(),
                framerate: self.config.framerate,
                quality: self.config.quality,
                humans_count: 0,
                vehicles_count: 0,
            },
        }
    }

    /// Clear analyzer, tracker and frame history
    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.tracker.reset();
        self.prev_frame = None;
        self.latest = None;
    }
}
