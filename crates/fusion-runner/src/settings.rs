//! Runner configuration

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use detection_fusion::EngineConfig;
use serde::{Deserialize, Serialize};

/// Where frames come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory of still images, processed in file name order.
    /// Without one a generated scene is used.
    pub input_dir: Option<PathBuf>,

    /// Generated scene resolution
    pub width: u32,
    pub height: u32,

    /// Generated scene length (frames)
    pub frames: u32,

    /// Frame pacing
    pub fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            width: 640,
            height: 480,
            frames: 250,
            fps: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub engine: EngineConfig,
    pub source: SourceConfig,

    /// Seconds between sensor summary log lines
    pub snapshot_interval_secs: f32,

    /// Annotated frames are written here as PNG when set
    pub output_dir: Option<PathBuf>,

    /// Relative model paths in `engine.detectors` are resolved against this
    pub model_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            source: SourceConfig::default(),
            snapshot_interval_secs: 1.0,
            output_dir: None,
            model_dir: None,
        }
    }
}

impl RunnerConfig {
    /// Optional TOML file, then `FUSION__`-prefixed environment variables
    /// (`FUSION__ENGINE__FRAMERATE=30`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: RunnerConfig = builder
            .add_source(Environment::with_prefix("FUSION").separator("__").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Engine configuration with model paths resolved
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = self.engine.clone();
        if let Some(dir) = &self.model_dir {
            engine.detectors = engine.detectors.with_model_root(dir);
        }
        engine
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.source.fps > 0, "source.fps must be positive");
        ensure!(
            self.source.width > 0 && self.source.height > 0,
            "source resolution must be non-zero"
        );
        ensure!(
            self.snapshot_interval_secs > 0.0,
            "snapshot_interval_secs must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
snapshot_interval_secs = 2.5

[source]
frames = 10
fps = 50

[engine]
framerate = 30
face_body_dedup = 0.8

[engine.tracker]
match_iou = 0.4
"#
        )
        .unwrap();

        let config = RunnerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.snapshot_interval_secs, 2.5);
        assert_eq!(config.source.frames, 10);
        assert_eq!(config.source.fps, 50);
        assert_eq!(config.source.width, 640);
        assert_eq!(config.engine.framerate, 30);
        assert_eq!(config.engine.quality, 85);
        assert_eq!(config.engine.face_body_dedup, Some(0.8));
        assert_eq!(config.engine.tracker.match_iou, 0.4);
    }

    #[test]
    fn test_model_dir_resolves_relative_models() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
model_dir = "/opt/models"

[engine.detectors]
vehicle_cascade = "cars.xml"
face_model = "/srv/face.onnx"
"#
        )
        .unwrap();

        let config = RunnerConfig::load(Some(file.path())).unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.detectors.vehicle_cascade, Some(PathBuf::from("/opt/models/cars.xml")));
        assert_eq!(engine.detectors.face_model, Some(PathBuf::from("/srv/face.onnx")));
        // stored settings are left as written
        assert_eq!(config.engine.detectors.vehicle_cascade, Some(PathBuf::from("cars.xml")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(RunnerConfig::load(Some(Path::new("/nonexistent/fusion.toml"))).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(RunnerConfig::default().validate().is_ok());
        let config = RunnerConfig {
            snapshot_interval_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
