//! Frame loop and periodic sensor snapshots

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use detection_fusion::{DetectionResult, FusionEngine};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::settings::RunnerConfig;
use crate::source::FrameSource;

/// Totals for one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub frames: u64,
    pub synthetic_frames: u64,
    pub max_humans: usize,
    pub max_vehicles: usize,
    pub closest_distance_m: Option<f32>,
}

impl RunStats {
    fn record(&mut self, result: &DetectionResult) {
        self.frames += 1;
        if result.synthetic {
            self.synthetic_frames += 1;
        }
        self.max_humans = self.max_humans.max(result.human_count);
        self.max_vehicles = self.max_vehicles.max(result.vehicle_count);
        let closest = self
            .closest_distance_m
            .map_or(result.closest_distance_m, |d| d.min(result.closest_distance_m));
        self.closest_distance_m = Some(closest);
    }
}

/// Process every frame of the configured source
pub async fn run(config: RunnerConfig) -> Result<RunStats> {
    let engine = FusionEngine::initialize(config.engine_config())
        .context("Failed to initialize engine")?;
    let engine = Arc::new(Mutex::new(engine));
    let mut source = FrameSource::from_config(&config.source)?;

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let snapshot = tokio::spawn(snapshot_loop(
        engine.clone(),
        Duration::from_secs_f32(config.snapshot_interval_secs),
    ));

    let mut pacing = interval(Duration::from_secs_f64(1.0 / config.source.fps as f64));
    pacing.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = RunStats::default();

    let outcome: Result<()> = async {
        while let Some(frame) = source.next_frame()? {
            pacing.tick().await;

            let shared = engine.clone();
            let result =
                tokio::task::spawn_blocking(move || shared.blocking_lock().process_frame(&frame))
                    .await
                    .context("Frame processing task failed")?;

            debug!(
                "Frame {}: humans={} vehicles={} faces={} light={} motion={} distance={:.1}m",
                result.frame_sequence,
                result.human_count,
                result.vehicle_count,
                result.face_count,
                result.light_level,
                result.motion_detected,
                result.closest_distance_m
            );

            if let Some(dir) = &config.output_dir {
                if let Err(e) = save_annotated(dir, &result) {
                    warn!("Failed to write annotated frame {}: {:#}", result.frame_sequence, e);
                }
            }
            stats.record(&result);
        }
        Ok(())
    }
    .await;

    snapshot.abort();
    outcome?;

    let summary = engine.lock().await.sensor_summary();
    info!("Final sensor summary: {}", serde_json::to_string(&summary)?);
    info!(
        "Processed {} frames ({} synthetic), max humans {}, max vehicles {}",
        stats.frames, stats.synthetic_frames, stats.max_humans, stats.max_vehicles
    );
    Ok(stats)
}

/// Log the engine's sensor summary every `period`
async fn snapshot_loop(engine: Arc<Mutex<FusionEngine>>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let summary = engine.lock().await.sensor_summary();
        match serde_json::to_string(&summary) {
            Ok(json) => info!("Sensor summary: {}", json),
            Err(e) => error!("Failed to serialize sensor summary: {}", e),
        }
    }
}

fn save_annotated(dir: &Path, result: &DetectionResult) -> Result<()> {
    let img = result
        .annotated_frame
        .to_rgb_image()
        .context("Annotated frame has an invalid buffer")?;
    img.save(dir.join(format!("frame_{:06}.png", result.frame_sequence)))?;
    Ok(())
}
