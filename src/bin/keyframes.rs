//! keyframes - extract person keyframes from one video
//!
//! Loads the app config (`KEYFRAME_CONFIG` + `KEYFRAME_*` env), picks a
//! detector backend, runs the pipeline and prints where the keyframes and
//! `metadata.json` were written. Ctrl-C cancels the run.

use anyhow::{anyhow, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keyframe_extractor::config::parse_device;
use keyframe_extractor::{AppConfig, CancelToken, ConfigOverrides, Job, KeyframePipeline};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file to process (or a stub:// synthetic video).
    video: PathBuf,
    /// Identifier used for the output directory (default: digest of the path).
    #[arg(long)]
    video_id: Option<String>,
    /// Output root directory.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Path to the ONNX person detection model.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Inference device (auto|accelerator|gpu|cpu).
    #[arg(long)]
    device: Option<String>,
    /// Process every Nth frame.
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Maximum number of keyframes to keep.
    #[arg(long)]
    max_frames: Option<usize>,
    /// Minimum detection confidence.
    #[arg(long)]
    confidence: Option<f32>,
    /// Minimum spacing between keyframes, in seconds.
    #[arg(long)]
    time_threshold: Option<f64>,
    /// JPEG quality for saved keyframes.
    #[arg(long)]
    jpeg_quality: Option<u8>,
    /// Link detections across frames and assign track ids.
    #[arg(long)]
    track: bool,
    /// Wall-clock budget for the whole job, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sample_rate: self.sample_rate,
            max_frames: self.max_frames,
            confidence_threshold: self.confidence,
            time_threshold: self.time_threshold,
            jpeg_quality: self.jpeg_quality,
            track_persons: self.track.then_some(true),
        }
    }

    fn apply_to(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(device) = &self.device {
            config.device = parse_device(device)?;
        }
        if let Some(secs) = self.timeout_secs {
            if secs == 0 {
                return Err(anyhow!("--timeout-secs must be greater than zero"));
            }
            config.job_timeout = Some(Duration::from_secs(secs));
        }
        Ok(())
    }
}

fn default_video_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    hex::encode(&digest[..6])
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let mut config = AppConfig::load()?;
    args.apply_to(&mut config)?;
    let overrides = args.overrides();

    let pipeline = {
        let _step = ui.step("Load detector");
        KeyframePipeline::from_config(&config)?
    };
    log::info!("keyframes: using {:?}", pipeline.detector());

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("keyframes: interrupt received, cancelling");
        on_signal.cancel();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {e}"))?;

    let video_id = args
        .video_id
        .clone()
        .unwrap_or_else(|| default_video_id(&args.video));
    let mut job = Job::new(video_id, &args.video);

    let result = {
        let mut view = ui.progress();
        pipeline.run(&mut job, &overrides, &mut view, &cancel)
    };
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            log::error!("keyframes: job {} {}", job.video_id, job.state());
            return Err(err.into());
        }
    };

    println!(
        "{} keyframes from {} detections ({} frames) in {:.2}s",
        result.keyframes_extracted,
        result.total_detections,
        result.total_frames_seen,
        result.processing_time_seconds
    );
    println!("keyframes: {}", result.keyframe_dir.display());
    println!("metadata:  {}", result.metadata_path.display());
    Ok(())
}
