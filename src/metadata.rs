//! `metadata.json`: the per-video summary read by reporting tools.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProcessingConfig;
use crate::select::Keyframe;

pub const METADATA_FILENAME: &str = "metadata.json";

/// Parameters the keyframes were extracted with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionParams {
    pub sample_rate: u32,
    pub max_frames: usize,
    pub confidence_threshold: f32,
    pub time_threshold: f64,
    pub jpeg_quality: u8,
}

impl From<&ProcessingConfig> for ExtractionParams {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            max_frames: config.max_frames,
            confidence_threshold: config.confidence_threshold,
            time_threshold: config.time_threshold,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub video_id: String,
    pub video_path: String,
    pub total_frames: u64,
    pub total_detections: usize,
    pub keyframes_extracted: usize,
    pub processing_time_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_params: Option<ExtractionParams>,
    pub keyframes: Vec<Keyframe>,
}

impl MetadataDocument {
    /// Pretty-printed JSON at `path`.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize metadata")?;
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        log::info!("Metadata: saved to {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BoundingBox, TrackId};

    fn document() -> MetadataDocument {
        let started_at = Utc::now();
        MetadataDocument {
            video_id: "v1".into(),
            video_path: "/videos/v1.mp4".into(),
            total_frames: 300,
            total_detections: 42,
            keyframes_extracted: 2,
            processing_time_seconds: 3.5,
            started_at,
            completed_at: started_at,
            extraction_params: Some((&ProcessingConfig::default()).into()),
            keyframes: vec![
                Keyframe {
                    frame_index: 10,
                    timestamp: 0.33,
                    score: 0.8,
                    bbox: BoundingBox::new(1.0, 2.0, 30.0, 40.0),
                    filename: "frame_00010_t0.33s.jpg".into(),
                    track_id: None,
                },
                Keyframe {
                    frame_index: 50,
                    timestamp: 1.67,
                    score: 0.6,
                    bbox: BoundingBox::new(5.0, 2.0, 35.0, 40.0),
                    filename: "frame_00050_t1.67s.jpg".into(),
                    track_id: Some(TrackId(3)),
                },
            ],
        }
    }

    #[test]
    fn round_trip_preserves_keyframe_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        let doc = document();
        doc.write(&path).unwrap();

        let back = MetadataDocument::read(&path).unwrap();
        assert_eq!(back.keyframes_extracted, back.keyframes.len());
        assert_eq!(back, doc);
    }

    #[test]
    fn field_names_match_the_published_schema() {
        let value = serde_json::to_value(document()).unwrap();
        for key in [
            "video_id",
            "video_path",
            "total_frames",
            "total_detections",
            "keyframes_extracted",
            "processing_time_seconds",
            "started_at",
            "completed_at",
            "keyframes",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let first = &value["keyframes"][0];
        assert_eq!(first["bbox"], serde_json::json!([1.0, 2.0, 30.0, 40.0]));
        assert!(first["track_id"].is_null());
        assert_eq!(value["keyframes"][1]["track_id"], 3);
    }
}
