use std::path::Path;
use std::sync::Arc;

use keyframe_extractor::detect::{ObjectBox, ObjectClass};
use keyframe_extractor::{
    BoundingBox, Detection, KeyframeError, PersonDetector, ProcessingConfig, ScriptedBackend,
};

const VIDEO: &str = "stub://crowd?frames=40&fps=20";

fn crowd() -> ScriptedBackend {
    let mut backend = ScriptedBackend::new();
    for frame in 0..40u64 {
        let x = (frame % 8) as f32 * 4.0;
        for (k, confidence) in [0.95, 0.6, 0.85, 0.3].into_iter().enumerate() {
            let offset = k as f32 * 2.0;
            backend = backend.with_person(
                frame,
                BoundingBox::new(x + offset, 2.0, x + offset + 12.0, 30.0),
                confidence - (frame % 5) as f32 * 0.01,
            );
        }
        backend = backend.with_box(
            frame,
            ObjectBox {
                bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                confidence: 0.99,
                class: ObjectClass::Animal,
            },
        );
    }
    backend
}

fn run(detector: &PersonDetector, config: &ProcessingConfig) -> Vec<Detection> {
    detector.detect(Path::new(VIDEO), config).expect("detect")
}

#[test]
fn raising_the_threshold_never_adds_detections() {
    let detector = PersonDetector::new(Arc::new(crowd()));
    let thresholds = [0.0, 0.25, 0.5, 0.59, 0.6, 0.8, 0.9, 0.95, 1.0];
    for sample_rate in [1, 3, 7] {
        let counts: Vec<usize> = thresholds
            .iter()
            .map(|&confidence_threshold| {
                let config = ProcessingConfig {
                    sample_rate,
                    confidence_threshold,
                    ..Default::default()
                };
                run(&detector, &config).len()
            })
            .collect();
        assert!(
            counts.windows(2).all(|w| w[0] >= w[1]),
            "sample_rate {sample_rate}: {counts:?}"
        );
    }
}

#[test]
fn every_detection_sits_on_a_sampled_frame() {
    let detector = PersonDetector::new(Arc::new(crowd()));
    for sample_rate in 1..=10 {
        let config = ProcessingConfig {
            sample_rate,
            confidence_threshold: 0.0,
            ..Default::default()
        };
        let found = run(&detector, &config);
        assert!(!found.is_empty());
        assert!(found
            .iter()
            .all(|d| d.frame_index % u64::from(sample_rate) == 0));
        assert!(found.windows(2).all(|w| w[0].frame_index <= w[1].frame_index));
    }
}

#[test]
fn threshold_keeps_only_confident_people() {
    let backend = ScriptedBackend::new()
        .with_person(0, BoundingBox::new(1.0, 1.0, 20.0, 30.0), 0.95)
        .with_person(0, BoundingBox::new(21.0, 1.0, 40.0, 30.0), 0.6)
        .with_person(0, BoundingBox::new(41.0, 1.0, 60.0, 30.0), 0.85);
    let detector = PersonDetector::new(Arc::new(backend));
    let config = ProcessingConfig {
        confidence_threshold: 0.8,
        ..Default::default()
    };

    let found = detector
        .detect(Path::new("stub://fixture?frames=1"), &config)
        .expect("detect");
    let mut confidences: Vec<f32> = found.iter().map(|d| d.confidence).collect();
    confidences.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(confidences, vec![0.95, 0.85]);
    assert!(found.iter().all(|d| d.track_id.is_none()));
}

#[test]
fn timestamps_follow_frame_rate() {
    let detector = PersonDetector::new(Arc::new(crowd()));
    let config = ProcessingConfig {
        sample_rate: 5,
        confidence_threshold: 0.9,
        ..Default::default()
    };
    for det in run(&detector, &config) {
        assert_eq!(det.timestamp, det.frame_index as f64 / 20.0);
    }
}

#[test]
fn open_errors_are_classified() {
    let detector = PersonDetector::new(Arc::new(ScriptedBackend::new()));
    let config = ProcessingConfig::default();

    let missing = detector
        .detect(Path::new("/nowhere/clip.mp4"), &config)
        .unwrap_err();
    assert!(matches!(missing, KeyframeError::VideoNotFound(_)));

    let garbage = tempfile::NamedTempFile::new().expect("tempfile");
    std::fs::write(garbage.path(), b"\x00\x01not-a-container").expect("write");
    let unreadable = detector.detect(garbage.path(), &config).unwrap_err();
    assert!(matches!(unreadable, KeyframeError::VideoUnreadable { .. }));
}
