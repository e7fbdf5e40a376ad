//! Post-processing shared by model backends.

use super::backend::ObjectBox;

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(
    mut boxes: Vec<ObjectBox>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<ObjectBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<ObjectBox> = Vec::new();

    'outer: for candidate in boxes {
        for k in &kept {
            if k.class == candidate.class && k.bbox.iou(&candidate.bbox) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
        if kept.len() >= max_detections {
            break;
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::ObjectClass;
    use crate::frame::BoundingBox;

    fn person(x1: f32, confidence: f32) -> ObjectBox {
        ObjectBox {
            bbox: BoundingBox::new(x1, 0.0, x1 + 10.0, 20.0),
            confidence,
            class: ObjectClass::Person,
        }
    }

    #[test]
    fn suppresses_overlapping_boxes() {
        let kept = non_max_suppression(
            vec![person(0.0, 0.6), person(1.0, 0.9), person(50.0, 0.7)],
            0.45,
            100,
        );
        let confs: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.7]);
    }

    #[test]
    fn different_classes_do_not_suppress_each_other() {
        let mut car = person(0.0, 0.8);
        car.class = ObjectClass::Vehicle;
        let kept = non_max_suppression(vec![car, person(0.0, 0.9)], 0.45, 100);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn respects_max_detections() {
        let boxes = (0..10).map(|i| person(i as f32 * 100.0, 0.5)).collect();
        assert_eq!(non_max_suppression(boxes, 0.45, 3).len(), 3);
    }
}
