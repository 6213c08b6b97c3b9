// src/tracking.rs - Landmark types, history windows and feature normalization
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Pixel position of a single hand landmark.
pub type LandmarkPoint = Vector2<f64>;

pub const HAND_LANDMARK_COUNT: usize = 21;
pub const HISTORY_LENGTH: usize = 16;

// MediaPipe hand landmark indices
pub const WRIST: usize = 0;
pub const INDEX_FINGER_TIP: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One detected hand as reported by the hand tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub landmarks: Vec<LandmarkPoint>,
    pub handedness: Handedness,
}

impl HandObservation {
    pub fn fingertip(&self) -> Option<LandmarkPoint> {
        self.landmarks.get(INDEX_FINGER_TIP).copied()
    }

    pub fn bounding_rect(&self) -> Option<BoundingRect> {
        BoundingRect::enclosing(&self.landmarks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingRect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingRect {
    pub fn enclosing(points: &[LandmarkPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = Self {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        for p in &points[1..] {
            rect.x_min = rect.x_min.min(p.x);
            rect.y_min = rect.y_min.min(p.y);
            rect.x_max = rect.x_max.max(p.x);
            rect.y_max = rect.y_max.max(p.y);
        }
        Some(rect)
    }
}

/// The point pushed for a frame without a usable fingertip.
pub fn sentinel() -> LandmarkPoint {
    LandmarkPoint::zeros()
}

/// Fixed-capacity FIFO. Pushing onto a full window evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct HistoryWindow<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(value);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter()
    }
}

impl<T: Clone> HistoryWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// Translation and scale invariant pose features.
///
/// Every point is taken relative to the wrist (index 0), flattened to
/// `[x0, y0, x1, y1, ...]` and divided by the largest absolute component.
/// A degenerate pose where every relative component is zero yields zeros.
pub fn normalize_pose(points: &[LandmarkPoint]) -> Vec<f64> {
    let Some(base) = points.get(WRIST).copied() else {
        return Vec::new();
    };

    let relative: Vec<f64> = points
        .iter()
        .flat_map(|p| {
            let r = p - base;
            [r.x, r.y]
        })
        .collect();

    let max_value = relative.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if max_value == 0.0 {
        return vec![0.0; relative.len()];
    }

    relative.into_iter().map(|v| v / max_value).collect()
}

/// Fingertip trajectory features: every entry relative to the first one,
/// x divided by the frame width and y by the frame height, flattened.
/// No scale normalization is applied.
pub fn normalize_trajectory(
    window: &HistoryWindow<LandmarkPoint>,
    frame_width: f64,
    frame_height: f64,
) -> Vec<f64> {
    let Some(base) = window.iter().next().copied() else {
        return Vec::new();
    };
    let width = if frame_width > 0.0 { frame_width } else { 1.0 };
    let height = if frame_height > 0.0 { frame_height } else { 1.0 };

    window
        .iter()
        .flat_map(|p| {
            let r = p - base;
            [r.x / width, r.y / height]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(points: Vec<(f64, f64)>) -> Vec<LandmarkPoint> {
        points.into_iter().map(|(x, y)| LandmarkPoint::new(x, y)).collect()
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let mut window = HistoryWindow::new(HISTORY_LENGTH);
        for i in 0..HISTORY_LENGTH {
            window.push(i);
        }
        assert_eq!(window.len(), HISTORY_LENGTH);
        assert!(window.is_full());

        for i in 0..40 {
            window.push(100 + i);
            assert_eq!(window.len(), HISTORY_LENGTH);
        }
        assert_eq!(window.iter().next(), Some(&124));
        assert_eq!(window.iter().last(), Some(&139));
    }

    #[test]
    fn window_evicts_oldest_first() {
        let mut window = HistoryWindow::new(3);
        for v in [1, 2, 3, 4] {
            window.push(v);
        }
        assert_eq!(window.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn identical_points_normalize_to_zeros() {
        let points = vec![LandmarkPoint::new(120.0, 80.0); HAND_LANDMARK_COUNT];
        let features = normalize_pose(&points);
        assert_eq!(features.len(), 42);
        assert!(features.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn pose_is_relative_to_wrist_and_scaled_by_max() {
        let points = hand(vec![(10.0, 10.0), (14.0, 8.0), (6.0, 30.0)]);
        let features = normalize_pose(&points);
        assert_eq!(features, vec![0.0, 0.0, 0.2, -0.1, -0.2, 1.0]);
        assert!(features.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn pose_is_translation_invariant() {
        let a = hand(vec![(0.0, 0.0), (3.0, 4.0), (-2.0, 1.0)]);
        let b = hand(vec![(100.0, 50.0), (103.0, 54.0), (98.0, 51.0)]);
        assert_eq!(normalize_pose(&a), normalize_pose(&b));
    }

    #[test]
    fn trajectory_uses_first_entry_and_frame_size() {
        let mut window = HistoryWindow::new(4);
        window.push(LandmarkPoint::new(100.0, 100.0));
        window.push(LandmarkPoint::new(196.0, 154.0));
        window.push(sentinel());

        let features = normalize_trajectory(&window, 960.0, 540.0);
        assert_eq!(features.len(), 6);
        assert_eq!(features[0], 0.0);
        assert_eq!(features[1], 0.0);
        assert!((features[2] - 0.1).abs() < 1e-12);
        assert!((features[3] - 0.1).abs() < 1e-12);
        assert!((features[4] + 100.0 / 960.0).abs() < 1e-12);
        assert!((features[5] + 100.0 / 540.0).abs() < 1e-12);
    }

    #[test]
    fn full_window_gives_thirty_two_features() {
        let mut window = HistoryWindow::new(HISTORY_LENGTH);
        for i in 0..20 {
            window.push(LandmarkPoint::new(i as f64, i as f64 * 2.0));
        }
        assert_eq!(normalize_trajectory(&window, 960.0, 540.0).len(), 32);
    }

    #[test]
    fn bounding_rect_encloses_all_points() {
        let obs = HandObservation {
            landmarks: hand(vec![(5.0, 9.0), (1.0, 12.0), (7.0, 2.0)]),
            handedness: Handedness::Right,
        };
        let rect = obs.bounding_rect().expect("rect");
        assert_eq!(
            rect,
            BoundingRect {
                x_min: 1.0,
                y_min: 2.0,
                x_max: 7.0,
                y_max: 12.0
            }
        );
        assert!(obs.fingertip().is_none());
    }
}
