// src/gesture.rs - Majority-vote stabilization and rising-edge triggers
use crate::tracking::{HistoryWindow, HISTORY_LENGTH};
use tracing::debug;

/// Index into a classifier's ordered label list.
pub type ClassId = usize;

/// Hand poses that drive the menu. Ids follow the pose label list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseCommand {
    /// Index finger extended; feeds the fingertip trajectory.
    Pointing,
    /// OK sign; steps back one menu level.
    Confirm,
    /// Sends the selected command.
    ThumbsUp,
    ThumbsDown,
    /// Peace sign; opens the next menu level.
    Advance,
}

impl PoseCommand {
    pub fn id(self) -> ClassId {
        match self {
            Self::Pointing => 2,
            Self::Confirm => 3,
            Self::ThumbsUp => 4,
            Self::ThumbsDown => 5,
            Self::Advance => 6,
        }
    }
}

/// What a stabilized trajectory vote asks the active menu level to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    Hold,
}

impl Navigation {
    pub fn from_vote(id: ClassId) -> Self {
        match id {
            1 => Self::Next,
            2 => Self::Previous,
            _ => Self::Hold,
        }
    }
}

/// Most frequent id, oldest to newest. On a tie the id that reached the
/// winning count first wins.
pub fn majority_vote<'a, I>(ids: I) -> Option<ClassId>
where
    I: IntoIterator<Item = &'a ClassId>,
{
    let mut counts: Vec<(ClassId, usize)> = Vec::new();
    let mut best: Option<(ClassId, usize)> = None;

    for &id in ids {
        let count = match counts.iter_mut().find(|(seen, _)| *seen == id) {
            Some(entry) => {
                entry.1 += 1;
                entry.1
            }
            None => {
                counts.push((id, 1));
                1
            }
        };

        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((id, count));
        }
    }

    best.map(|(id, _)| id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableGesture {
    pub id: ClassId,
    pub changed: bool,
}

pub struct GestureStabilizer {
    history: HistoryWindow<ClassId>,
    last_reported: Option<ClassId>,
}

impl GestureStabilizer {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_LENGTH)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: HistoryWindow::new(capacity),
            last_reported: None,
        }
    }

    pub fn update(&mut self, new_id: ClassId) -> StableGesture {
        self.history.push(new_id);
        // the window is never empty after a push
        let id = majority_vote(self.history.iter()).unwrap_or(new_id);
        let changed = self.last_reported != Some(id);
        if changed {
            debug!(from = ?self.last_reported, to = id, "stable gesture changed");
            self.last_reported = Some(id);
        }
        StableGesture { id, changed }
    }
}

impl Default for GestureStabilizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fires once when a pose code becomes active.
///
/// All watched codes share one "last code", so at most one of them can fire
/// in a given frame. Call [`EdgeTrigger::commit`] once at the end of every
/// frame the trigger was consulted for.
#[derive(Debug, Default)]
pub struct EdgeTrigger {
    last_code: Option<ClassId>,
}

impl EdgeTrigger {
    pub fn new() -> Self {
        Self { last_code: None }
    }

    pub fn fires(&self, code: ClassId, watched: ClassId) -> bool {
        code == watched && self.last_code != Some(watched)
    }

    pub fn commit(&mut self, code: ClassId) {
        self.last_code = Some(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_prefers_most_frequent() {
        assert_eq!(majority_vote(&[1, 1, 1, 2, 2]), Some(1));
        assert_eq!(majority_vote(&[0, 3, 3, 0, 3]), Some(3));
        assert_eq!(majority_vote(&[]), None);
    }

    #[test]
    fn vote_tie_goes_to_first_id_reaching_max() {
        // 2 reaches a count of two before 1 does
        assert_eq!(majority_vote(&[1, 2, 2, 1]), Some(2));
        assert_eq!(majority_vote(&[1, 2, 1, 2]), Some(1));
        assert_eq!(majority_vote(&[3, 0]), Some(3));
    }

    #[test]
    fn stabilizer_switches_when_majority_moves() {
        let mut stabilizer = GestureStabilizer::with_capacity(5);
        let mut last = None;
        for id in [1, 1, 1, 2, 2] {
            last = Some(stabilizer.update(id));
        }
        assert_eq!(last.map(|s| s.id), Some(1));
        assert!(!last.map(|s| s.changed).unwrap_or(true));

        // window is now [1, 1, 2, 2, 2]
        let next = stabilizer.update(2);
        assert_eq!(next, StableGesture { id: 2, changed: true });

        let again = stabilizer.update(2);
        assert_eq!(again, StableGesture { id: 2, changed: false });
    }

    #[test]
    fn first_update_reports_change() {
        let mut stabilizer = GestureStabilizer::new();
        assert_eq!(stabilizer.update(0), StableGesture { id: 0, changed: true });
        assert_eq!(stabilizer.update(0), StableGesture { id: 0, changed: false });
    }

    #[test]
    fn stabilizer_suppresses_single_frame_jitter() {
        let mut stabilizer = GestureStabilizer::new();
        for _ in 0..8 {
            stabilizer.update(1);
        }
        let jitter = stabilizer.update(2);
        assert_eq!(jitter, StableGesture { id: 1, changed: false });
    }

    #[test]
    fn edge_trigger_fires_on_rising_edges_only() {
        let mut trigger = EdgeTrigger::new();
        let mut fired = Vec::new();
        for (frame, code) in [0, 3, 3, 3, 0, 3].into_iter().enumerate() {
            if trigger.fires(code, 3) {
                fired.push(frame);
            }
            trigger.commit(code);
        }
        assert_eq!(fired, vec![1, 5]);
    }

    #[test]
    fn edge_trigger_ignores_other_watched_codes() {
        let mut trigger = EdgeTrigger::new();
        trigger.commit(4);
        assert!(!trigger.fires(4, 4));
        assert!(!trigger.fires(4, 6));
        assert!(trigger.fires(6, 6));
    }

    #[test]
    fn pose_and_trajectory_ids() {
        assert_eq!(PoseCommand::Pointing.id(), 2);
        assert_eq!(PoseCommand::Confirm.id(), 3);
        assert_eq!(PoseCommand::Advance.id(), 6);
        assert_eq!(Navigation::from_vote(1), Navigation::Next);
        assert_eq!(Navigation::from_vote(2), Navigation::Previous);
        assert_eq!(Navigation::from_vote(3), Navigation::Hold);
    }
}
