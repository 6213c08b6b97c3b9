// src/controller.rs - Per-frame orchestration of poses, gestures, menu and dispatch
use crate::classifier::{Classifier, LabelSet, DEFAULT_POSE_LABELS, DEFAULT_TRAJECTORY_LABELS};
use crate::data::{select_mode, DatasetLogger, LoggingMode};
use crate::devices::{Capability, CommandDispatcher, DeviceRegistry, POWER_ITEMS};
use crate::gesture::{ClassId, EdgeTrigger, GestureStabilizer, Navigation, PoseCommand, StableGesture};
use crate::menu::{LevelSnapshot, MenuHierarchy, MenuLevel, MenuTier};
use crate::tracking::{
    normalize_pose, normalize_trajectory, sentinel, BoundingRect, HandObservation, Handedness,
    HistoryWindow, LandmarkPoint,
};
use chrono::Local;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rolling frame rate over the last few frame intervals.
pub struct FrameRateMeter {
    intervals: VecDeque<Duration>,
    capacity: usize,
    last_tick: Option<Instant>,
}

impl FrameRateMeter {
    pub fn new(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            last_tick: None,
        }
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last_tick.replace(now) {
            if self.intervals.len() == self.capacity {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.saturating_duration_since(last));
        }
        self.rate()
    }

    pub fn rate(&self) -> f64 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        let avg = self.intervals.iter().map(Duration::as_secs_f64).sum::<f64>()
            / self.intervals.len() as f64;
        if avg > 0.0 {
            (1.0 / avg * 100.0).round() / 100.0
        } else {
            0.0
        }
    }
}

/// Everything the controller needs from one camera frame.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub hand: Option<HandObservation>,
    pub key: Option<char>,
    pub frame_width: f64,
    pub frame_height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MenuEvent {
    Advanced { level: MenuTier },
    Retreated { level: MenuTier },
    Navigated { level: MenuTier, selected: usize },
    Dispatched {
        device: String,
        action: Capability,
        value: String,
        issued: bool,
    },
    Declined,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandReport {
    pub handedness: Handedness,
    pub bounding_rect: Option<BoundingRect>,
    pub landmarks: Vec<LandmarkPoint>,
    pub pose_id: ClassId,
    pub pose_label: String,
}

/// Read-only render model for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub captured_at: String,
    pub frame_rate: f64,
    pub mode: LoggingMode,
    pub number: Option<u8>,
    pub hand: Option<HandReport>,
    pub gesture_id: ClassId,
    pub gesture_label: String,
    pub gesture_changed: bool,
    pub menus: Vec<LevelSnapshot>,
    pub point_history: Vec<LandmarkPoint>,
    pub events: Vec<MenuEvent>,
}

/// Owns all loop state: the menu, the device registry, both history
/// windows and the pose edge detector.
pub struct FrameController {
    menu: MenuHierarchy,
    registry: DeviceRegistry,
    dispatcher: CommandDispatcher,
    pose_classifier: Box<dyn Classifier>,
    trajectory_classifier: Box<dyn Classifier>,
    pose_labels: LabelSet,
    trajectory_labels: LabelSet,
    point_history: HistoryWindow<LandmarkPoint>,
    stabilizer: GestureStabilizer,
    edges: EdgeTrigger,
    dataset: Option<DatasetLogger>,
    mode: LoggingMode,
    frame_rate: FrameRateMeter,
}

impl FrameController {
    pub fn new(
        registry: DeviceRegistry,
        dispatcher: CommandDispatcher,
        pose_classifier: Box<dyn Classifier>,
        trajectory_classifier: Box<dyn Classifier>,
        history_length: usize,
    ) -> Self {
        let actions = registry
            .get(0)
            .map(|device| device.action_items())
            .unwrap_or_default();
        let menu = MenuHierarchy::new(
            MenuLevel::new("Devices", registry.names()),
            MenuLevel::new("Actions", actions),
            MenuLevel::new(
                Capability::Power.as_str(),
                POWER_ITEMS.iter().map(|s| s.to_string()).collect(),
            ),
        );

        Self {
            menu,
            registry,
            dispatcher,
            pose_classifier,
            trajectory_classifier,
            pose_labels: LabelSet::new(DEFAULT_POSE_LABELS),
            trajectory_labels: LabelSet::new(DEFAULT_TRAJECTORY_LABELS),
            point_history: HistoryWindow::new(history_length),
            stabilizer: GestureStabilizer::with_capacity(history_length),
            edges: EdgeTrigger::new(),
            dataset: None,
            mode: LoggingMode::Normal,
            frame_rate: FrameRateMeter::new(10),
        }
    }

    pub fn with_labels(mut self, pose_labels: LabelSet, trajectory_labels: LabelSet) -> Self {
        self.pose_labels = pose_labels;
        self.trajectory_labels = trajectory_labels;
        self
    }

    pub fn with_dataset_logger(mut self, logger: DatasetLogger) -> Self {
        self.dataset = Some(logger);
        self
    }

    #[cfg(test)]
    pub fn menu(&self) -> &MenuHierarchy {
        &self.menu
    }

    #[cfg(test)]
    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub fn process_frame(&mut self, input: FrameInput) -> FrameReport {
        let frame_rate = self.frame_rate.tick();
        let (number, mode) = select_mode(input.key, self.mode);
        if mode != self.mode {
            info!(mode = mode.as_str(), "logging mode changed");
            self.mode = mode;
        }

        let mut events = Vec::new();
        let (hand, vote) = match input.hand {
            None => {
                self.point_history.push(sentinel());
                let vote = self.stabilize(0, &mut events);
                (None, vote)
            }
            Some(hand) => {
                let pose_features = normalize_pose(&hand.landmarks);
                let pose_id = self.pose_classifier.classify(&pose_features);

                if pose_id == PoseCommand::Pointing.id() {
                    self.menu.show_root();
                    self.point_history.push(hand.fingertip().unwrap_or_else(sentinel));
                } else {
                    self.point_history.push(sentinel());
                }

                let trajectory =
                    normalize_trajectory(&self.point_history, input.frame_width, input.frame_height);
                self.log_dataset(number, &pose_features, &trajectory);

                self.handle_pose_edges(pose_id, &mut events);

                let gesture_id = if self.point_history.is_full() {
                    self.trajectory_classifier.classify(&trajectory)
                } else {
                    0
                };
                let vote = self.stabilize(gesture_id, &mut events);

                let report = HandReport {
                    handedness: hand.handedness,
                    bounding_rect: hand.bounding_rect(),
                    pose_id,
                    pose_label: self.pose_labels.label(pose_id).to_string(),
                    landmarks: hand.landmarks,
                };
                (Some(report), vote)
            }
        };

        FrameReport {
            captured_at: Local::now().to_rfc3339(),
            frame_rate,
            mode: self.mode,
            number,
            hand,
            gesture_id: vote.id,
            gesture_label: self.trajectory_labels.label(vote.id).to_string(),
            gesture_changed: vote.changed,
            menus: self.menu.snapshot(),
            point_history: self.point_history.to_vec(),
            events,
        }
    }

    fn log_dataset(&self, number: Option<u8>, pose: &[f64], trajectory: &[f64]) {
        let Some(logger) = &self.dataset else {
            return;
        };
        let vector = match self.mode {
            LoggingMode::Normal => return,
            LoggingMode::KeyPoint => pose,
            LoggingMode::PointHistory => trajectory,
        };
        if let Err(e) = logger.log_record(number, self.mode, vector) {
            warn!(error = %e, "dataset row not written");
        }
    }

    /// At most one pose action per frame; the edge detector then remembers
    /// this frame's pose.
    fn handle_pose_edges(&mut self, pose_id: ClassId, events: &mut Vec<MenuEvent>) {
        let fires = |cmd: PoseCommand| self.edges.fires(pose_id, cmd.id());

        if fires(PoseCommand::Confirm) {
            let level = self.menu.active_tier();
            self.menu.retreat();
            events.push(MenuEvent::Retreated { level });
        } else if fires(PoseCommand::ThumbsUp) {
            if self.menu.level(MenuTier::SubActions).is_visible() {
                if let Some(event) = self.dispatch_selection() {
                    events.push(event);
                }
            }
        } else if fires(PoseCommand::ThumbsDown) {
            if self.menu.level(MenuTier::Devices).is_visible() {
                info!("action negative");
                events.push(MenuEvent::Declined);
            }
        } else if fires(PoseCommand::Advance) {
            self.menu.advance();
            events.push(MenuEvent::Advanced {
                level: self.menu.active_tier(),
            });
        }

        self.edges.commit(pose_id);
    }

    fn dispatch_selection(&self) -> Option<MenuEvent> {
        let devices = self.menu.level(MenuTier::Devices);
        let sub_actions = self.menu.level(MenuTier::SubActions);

        let Some(device) = self.registry.get(devices.selected_index()) else {
            warn!(index = devices.selected_index(), "no device at selected index");
            return None;
        };
        // the sub-actions level is named after the action it offers
        let Some(action) = Capability::from_label(sub_actions.name()) else {
            warn!(name = sub_actions.name(), "sub-actions level has no action");
            return None;
        };
        let Some(value) = sub_actions.selected_item() else {
            warn!("sub-actions level is empty");
            return None;
        };

        info!(device = %device, action = action.as_str(), value, "dispatching command");
        let issued = self.dispatcher.dispatch(device, action, value);
        Some(MenuEvent::Dispatched {
            device: device.id.clone(),
            action,
            value: value.to_string(),
            issued,
        })
    }

    fn stabilize(&mut self, gesture_id: ClassId, events: &mut Vec<MenuEvent>) -> StableGesture {
        let vote = self.stabilizer.update(gesture_id);
        if vote.changed {
            self.sync_dependent_levels();

            let level = self.menu.active_tier();
            let moved = match Navigation::from_vote(vote.id) {
                Navigation::Next => {
                    self.menu.next_item();
                    true
                }
                Navigation::Previous => {
                    self.menu.prev_item();
                    true
                }
                Navigation::Hold => false,
            };
            if moved {
                let selected = self.menu.level(level).selected_index();
                debug!(?level, selected, "menu navigation");
                events.push(MenuEvent::Navigated { level, selected });
            }
        }
        vote
    }

    /// Refreshes the level below the active one from the active selection.
    pub fn sync_dependent_levels(&mut self) {
        match self.menu.active_tier() {
            MenuTier::Devices => {
                let selected = self.menu.level(MenuTier::Devices).selected_index();
                if let Some(device) = self.registry.get(selected) {
                    self.menu
                        .repopulate(MenuTier::Actions, device.action_items(), None);
                }
            }
            MenuTier::Actions => {
                let action = self
                    .menu
                    .level(MenuTier::Actions)
                    .selected_item()
                    .and_then(Capability::from_label);
                if let Some(action) = action {
                    self.menu.repopulate(
                        MenuTier::SubActions,
                        action.sub_action_items(),
                        Some(action.as_str()),
                    );
                }
            }
            MenuTier::SubActions => {}
        }
    }
}
