//! Detection engine.
//!
//! `DetectionEngine` owns the mode state machine. It:
//! - Applies consumer commands between frames
//! - Builds mode-owned resources on mode entry and drops them on exit
//! - Dispatches each frame to the active mode and annotates it in place
//! - Demotes to `Idle` when a tracker loses its target
//!
//! Recoverable problems (tracker loss, model load failure, ...) are queued as
//! `Notice`s for the consumer and never abort processing.

mod command;
mod params;
mod session;

pub use command::{Command, Control};
pub use params::{normalize_name, ContrastParams, ModeParameters, MotionParams, ParamOutcome};

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::detect::{Detection, ModelLoader, NeuralDetector, NeuralSettings};
use crate::frame::{BoundingBox, Frame};
use crate::segment::{foreground_pixels, has_motion, MotionSegmentor, SegmentorSettings};
use crate::track::{TrackUpdate, Tracker, TrackerFactory};
use crate::trajectory::TrajectoryBuffer;
use crate::vision::draw::{class_color, draw_box, draw_detection, draw_track};
use crate::vision::{
    external_contours, grayscale, in_range, median_blur, rgb_to_hsv, sort_by_area_desc,
    threshold_range, LabelFont, BOX_COLOR,
};
use session::{ContrastSession, ManualSession, ModeSession, MotionSession, NeuralSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    Idle,
    Draw,
    Manual,
    Motion,
    Contrast,
    Neural,
}

impl DetectionMode {
    pub const ALL: [DetectionMode; 6] = [
        DetectionMode::Idle,
        DetectionMode::Draw,
        DetectionMode::Manual,
        DetectionMode::Motion,
        DetectionMode::Contrast,
        DetectionMode::Neural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Idle => "idle",
            DetectionMode::Draw => "draw",
            DetectionMode::Manual => "manual",
            DetectionMode::Motion => "motion",
            DetectionMode::Contrast => "contrast",
            DetectionMode::Neural => "neural",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "default" {
            return Ok(DetectionMode::Idle);
        }
        DetectionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| format!("unknown detection mode '{}'", s))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeState {
    #[default]
    Default,
    Init,
    Stream,
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModeState::Default => "default",
            ModeState::Init => "init",
            ModeState::Stream => "stream",
        })
    }
}

/// Something the consumer should hear about outside the per-frame event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    ModeChanged { mode: DetectionMode },
    TrackerLost { mode: DetectionMode },
    TrackerInitFailed { reason: String },
    ModelLoaded { model: PathBuf, classes: usize },
    ModelLoadFailed { reason: String },
    InferenceFailed { reason: String },
    MotionStarted,
    MotionEnded,
}

/// Defaults and tuning for the mode algorithms.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Parameters loaded into Motion mode on every entry.
    pub motion: MotionParams,
    /// Parameters loaded into Contrast mode on every entry.
    pub contrast: ContrastParams,
    pub segmentor: SegmentorSettings,
    /// Median blur radius applied to the HSV image before thresholding.
    pub blur_radius: u32,
    pub neural: NeuralSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            motion: MotionParams::default(),
            contrast: ContrastParams::default(),
            segmentor: SegmentorSettings::default(),
            blur_radius: 3,
            neural: NeuralSettings::default(),
        }
    }
}

/// What the engine did with one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub mode: DetectionMode,
    pub state: ModeState,
    pub parameters: ModeParameters,
    /// Current tracker box, when a tracking mode is streaming.
    pub tracked: Option<BoundingBox>,
    pub detections: Vec<Detection>,
}

enum Step {
    Continue,
    TrackerLost,
}

pub struct DetectionEngine {
    settings: EngineSettings,
    trackers: Box<dyn TrackerFactory>,
    loader: Box<dyn ModelLoader>,
    detector: NeuralDetector,
    font: LabelFont,
    mode: DetectionMode,
    state: ModeState,
    session: ModeSession,
    bbox: Option<BoundingBox>,
    tracked: Option<BoundingBox>,
    detections: Vec<Detection>,
    trajectory: TrajectoryBuffer,
    model_path: Option<PathBuf>,
    classes_path: Option<PathBuf>,
    notices: Vec<Notice>,
}

impl DetectionEngine {
    pub fn new(
        settings: EngineSettings,
        trackers: Box<dyn TrackerFactory>,
        loader: Box<dyn ModelLoader>,
    ) -> Self {
        Self {
            detector: NeuralDetector::new(settings.neural),
            settings,
            trackers,
            loader,
            font: LabelFont::none(),
            mode: DetectionMode::Idle,
            state: ModeState::Default,
            session: ModeSession::Idle,
            bbox: None,
            tracked: None,
            detections: Vec::new(),
            trajectory: TrajectoryBuffer::new(),
            model_path: None,
            classes_path: None,
            notices: Vec::new(),
        }
    }

    /// Font used for detection labels.
    pub fn with_font(mut self, font: LabelFont) -> Self {
        self.font = font;
        self
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn trajectory(&self) -> &TrajectoryBuffer {
        &self.trajectory
    }

    pub fn parameters(&self) -> ModeParameters {
        match &self.session {
            ModeSession::Motion(motion) => ModeParameters::Motion(motion.params),
            ModeSession::Contrast(contrast) => ModeParameters::Contrast(contrast.params),
            _ => ModeParameters::None,
        }
    }

    /// Whether a neural model is currently held.
    pub fn model_loaded(&self) -> bool {
        matches!(&self.session, ModeSession::Neural(n) if n.model.is_some())
    }

    /// Notices queued since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub fn apply(&mut self, command: Command) -> Control {
        match command {
            Command::SetMode(mode) => self.set_mode(mode),
            Command::SetBoundingBox(bbox) => self.set_bounding_box(bbox),
            Command::SetModeParameter { name, value } => {
                self.set_parameter(&name, value);
            }
            Command::SetNeuralModelPaths { model, classes } => {
                self.set_model_paths(model, classes)
            }
            Command::Batch(commands) => {
                for command in commands {
                    if self.apply(command) == Control::Stop {
                        return Control::Stop;
                    }
                }
            }
            Command::Stop => return Control::Stop,
        }
        Control::Continue
    }

    /// Leave the current mode and enter `mode` in `Default` state.
    ///
    /// Selecting the active mode again restarts it.
    pub fn set_mode(&mut self, mode: DetectionMode) {
        self.on_exit();
        self.mode = mode;
        self.state = ModeState::Default;
        self.on_enter();
        self.notices.push(Notice::ModeChanged { mode });
    }

    pub fn set_bounding_box(&mut self, bbox: Option<BoundingBox>) {
        self.bbox = bbox;
        if self.mode == DetectionMode::Manual {
            match (bbox, self.state) {
                (Some(_), _) => self.state = ModeState::Init,
                (None, ModeState::Stream) => {
                    self.state = ModeState::Init;
                    self.tracked = None;
                }
                (None, _) => {}
            }
        }
    }

    /// Set a parameter of the active mode by (normalized) name.
    pub fn set_parameter(&mut self, name: &str, value: i64) -> ParamOutcome {
        let key = normalize_name(name);
        let outcome = match &mut self.session {
            ModeSession::Motion(motion) => {
                let outcome = motion.params.set(&key, value);
                if outcome == ParamOutcome::Applied && self.state == ModeState::Stream {
                    // Re-run target selection with the new parameters.
                    self.state = ModeState::Init;
                    self.tracked = None;
                }
                outcome
            }
            ModeSession::Contrast(contrast) => contrast.params.set(&key, value),
            _ => ParamOutcome::Ignored,
        };
        match outcome {
            ParamOutcome::Applied => log::debug!("engine: {} {} = {}", self.mode, key, value),
            ParamOutcome::Ignored => log::warn!(
                "engine: ignoring parameter '{}' = {} in {} mode",
                name,
                value,
                self.mode
            ),
        }
        outcome
    }

    pub fn set_model_paths(&mut self, model: Option<PathBuf>, classes: Option<PathBuf>) {
        self.model_path = model;
        self.classes_path = classes;
        if let ModeSession::Neural(neural) = &mut self.session {
            if neural.model.take().is_some() {
                log::info!("engine: neural model released");
            }
            neural.load_attempted = false;
            if self.state == ModeState::Stream {
                self.state = ModeState::Init;
            }
        }
    }

    /// Release every mode-owned resource.
    pub fn shutdown(&mut self) {
        self.on_exit();
        self.mode = DetectionMode::Idle;
        self.state = ModeState::Default;
    }

    fn on_enter(&mut self) {
        self.session = match self.mode {
            DetectionMode::Idle => ModeSession::Idle,
            DetectionMode::Draw => {
                self.trajectory.clear();
                ModeSession::Draw
            }
            DetectionMode::Manual => ModeSession::Manual(ManualSession {
                tracker: self.trackers.create(),
            }),
            DetectionMode::Motion => ModeSession::Motion(MotionSession {
                params: self.settings.motion,
                segmentor: MotionSegmentor::new(self.settings.segmentor),
                tracker: self.trackers.create(),
                motion_active: false,
            }),
            DetectionMode::Contrast => ModeSession::Contrast(ContrastSession {
                params: self.settings.contrast,
            }),
            DetectionMode::Neural => ModeSession::Neural(NeuralSession::default()),
        };
        log::info!("engine: entered {} mode", self.mode);
    }

    fn on_exit(&mut self) {
        let session = std::mem::replace(&mut self.session, ModeSession::Idle);
        if !matches!(session, ModeSession::Idle) {
            log::debug!("engine: releasing {} resources", session.label());
        }
        drop(session);
        self.tracked = None;
        self.detections.clear();
    }

    // ------------------------------------------------------------------------
    // Frame dispatch
    // ------------------------------------------------------------------------

    /// Run the active mode on `frame`, annotating it in place.
    pub fn process(&mut self, frame: &mut Frame) -> FrameReport {
        self.detections.clear();
        let mut session = std::mem::replace(&mut self.session, ModeSession::Idle);
        let step = match &mut session {
            ModeSession::Idle => Step::Continue,
            ModeSession::Draw => self.draw(frame),
            ModeSession::Manual(manual) => self.manual(manual, frame),
            ModeSession::Motion(motion) => self.motion(motion, frame),
            ModeSession::Contrast(contrast) => self.contrast(contrast, frame),
            ModeSession::Neural(neural) => self.neural(neural, frame),
        };
        self.session = session;

        if let Step::TrackerLost = step {
            let lost_in = self.mode;
            log::warn!("engine: tracker lost target in {} mode, returning to idle", lost_in);
            self.set_mode(DetectionMode::Idle);
            // A new session needs a fresh selection.
            self.bbox = None;
            self.notices.push(Notice::TrackerLost { mode: lost_in });
        }

        FrameReport {
            mode: self.mode,
            state: self.state,
            parameters: self.parameters(),
            tracked: self.tracked,
            detections: self.detections.clone(),
        }
    }

    fn draw(&mut self, frame: &mut Frame) -> Step {
        if let Some(bbox) = self.bbox {
            draw_box(&mut frame.image, &bbox, BOX_COLOR);
        }
        Step::Continue
    }

    fn manual(&mut self, manual: &mut ManualSession, frame: &mut Frame) -> Step {
        if self.state == ModeState::Default {
            self.state = ModeState::Init;
        }
        match self.state {
            ModeState::Init => {
                if let Some(bbox) = self.bbox {
                    if !self.seed_tracker(&mut *manual.tracker, frame, bbox) {
                        // A rejected selection is not retried.
                        self.bbox = None;
                    }
                }
                Step::Continue
            }
            ModeState::Stream => self.follow(&mut *manual.tracker, frame),
            ModeState::Default => Step::Continue,
        }
    }

    fn motion(&mut self, motion: &mut MotionSession, frame: &mut Frame) -> Step {
        let mask = hsv_mask(&frame.image, &motion.params, self.settings.blur_radius);
        let foreground = motion.segmentor.apply(&mask);
        self.update_motion_activity(motion, &foreground);

        match self.state {
            ModeState::Default => {
                self.state = ModeState::Init;
                Step::Continue
            }
            ModeState::Init => {
                let mut contours = external_contours(&mask);
                sort_by_area_desc(&mut contours);
                let target = contours.into_iter().find(|c| {
                    let b = &c.bbox;
                    motion.params.accepts(b.width(), b.height())
                        && foreground_pixels(
                            &foreground,
                            b.x() as u32,
                            b.y() as u32,
                            b.bottom_right.x as u32,
                            b.bottom_right.y as u32,
                        ) > 0
                });
                if let Some(target) = target {
                    self.seed_tracker(&mut *motion.tracker, frame, target.bbox);
                }
                Step::Continue
            }
            ModeState::Stream => self.follow(&mut *motion.tracker, frame),
        }
    }

    fn update_motion_activity(&mut self, motion: &mut MotionSession, foreground: &GrayImage) {
        let active = has_motion(foreground);
        if active != motion.motion_active {
            motion.motion_active = active;
            if active {
                log::info!("engine: motion detected");
                self.notices.push(Notice::MotionStarted);
            } else {
                log::info!("engine: motion ended");
                self.notices.push(Notice::MotionEnded);
            }
        }
    }

    fn contrast(&mut self, contrast: &mut ContrastSession, frame: &mut Frame) -> Step {
        let gray = grayscale(&frame.image);
        let mask = threshold_range(
            &gray,
            contrast.params.brightness_min,
            contrast.params.brightness_max,
        );
        for contour in external_contours(&mask) {
            draw_box(&mut frame.image, &contour.bbox, BOX_COLOR);
        }
        Step::Continue
    }

    fn neural(&mut self, neural: &mut NeuralSession, frame: &mut Frame) -> Step {
        if self.state == ModeState::Default {
            self.state = ModeState::Init;
        }

        if self.state == ModeState::Init && !neural.load_attempted {
            if let (Some(model), Some(classes)) = (self.model_path.clone(), self.classes_path.clone())
            {
                neural.load_attempted = true;
                match self.loader.load(&model, &classes) {
                    Ok(handle) => {
                        self.notices.push(Notice::ModelLoaded {
                            model: model.clone(),
                            classes: handle.labels().len(),
                        });
                        log::info!(
                            "engine: neural model {} ready ({} backend)",
                            model.display(),
                            handle.backend()
                        );
                        neural.model = Some(handle);
                        self.state = ModeState::Stream;
                    }
                    Err(err) => {
                        log::warn!("engine: neural model load failed: {}", err);
                        self.notices.push(Notice::ModelLoadFailed {
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        if self.state != ModeState::Stream {
            return Step::Continue;
        }
        let Some(model) = neural.model.as_mut() else {
            return Step::Continue;
        };
        match self.detector.detect(frame, model) {
            Ok(detections) => {
                for d in &detections {
                    let label = format!("{} {:.2}", d.label, d.confidence);
                    draw_detection(
                        &mut frame.image,
                        &d.bbox,
                        &label,
                        class_color(d.class_id),
                        &self.font,
                    );
                }
                self.detections = detections;
            }
            Err(err) => {
                log::warn!("engine: inference failed: {:#}", err);
                self.notices.push(Notice::InferenceFailed {
                    reason: format!("{:#}", err),
                });
            }
        }
        Step::Continue
    }

    // ------------------------------------------------------------------------
    // Tracking helpers
    // ------------------------------------------------------------------------

    /// Start a tracking session on `bbox`. Returns false when the tracker refuses it.
    fn seed_tracker(&mut self, tracker: &mut dyn Tracker, frame: &mut Frame, bbox: BoundingBox) -> bool {
        match tracker.init(frame, bbox) {
            Ok(()) => {
                self.trajectory.clear();
                self.tracked = Some(bbox);
                self.state = ModeState::Stream;
                draw_box(&mut frame.image, &bbox, BOX_COLOR);
                log::info!("engine: tracking {:?} in {} mode", bbox, self.mode);
                true
            }
            Err(err) => {
                log::warn!("engine: tracker init failed: {}", err);
                self.notices.push(Notice::TrackerInitFailed {
                    reason: err.to_string(),
                });
                false
            }
        }
    }

    fn follow(&mut self, tracker: &mut dyn Tracker, frame: &mut Frame) -> Step {
        match tracker.update(frame) {
            TrackUpdate::Tracked(bbox) => {
                self.trajectory.push(bbox.center());
                draw_track(&mut frame.image, &bbox, &self.trajectory);
                self.tracked = Some(bbox);
                Step::Continue
            }
            TrackUpdate::Lost => {
                self.tracked = None;
                Step::TrackerLost
            }
        }
    }
}

fn hsv_mask(image: &RgbImage, params: &MotionParams, blur_radius: u32) -> GrayImage {
    let hsv = rgb_to_hsv(image);
    let blurred = median_blur(&hsv, blur_radius);
    in_range(&blurred, &params.bounds())
}
