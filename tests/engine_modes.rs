use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};

use trackcam::detect::{DetectionNetwork, Prediction, UnavailableModelLoader};
use trackcam::engine::{Command, ParamOutcome};
use trackcam::track::TemplateTrackerFactory;
use trackcam::vision::PALETTE;
use trackcam::{
    BoundingBox, DetectionEngine, DetectionMode, EngineSettings, Frame, ModeParameters,
    ModeState, ModelHandle, ModelLoadError, ModelLoader, Notice, TrackError, TrackUpdate, Tracker,
    TrackerFactory,
};

/// Tracks successfully for `healthy_updates` calls, then reports loss.
struct FlakyTracker {
    healthy_updates: usize,
    inits: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
    bbox: Option<BoundingBox>,
}

impl Tracker for FlakyTracker {
    fn init(&mut self, _frame: &Frame, bbox: BoundingBox) -> Result<(), TrackError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.bbox = Some(bbox);
        Ok(())
    }

    fn update(&mut self, _frame: &Frame) -> TrackUpdate {
        let seen = self.updates.fetch_add(1, Ordering::SeqCst);
        match self.bbox {
            Some(bbox) if seen < self.healthy_updates => TrackUpdate::Tracked(bbox),
            _ => {
                self.bbox = None;
                TrackUpdate::Lost
            }
        }
    }
}

#[derive(Clone, Default)]
struct FlakyFactory {
    healthy_updates: usize,
    inits: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
}

impl TrackerFactory for FlakyFactory {
    fn create(&self) -> Box<dyn Tracker> {
        Box::new(FlakyTracker {
            healthy_updates: self.healthy_updates,
            inits: self.inits.clone(),
            updates: self.updates.clone(),
            bbox: None,
        })
    }
}

fn engine_with(factory: Box<dyn TrackerFactory>) -> DetectionEngine {
    DetectionEngine::new(
        EngineSettings::default(),
        factory,
        Box::new(UnavailableModelLoader),
    )
}

fn blank(index: u64) -> Frame {
    Frame::new(RgbImage::from_pixel(64, 48, Rgb([40, 40, 40])), index)
}

#[test]
fn tracker_loss_returns_to_idle_and_stops_updates() {
    let factory = FlakyFactory {
        healthy_updates: 2,
        ..FlakyFactory::default()
    };
    let updates = factory.updates.clone();
    let inits = factory.inits.clone();
    let mut engine = engine_with(Box::new(factory));

    engine.apply(Command::Batch(vec![
        Command::SetMode(DetectionMode::Manual),
        Command::SetBoundingBox(Some(BoundingBox::from_xywh(10, 10, 12, 12))),
    ]));

    let report = engine.process(&mut blank(0));
    assert_eq!(report.state, ModeState::Stream);
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    engine.process(&mut blank(1));
    engine.process(&mut blank(2));
    let report = engine.process(&mut blank(3));
    assert_eq!(updates.load(Ordering::SeqCst), 3);
    assert_eq!((report.mode, report.state), (DetectionMode::Idle, ModeState::Default));
    assert_eq!(report.tracked, None);
    assert!(engine
        .take_notices()
        .contains(&Notice::TrackerLost {
            mode: DetectionMode::Manual
        }));

    for index in 4..10 {
        engine.process(&mut blank(index));
    }
    assert_eq!(updates.load(Ordering::SeqCst), 3);
    assert_eq!(engine.bounding_box(), None);

    // Re-entering Manual without a new selection does not re-seed.
    engine.set_mode(DetectionMode::Manual);
    for index in 10..13 {
        let report = engine.process(&mut blank(index));
        assert_eq!(report.state, ModeState::Init);
    }
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    // A fresh selection starts a new session.
    engine.apply(Command::Batch(vec![
        Command::SetMode(DetectionMode::Manual),
        Command::SetBoundingBox(Some(BoundingBox::from_xywh(10, 10, 12, 12))),
    ]));
    engine.process(&mut blank(13));
    assert_eq!(inits.load(Ordering::SeqCst), 2);
    assert_eq!(engine.state(), ModeState::Stream);
}

#[test]
fn manual_mode_waits_for_a_selection() {
    let factory = FlakyFactory::default();
    let inits = factory.inits.clone();
    let mut engine = engine_with(Box::new(factory));
    engine.set_mode(DetectionMode::Manual);

    for index in 0..3 {
        let report = engine.process(&mut blank(index));
        assert_eq!(report.state, ModeState::Init);
    }
    assert_eq!(inits.load(Ordering::SeqCst), 0);
}

fn square_frame(index: u64, x: u32) -> Frame {
    let mut image = RgbImage::new(100, 100);
    for y in 45..55 {
        for dx in 0..10 {
            image.put_pixel(x + dx, y, Rgb([255, 255, 255]));
        }
    }
    Frame::new(image, index)
}

#[test]
fn motion_mode_locks_on_and_follows_a_moving_square() {
    let mut engine = engine_with(Box::new(TemplateTrackerFactory::default()));
    engine.set_mode(DetectionMode::Motion);
    assert_eq!(engine.set_parameter("v_min", 200), ParamOutcome::Applied);
    assert_eq!(engine.set_parameter("Min size", 5), ParamOutcome::Applied);
    assert_eq!(engine.set_parameter("max_size", 20), ParamOutcome::Applied);

    let mut states = Vec::new();
    let mut centers = Vec::new();
    for i in 0..10u32 {
        let mut frame = square_frame(u64::from(i), 40 + i);
        let report = engine.process(&mut frame);
        states.push(report.state);
        if let Some(bbox) = report.tracked {
            centers.push(bbox.center().x);
        }
    }

    assert_eq!(engine.mode(), DetectionMode::Motion);
    let first_stream = states
        .iter()
        .position(|state| *state == ModeState::Stream)
        .expect("motion mode never started tracking");
    assert!(first_stream <= 2, "states: {:?}", states);
    assert_eq!(states[0], ModeState::Init);
    assert!(states[first_stream..].iter().all(|s| *s == ModeState::Stream));

    assert!(centers.len() >= 7);
    for pair in centers.windows(2) {
        let step = pair[1] - pair[0];
        assert!((0..=2).contains(&step), "centers: {:?}", centers);
    }
    let total = centers[centers.len() - 1] - centers[0];
    let expected = centers.len() as i32 - 1;
    assert!((total - expected).abs() <= 1, "centers: {:?}", centers);

    match engine.parameters() {
        ModeParameters::Motion(params) => {
            assert_eq!((params.v_min, params.min_size, params.max_size), (200, 5, 20))
        }
        other => panic!("unexpected parameters {:?}", other),
    }
}

fn motion_notices(engine: &mut DetectionEngine) -> Vec<Notice> {
    engine
        .take_notices()
        .into_iter()
        .filter(|n| matches!(n, Notice::MotionStarted | Notice::MotionEnded))
        .collect()
}

#[test]
fn single_pixel_flicker_is_not_motion() {
    let settings = EngineSettings {
        blur_radius: 0,
        ..EngineSettings::default()
    };
    let mut engine = DetectionEngine::new(
        settings,
        Box::new(TemplateTrackerFactory::default()),
        Box::new(UnavailableModelLoader),
    );
    engine.set_mode(DetectionMode::Motion);
    engine.set_parameter("v_min", 200);

    for index in 0..6u64 {
        let mut image = RgbImage::new(60, 60);
        if index % 2 == 1 {
            image.put_pixel(30, 30, Rgb([255, 255, 255]));
        }
        engine.process(&mut Frame::new(image, index));
    }
    assert!(motion_notices(&mut engine).is_empty());

    // A large block appearing is motion.
    let mut image = RgbImage::new(60, 60);
    for y in 10..40 {
        for x in 10..40 {
            image.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    engine.process(&mut Frame::new(image, 6));
    assert_eq!(motion_notices(&mut engine), vec![Notice::MotionStarted]);
}

/// Returns the same output for every input; counts drops of its handle.
struct FixedNetwork {
    output: Prediction,
    released: Arc<AtomicUsize>,
}

impl DetectionNetwork for FixedNetwork {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn input_size(&self) -> u32 {
        64
    }

    fn infer(&mut self, _input: &[f32]) -> anyhow::Result<Prediction> {
        Ok(self.output.clone())
    }
}

impl Drop for FixedNetwork {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct CountingLoader {
    loads: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ModelLoader for CountingLoader {
    fn load(&self, _model: &Path, _classes: &Path) -> Result<ModelHandle, ModelLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // One class-1 anchor at canvas (16, 16), 8x8; two classes.
        let output = Prediction::new(
            vec![1, 6, 1],
            vec![16.0, 16.0, 8.0, 8.0, 0.05, 0.9],
        );
        Ok(ModelHandle::new(
            Box::new(FixedNetwork {
                output,
                released: self.released.clone(),
            }),
            vec!["person".to_string(), "dog".to_string()],
        ))
    }
}

fn gray_frame(index: u64) -> Frame {
    Frame::new(RgbImage::from_pixel(128, 64, Rgb([90, 90, 90])), index)
}

#[test]
fn neural_mode_loads_once_and_draws_class_colored_boxes() {
    let loader = CountingLoader::default();
    let loads = loader.loads.clone();
    let released = loader.released.clone();
    let mut engine = DetectionEngine::new(
        EngineSettings::default(),
        Box::new(TemplateTrackerFactory::default()),
        Box::new(loader),
    );
    engine.apply(Command::Batch(vec![
        Command::set_model_paths("model.onnx", "classes.txt"),
        Command::SetMode(DetectionMode::Neural),
    ]));

    let mut frame = gray_frame(0);
    let report = engine.process(&mut frame);
    assert_eq!(report.state, ModeState::Stream);
    assert!(engine.model_loaded());
    assert_eq!(report.detections.len(), 1);
    let detection = &report.detections[0];
    assert_eq!((detection.class_id, detection.label.as_str()), (1, "dog"));
    assert_eq!(detection.bbox, BoundingBox::from_xywh(24, 24, 16, 16));
    // Left edge of the box, below the label strip.
    assert_eq!(*frame.image.get_pixel(24, 32), PALETTE[1]);
    assert_eq!(*frame.image.get_pixel(32, 32), Rgb([90, 90, 90]));
    assert!(engine
        .take_notices()
        .iter()
        .any(|n| matches!(n, Notice::ModelLoaded { classes: 2, .. })));

    for index in 1..4 {
        let report = engine.process(&mut gray_frame(index));
        assert_eq!(report.state, ModeState::Stream);
        assert_eq!(report.detections.len(), 1);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(released.load(Ordering::SeqCst), 0);

    // Clearing the paths releases the model and waits in Init.
    engine.apply(Command::clear_model_paths());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    let mut frame = gray_frame(4);
    let report = engine.process(&mut frame);
    assert_eq!(report.state, ModeState::Init);
    assert!(report.detections.is_empty());
    assert!(!engine.model_loaded());
    assert!(frame.image.pixels().all(|p| *p == Rgb([90, 90, 90])));
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    // New paths trigger exactly one more load.
    engine.apply(Command::set_model_paths("model.onnx", "classes.txt"));
    engine.process(&mut gray_frame(5));
    engine.process(&mut gray_frame(6));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(engine.model_loaded());

    // Leaving the mode drops the handle.
    engine.set_mode(DetectionMode::Idle);
    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert!(!engine.model_loaded());

    // Re-entering loads again, once.
    engine.set_mode(DetectionMode::Neural);
    engine.process(&mut gray_frame(7));
    engine.process(&mut gray_frame(8));
    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[test]
fn neural_mode_without_paths_passes_frames_through() {
    let mut engine = engine_with(Box::new(TemplateTrackerFactory::default()));
    engine.set_mode(DetectionMode::Neural);

    let mut image = RgbImage::new(32, 24);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = Rgb([(x * 7) as u8, (y * 9) as u8, 128]);
    }
    for index in 0..5 {
        let mut frame = Frame::new(image.clone(), index);
        let report = engine.process(&mut frame);
        assert_eq!(report.state, ModeState::Init);
        assert!(report.detections.is_empty());
        assert_eq!(frame.image, image);
    }
    assert!(!engine.model_loaded());
    assert!(!engine
        .take_notices()
        .iter()
        .any(|n| matches!(n, Notice::ModelLoadFailed { .. })));
}

#[test]
fn draw_mode_outlines_the_selection() {
    let mut engine = engine_with(Box::new(TemplateTrackerFactory::default()));
    engine.apply(Command::Batch(vec![
        Command::SetMode(DetectionMode::Draw),
        Command::SetBoundingBox(Some(BoundingBox::from_xywh(5, 5, 10, 10))),
    ]));
    let mut frame = blank(0);
    let report = engine.process(&mut frame);
    assert_eq!(report.mode, DetectionMode::Draw);
    assert_ne!(*frame.image.get_pixel(5, 5), Rgb([40, 40, 40]));
    assert_eq!(*frame.image.get_pixel(30, 30), Rgb([40, 40, 40]));
}

#[test]
fn idle_mode_leaves_frames_untouched() {
    let mut engine = engine_with(Box::new(TemplateTrackerFactory::default()));
    engine.set_bounding_box(Some(BoundingBox::from_xywh(5, 5, 10, 10)));
    let mut frame = blank(0);
    let report = engine.process(&mut frame);
    assert_eq!((report.mode, report.state), (DetectionMode::Idle, ModeState::Default));
    assert!(frame.image.pixels().all(|p| *p == Rgb([40, 40, 40])));
}
