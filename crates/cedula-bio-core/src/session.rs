use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::symmetry::{symmetry_score, FacialFeatures, Region, SymmetryGrade};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }
}

// `Ok(None)` means the source stopped yielding frames, which ends the
// session. `Send` so a running session can live on a worker thread while a
// `SessionControl` stops it from elsewhere.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> AppResult<Option<Frame>>;
}

pub trait FrameSourceFactory: Send + Sync {
    fn open(&self) -> AppResult<Box<dyn FrameSource>>;
}

pub trait FacePipeline {
    fn detect_faces(&self, frame: &Frame) -> Vec<Region>;
    fn detect_features(&self, frame: &Frame, face: &Region) -> FacialFeatures;
    fn annotate(
        &self,
        _frame: &Frame,
        _face: &Region,
        _features: &FacialFeatures,
        _score: f64,
    ) -> Option<Frame> {
        None
    }
}

// At most one running session holds the device; a second `start()` is
// `DeviceBusy`, never sharing or queuing.
#[derive(Debug, Clone, Default)]
pub struct DeviceLease {
    held: Arc<AtomicBool>,
    device: Arc<String>,
}

impl DeviceLease {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            held: Arc::new(AtomicBool::new(false)),
            device: Arc::new(device.into()),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn acquire(&self) -> AppResult<()> {
        if self.held.swap(true, Ordering::SeqCst) {
            return Err(AppError::DeviceBusy {
                device: self.device.to_string(),
            });
        }
        Ok(())
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct SessionControl {
    stop: Arc<AtomicBool>,
}

impl SessionControl {
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameScore {
    pub frame: String,
    pub score: f64,
    pub interpretation: SymmetryGrade,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame(FrameScore),
    Error { message: String },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

// Stopped is terminal: a finished session cannot be restarted, construct a
// new one. One frame in flight, no buffering; a slow consumer delays the
// next capture.
pub struct StreamingSession {
    id: Uuid,
    state: SessionState,
    config: SessionConfig,
    lease: DeviceLease,
    stop: Arc<AtomicBool>,
    source: Option<Box<dyn FrameSource>>,
    last_score: f64,
}

impl StreamingSession {
    pub fn new(config: SessionConfig, lease: DeviceLease) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            config,
            lease,
            stop: Arc::new(AtomicBool::new(false)),
            source: None,
            last_score: 0.0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    pub fn control(&self) -> SessionControl {
        SessionControl {
            stop: Arc::clone(&self.stop),
        }
    }

    pub fn start(&mut self, factory: &dyn FrameSourceFactory) -> AppResult<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Running => {
                return Err(AppError::DeviceBusy {
                    device: self.lease.device().to_string(),
                })
            }
            SessionState::Stopped => {
                return Err(AppError::SessionFinished {
                    id: self.id.to_string(),
                })
            }
        }

        self.lease.acquire()?;
        match factory.open() {
            Ok(source) => {
                self.source = Some(source);
                self.state = SessionState::Running;
                info!(session = %self.id, device = self.lease.device(), "streaming session started");
                Ok(())
            }
            Err(err) => {
                self.lease.release();
                Err(err)
            }
        }
    }

    // Every path out of the loop releases the device and emits a terminal
    // `Stopped` event; read failures become `Error` events, not panics.
    pub fn run(&mut self, pipeline: &dyn FacePipeline, events: &Sender<SessionEvent>) {
        if self.state != SessionState::Running {
            return;
        }

        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!(session = %self.id, "stop requested");
                break;
            }

            let frame = match self.source.as_mut().map(|source| source.next_frame()) {
                Some(Ok(Some(frame))) => frame,
                Some(Ok(None)) => {
                    warn!(session = %self.id, "capture source stopped yielding frames");
                    let _ = events.send(SessionEvent::Error {
                        message: "capture source stopped yielding frames".into(),
                    });
                    break;
                }
                Some(Err(err)) => {
                    warn!(session = %self.id, error = %err, "frame read failed");
                    let _ = events.send(SessionEvent::Error {
                        message: err.to_string(),
                    });
                    break;
                }
                None => break,
            };

            match self.score_frame(pipeline, frame) {
                Ok(scored) => {
                    self.last_score = scored.score;
                    if events.send(SessionEvent::Frame(scored)).is_err() {
                        debug!(session = %self.id, "consumer disconnected");
                        break;
                    }
                }
                Err(err) => {
                    let _ = events.send(SessionEvent::Error {
                        message: err.to_string(),
                    });
                    break;
                }
            }

            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            sleep(self.config.frame_interval);
        }

        self.finish();
        let _ = events.send(SessionEvent::Stopped);
    }

    fn score_frame(&self, pipeline: &dyn FacePipeline, frame: Frame) -> AppResult<FrameScore> {
        let faces = pipeline.detect_faces(&frame);

        let (score, emitted) = match largest_face(&faces) {
            Some(face) => {
                let features = pipeline.detect_features(&frame, face);
                let score = symmetry_score(face, &features);
                let annotated = pipeline
                    .annotate(&frame, face, &features, score)
                    .unwrap_or(frame);
                (score, annotated)
            }
            None => (0.0, frame),
        };

        Ok(FrameScore {
            frame: encode_frame(&emitted, self.config.jpeg_quality)?,
            score,
            interpretation: SymmetryGrade::from_score(score),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    // Idempotent; stopping an idle or already-stopped session is a no-op.
    pub fn stop(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        self.finish();
    }

    fn finish(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        self.source = None;
        self.lease.release();
        self.state = SessionState::Stopped;
        info!(session = %self.id, last_score = self.last_score, "streaming session stopped");
    }
}

// Ties keep the detector's output order.
fn largest_face(faces: &[Region]) -> Option<&Region> {
    let mut best: Option<&Region> = None;
    for face in faces {
        if best.map(|current| face.area() > current.area()).unwrap_or(true) {
            best = Some(face);
        }
    }
    best
}

pub fn encode_frame(frame: &Frame, quality: u8) -> AppResult<String> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    frame
        .image
        .write_with_encoder(encoder)
        .map_err(|err| AppError::FrameProcessing(format!("failed to encode JPEG: {err}")))?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(&buffer)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::mpsc;

    struct QueueSource {
        frames: VecDeque<Frame>,
    }

    impl FrameSource for QueueSource {
        fn next_frame(&mut self) -> AppResult<Option<Frame>> {
            Ok(self.frames.pop_front())
        }
    }

    struct QueueFactory {
        frames: std::sync::Mutex<Option<VecDeque<Frame>>>,
    }

    impl QueueFactory {
        fn with_frames(count: usize) -> Self {
            let frames = (0..count).map(|_| test_frame()).collect();
            Self {
                frames: std::sync::Mutex::new(Some(frames)),
            }
        }
    }

    impl FrameSourceFactory for QueueFactory {
        fn open(&self) -> AppResult<Box<dyn FrameSource>> {
            let frames = self
                .frames
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| AppError::DeviceUnavailable {
                    device: "/dev/video9".into(),
                    message: "already consumed".into(),
                })?;
            Ok(Box::new(QueueSource { frames }))
        }
    }

    struct FailingFactory;

    impl FrameSourceFactory for FailingFactory {
        fn open(&self) -> AppResult<Box<dyn FrameSource>> {
            Err(AppError::DeviceUnavailable {
                device: "/dev/video9".into(),
                message: "no such device".into(),
            })
        }
    }

    struct OneFacePipeline;

    impl FacePipeline for OneFacePipeline {
        fn detect_faces(&self, _frame: &Frame) -> Vec<Region> {
            vec![
                Region::new(0.0, 0.0, 10.0, 10.0),
                Region::new(100.0, 50.0, 200.0, 200.0),
            ]
        }

        fn detect_features(&self, _frame: &Frame, face: &Region) -> FacialFeatures {
            // Only the large face gets symmetric eyes; scoring the small one
            // would betray a largest-face selection bug.
            if face.width > 10.0 {
                FacialFeatures {
                    eyes: vec![
                        Region::new(150.0, 100.0, 20.0, 20.0),
                        Region::new(230.0, 100.0, 20.0, 20.0),
                    ],
                    ..FacialFeatures::default()
                }
            } else {
                FacialFeatures::default()
            }
        }
    }

    struct NoFacePipeline;

    impl FacePipeline for NoFacePipeline {
        fn detect_faces(&self, _frame: &Frame) -> Vec<Region> {
            Vec::new()
        }

        fn detect_features(&self, _frame: &Frame, _face: &Region) -> FacialFeatures {
            FacialFeatures::default()
        }
    }

    fn test_frame() -> Frame {
        Frame::new(RgbImage::from_pixel(4, 4, image::Rgb([128, 128, 128])))
    }

    fn quick_config() -> SessionConfig {
        SessionConfig {
            frame_interval: Duration::from_millis(1),
            jpeg_quality: 80,
        }
    }

    #[test]
    fn start_opens_the_source_and_transitions_to_running() {
        let lease = DeviceLease::new("/dev/video0");
        let mut session = StreamingSession::new(quick_config(), lease);
        session.start(&QueueFactory::with_frames(1)).unwrap();
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn start_failure_leaves_the_session_idle_and_lease_free() {
        let lease = DeviceLease::new("/dev/video9");
        let mut session = StreamingSession::new(quick_config(), lease.clone());
        let err = session.start(&FailingFactory).unwrap_err();
        assert!(matches!(err, AppError::DeviceUnavailable { .. }));
        assert_eq!(session.state(), SessionState::Idle);

        // The lease was released, so another session can start.
        let mut next = StreamingSession::new(quick_config(), lease);
        next.start(&QueueFactory::with_frames(1)).unwrap();
        assert_eq!(next.state(), SessionState::Running);
    }

    #[test]
    fn second_start_while_running_is_device_busy() {
        let lease = DeviceLease::new("/dev/video0");
        let mut first = StreamingSession::new(quick_config(), lease.clone());
        first.start(&QueueFactory::with_frames(1)).unwrap();

        let mut second = StreamingSession::new(quick_config(), lease);
        let err = second.start(&QueueFactory::with_frames(1)).unwrap_err();
        assert!(matches!(err, AppError::DeviceBusy { .. }));
        assert_eq!(second.state(), SessionState::Idle);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let mut session = StreamingSession::new(quick_config(), DeviceLease::new("/dev/video0"));
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn after_stop_a_fresh_session_can_start() {
        let lease = DeviceLease::new("/dev/video0");
        let mut session = StreamingSession::new(quick_config(), lease.clone());
        session.start(&QueueFactory::with_frames(1)).unwrap();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);

        // The stopped session is terminal...
        let err = session.start(&QueueFactory::with_frames(1)).unwrap_err();
        assert!(matches!(err, AppError::SessionFinished { .. }));

        // ...but the device is free for a newly constructed one.
        let mut fresh = StreamingSession::new(quick_config(), lease);
        fresh.start(&QueueFactory::with_frames(1)).unwrap();
        assert_eq!(fresh.state(), SessionState::Running);
    }

    #[test]
    fn run_scores_the_largest_face_and_ends_with_stopped_event() {
        let mut session = StreamingSession::new(quick_config(), DeviceLease::new("/dev/video0"));
        session.start(&QueueFactory::with_frames(2)).unwrap();

        let (tx, rx) = mpsc::channel();
        session.run(&OneFacePipeline, &tx);

        let events: Vec<SessionEvent> = rx.try_iter().collect();
        let frames: Vec<&FrameScore> = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Frame(scored) => Some(scored),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 2);
        for scored in &frames {
            assert!((scored.score - 100.0).abs() < 1e-9);
            assert_eq!(scored.interpretation, SymmetryGrade::Excellent);
            assert!(scored.frame.starts_with("data:image/jpeg;base64,"));
        }

        // Exhaustion is reported as an error event, then the terminal stop.
        assert!(matches!(
            events[events.len() - 2],
            SessionEvent::Error { .. }
        ));
        assert!(matches!(events[events.len() - 1], SessionEvent::Stopped));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!((session.last_score() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn frames_without_faces_emit_zero_and_deficient() {
        let mut session = StreamingSession::new(quick_config(), DeviceLease::new("/dev/video0"));
        session.start(&QueueFactory::with_frames(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        session.run(&NoFacePipeline, &tx);

        let scored = rx
            .try_iter()
            .find_map(|event| match event {
                SessionEvent::Frame(scored) => Some(scored),
                _ => None,
            })
            .expect("one frame event");
        assert_eq!(scored.score, 0.0);
        assert_eq!(scored.interpretation, SymmetryGrade::Deficient);
    }

    #[test]
    fn control_stop_ends_the_loop_and_releases_the_device() {
        struct EndlessFactory;
        struct EndlessSource;

        impl FrameSource for EndlessSource {
            fn next_frame(&mut self) -> AppResult<Option<Frame>> {
                Ok(Some(test_frame()))
            }
        }

        impl FrameSourceFactory for EndlessFactory {
            fn open(&self) -> AppResult<Box<dyn FrameSource>> {
                Ok(Box::new(EndlessSource))
            }
        }

        let lease = DeviceLease::new("/dev/video0");
        let mut session = StreamingSession::new(quick_config(), lease.clone());
        session.start(&EndlessFactory).unwrap();
        let control = session.control();

        let (tx, rx) = mpsc::channel();
        let worker = std::thread::spawn(move || {
            session.run(&NoFacePipeline, &tx);
            session
        });

        // Wait for at least one frame, then cancel.
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, SessionEvent::Frame(_)));
        control.request_stop();

        let session = worker.join().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);

        let mut fresh = StreamingSession::new(quick_config(), lease);
        fresh.start(&EndlessFactory).unwrap();
    }

    #[test]
    fn largest_face_ties_keep_detector_order() {
        let faces = vec![
            Region::new(0.0, 0.0, 10.0, 10.0),
            Region::new(50.0, 50.0, 10.0, 10.0),
        ];
        let chosen = largest_face(&faces).unwrap();
        assert_eq!(chosen.x, 0.0);
    }
}
