use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use detection_overlay::geometry::map_rect;
use detection_overlay::{
    ClassLabel, DetectorBackend, DetectorError, Frame, FrameSource, NormalizedRect, NullSurface,
    Observation, OverlayLayer, PipelineConfig, PipelineController, PipelineState,
    RecognizedObject, StubBackend, Submission, SyntheticConfig, SyntheticSource,
    ViewportGeometry,
};

const WAIT: Duration = Duration::from_secs(5);

/// Blocks every inference until the test releases it. A frame whose first
/// byte is zero fails inference.
struct GatedBackend {
    started: Sender<u64>,
    release: Receiver<()>,
}

impl DetectorBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, DetectorError> {
        let _ = self.started.send(frame.sequence);
        self.release
            .recv_timeout(WAIT)
            .map_err(|_| DetectorError::inference("gate never opened"))?;
        if frame.pixels()[0] == 0 {
            return Err(DetectorError::inference("sensor glitch"));
        }
        Ok(vec![Observation::RecognizedObject(RecognizedObject {
            bounds: NormalizedRect::new(0.1, 0.1, 0.3, 0.4).unwrap(),
            confidence: 0.9,
            labels: vec![ClassLabel::new("cup", 0.9), ClassLabel::new("bowl", 0.05)],
        })])
    }
}

struct Gate {
    started: Receiver<u64>,
    release: Sender<()>,
}

impl Gate {
    fn wait_started(&self) -> u64 {
        self.started.recv_timeout(WAIT).expect("inference started")
    }

    fn open(&self) {
        self.release.send(()).expect("release inference");
    }
}

fn gated() -> (GatedBackend, Gate) {
    let (started_tx, started_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded();
    (
        GatedBackend {
            started: started_tx,
            release: release_rx,
        },
        Gate {
            started: started_rx,
            release: release_tx,
        },
    )
}

fn viewport() -> ViewportGeometry {
    ViewportGeometry::new(1000.0, 2000.0).unwrap()
}

fn frame(byte: u8, sequence: u64) -> Frame {
    Frame::rgb(vec![byte; 4 * 4 * 3], 4, 4, sequence).unwrap()
}

#[test]
fn frames_arriving_during_inference_are_dropped() {
    let (backend, gate) = gated();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(backend),
        PipelineConfig::default(),
        NullSurface,
        viewport(),
    )
    .expect("start pipeline");

    assert_eq!(controller.submit(frame(9, 1), viewport()), Submission::Dispatched);
    assert_eq!(gate.wait_started(), 1);
    assert_eq!(controller.state(), PipelineState::AwaitingInference);

    let started = Instant::now();
    assert_eq!(controller.submit(frame(9, 2), viewport()), Submission::Dropped);
    assert!(started.elapsed() < Duration::from_secs(1));

    gate.open();
    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(1));
    assert!(controller.wait_idle(WAIT));

    // Frame 2 never reached the detector.
    assert!(gate.started.try_recv().is_err());
    let stats = controller.stats();
    assert_eq!(stats.frames_submitted, 1);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.inferences_completed, 1);

    // The pipeline accepts frames again once idle.
    assert_eq!(controller.submit(frame(9, 3), viewport()), Submission::Dispatched);
    assert_eq!(gate.wait_started(), 3);
    gate.open();
    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(3));
    controller.stop().unwrap();
}

#[test]
fn failed_inference_keeps_previous_overlay() {
    let (backend, gate) = gated();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(backend),
        PipelineConfig::default(),
        NullSurface,
        viewport(),
    )
    .expect("start pipeline");

    controller.submit(frame(9, 1), viewport());
    gate.open();
    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(1));
    assert!(controller.wait_idle(WAIT));
    let shown: Vec<OverlayLayer> = render.layers().to_vec();
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[1].text(), Some("cup"));

    controller.submit(frame(0, 2), viewport());
    gate.open();
    assert!(controller.wait_idle(WAIT));
    assert_eq!(render.pump(), None);
    assert_eq!(render.layers(), shown.as_slice());
    assert_eq!(render.shown_sequence(), Some(1));

    let stats = controller.stats();
    assert_eq!(stats.inferences_failed, 1);
    assert_eq!(stats.overlays_rendered, 1);
    // A failed frame does not stop the pipeline.
    assert_eq!(controller.state(), PipelineState::Idle);
    controller.stop().unwrap();
}

#[test]
fn resize_repositions_without_new_detections() {
    let (backend, gate) = gated();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(backend),
        PipelineConfig::default(),
        NullSurface,
        viewport(),
    )
    .expect("start pipeline");

    controller.submit(frame(9, 1), viewport());
    gate.open();
    render.wait_and_pump(WAIT).unwrap();
    let before = render.layers().to_vec();

    let rotated = viewport().rotated();
    render.resize(rotated);
    assert_eq!(render.renderer().viewport(), rotated);
    assert_eq!(render.layers(), before.as_slice());
    assert_eq!(render.stats().overlays_rendered, 1);
    controller.stop().unwrap();
}

#[test]
fn rotation_during_inference_is_not_undone_by_late_result() {
    let (backend, gate) = gated();
    let portrait = ViewportGeometry::new(390.0, 844.0).unwrap();
    let landscape = portrait.rotated();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(backend),
        PipelineConfig::default(),
        NullSurface,
        portrait,
    )
    .expect("start pipeline");

    controller.submit(frame(9, 1), portrait);
    gate.wait_started();
    render.resize(landscape);
    gate.open();
    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(1));

    assert_eq!(render.renderer().viewport(), landscape);
    let expected = map_rect(&NormalizedRect::new(0.1, 0.1, 0.3, 0.4).unwrap(), landscape);
    assert_eq!(render.layers()[0].frame(), expected);

    // A frame captured after the resize brings its own geometry.
    std::thread::sleep(Duration::from_millis(2));
    let later = frame(9, 2);
    controller.submit(later, portrait);
    gate.open();
    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(2));
    assert_eq!(render.renderer().viewport(), portrait);
    controller.stop().unwrap();
}

#[test]
fn unrendered_results_do_not_pile_up() {
    let (backend, gate) = gated();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(backend),
        PipelineConfig::default(),
        NullSurface,
        viewport(),
    )
    .expect("start pipeline");

    let mut dispatched = 0;
    for sequence in 1..=200 {
        gate.open();
        if controller.submit(frame(9, sequence), viewport()) == Submission::Dispatched {
            dispatched += 1;
        }
    }

    let deadline = Instant::now() + WAIT;
    while render.pending() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    // Nothing pumps, so the first result stays pending and blocks new work.
    assert_eq!(dispatched, 1);
    assert_eq!(render.pending(), 1);
    assert_eq!(controller.state(), PipelineState::AwaitingInference);
    let stats = controller.stats();
    assert_eq!(stats.frames_dropped, 199);
    assert_eq!(stats.overlays_rendered, 0);

    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(1));
    assert_eq!(render.pending(), 0);
    assert_eq!(controller.state(), PipelineState::Idle);
    controller.stop().unwrap();
}

#[test]
fn stop_lets_in_flight_inference_finish() {
    let (backend, gate) = gated();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(backend),
        PipelineConfig::default(),
        NullSurface,
        viewport(),
    )
    .expect("start pipeline");

    controller.submit(frame(9, 1), viewport());
    gate.wait_started();
    gate.open();
    controller.stop().unwrap();

    assert_eq!(controller.state(), PipelineState::Stopped);
    assert_eq!(controller.submit(frame(9, 2), viewport()), Submission::Stopped);
    assert_eq!(render.pump(), Some(1));
    assert_eq!(render.stats().inferences_completed, 1);
}

#[test]
fn synthetic_source_drives_stub_backend_end_to_end() {
    let viewport = ViewportGeometry::new(390.0, 844.0).unwrap();
    let (mut controller, mut render) = PipelineController::start(
        Box::new(StubBackend::new().with_label("square")),
        PipelineConfig::default(),
        NullSurface,
        viewport,
    )
    .expect("start pipeline");
    assert_eq!(controller.backend_name(), "stub");

    let mut source =
        SyntheticSource::new(SyntheticConfig::new("stub://test", 64, 48, viewport)).unwrap();
    source.connect().unwrap();

    let next = source.next_frame().unwrap();
    assert_eq!(
        controller.submit(next.frame, next.viewport),
        Submission::Dispatched
    );
    assert_eq!(render.wait_and_pump(WAIT).unwrap(), Some(1));

    // Square of 12px at x=2, y=18 in a 64x48 frame.
    let layers = render.layers();
    assert_eq!(layers.len(), 2);
    let rect = layers[0].frame();
    assert!((rect.x - 12.1875).abs() < 1e-3);
    assert!((rect.y - 316.5).abs() < 1e-3);
    assert!((rect.width - 73.125).abs() < 1e-3);
    assert!((rect.height - 211.0).abs() < 1e-3);
    assert_eq!(layers[1].text(), Some("square"));
    let label = layers[1].frame();
    assert_eq!((label.width, label.height), (200.0, 18.0));
    assert!((label.y - (rect.y + 10.0)).abs() < 1e-3);

    controller.stop().unwrap();
}
