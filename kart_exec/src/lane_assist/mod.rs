//! # Lane assist module
//!
//! The lane assist is the per-frame loop which ties the rest of the kart
//! together. For each top-down frame it:
//!
//! 1. Detects the lines in the frame.
//! 2. Filters them down to the lines of the road the kart is on.
//! 3. Generates a path down the requested lane.
//! 4. Sets the target speed from the speed policy.
//! 5. Sets the steering demand from the path follower.
//! 6. Passes the frame to the stop line assist.
//!
//! Frames with fewer than two usable lines are soft misses: steering and
//! speed are left as they were and the loop carries on.
//!
//! The loop is controlled from outside through a [`LaneAssistHandle`], which
//! can change the requested lane, toggle actuation, and stop the loop between
//! frames.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod speed_policy;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use speed_policy::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering}
    },
    thread::{self, JoinHandle}
};
use image::GrayImage;
use log::{debug, info, trace, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// Internal
use crate::{
    calib::{Calibration, FrameSource, FrameSourceError},
    can_ctrl::CanController,
    line_det::{filter_lines, LineDetector},
    params::KartExecParams,
    path_follow::PathFollower,
    path_gen::PathGenerator,
    speed_ctrl::SpeedController,
    stop_line_assist::StopLineAssist
};
use util::archive::Archiver;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the lane assist
#[derive(Deserialize, Debug, Clone)]
pub struct LaneAssistParams {
    /// How the target speed is chosen for each path
    #[serde(default)]
    pub speed_policy: SpeedPolicy,

    /// If true the executable writes every frame report into the session
    /// archive.
    #[serde(default)]
    pub archive_reports: bool
}

pub struct LaneAssist {
    line_det: LineDetector,
    path_gen: PathGenerator,
    follower: PathFollower,
    stop_assist: StopLineAssist,

    speed_ctrl: Arc<dyn SpeedController>,
    can: Arc<dyn CanController>,

    speed_policy: SpeedPolicy,

    handle: LaneAssistHandle,

    /// Whether actuation was enabled on the previous frame
    was_enabled: bool,

    num_frames: usize,

    archiver: Archiver
}

/// Shared controls of a running lane assist.
#[derive(Debug, Clone)]
pub struct LaneAssistHandle {
    enabled: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    requested_lane: Arc<AtomicUsize>
}

/// Summary of the processing of a single frame.
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct FrameReport {
    pub frame: usize,
    pub enabled: bool,
    pub requested_lane: usize,

    pub num_lines: usize,
    pub num_driving_lines: usize,

    pub path_found: bool,
    pub path_radius_m: f64,

    pub target_speed_kmh: f64,
    pub steering_fraction: f64,
    pub lookahead_px: f64,
    pub offset_m: f64,

    pub stopped_for_stop_line: bool
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LaneAssistError {
    #[error("Could not get the next frame: {0}")]
    FrameSourceError(#[from] FrameSourceError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LaneAssist {
    pub fn new(
        params: &KartExecParams,
        calib: Arc<Calibration>,
        speed_ctrl: Arc<dyn SpeedController>,
        can: Arc<dyn CanController>
    ) -> Self {
        Self {
            line_det: LineDetector::new(&params.line_det, calib.clone()),
            path_gen: PathGenerator::new(&params.path_gen, calib.clone()),
            follower: PathFollower::new(
                &params.path_follow, calib.clone(), speed_ctrl.clone()
            ),
            stop_assist: StopLineAssist::new(
                &params.stop_line_assist, calib, speed_ctrl.clone()
            ),
            speed_ctrl,
            can,
            speed_policy: params.lane_assist.speed_policy.clone(),
            handle: LaneAssistHandle::new(),
            was_enabled: true,
            num_frames: 0,
            archiver: Archiver::default()
        }
    }

    /// Get a handle to control the lane assist from other threads.
    pub fn handle(&self) -> LaneAssistHandle {
        self.handle.clone()
    }

    /// Archive every frame report with the given archiver.
    pub fn set_archiver(&mut self, archiver: Archiver) {
        self.archiver = archiver;
    }

    /// Process frames from the source until it is exhausted or the loop is
    /// stopped, returning the number of frames processed.
    ///
    /// Frame source errors are fatal to the loop.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<usize, LaneAssistError> {
        info!("Lane assist started");

        let mut num_processed = 0;
        while self.handle.is_running() {
            let frame = match source.next_frame()? {
                Some(f) => f,
                None => {
                    info!("Frame source exhausted");
                    break
                }
            };

            self.process_frame(&frame);
            num_processed += 1;
        }

        info!("Lane assist stopped after {} frames", num_processed);

        Ok(num_processed)
    }

    /// Run the lane assist on its own thread.
    pub fn spawn(
        mut self,
        mut source: Box<dyn FrameSource>
    ) -> JoinHandle<Result<usize, LaneAssistError>> {
        thread::spawn(move || self.run(source.as_mut()))
    }

    /// Process a single top-down frame.
    pub fn process_frame(&mut self, image: &GrayImage) -> FrameReport {
        let mut report = FrameReport {
            frame: self.num_frames,
            enabled: self.handle.is_enabled(),
            requested_lane: self.handle.requested_lane(),
            ..FrameReport::default()
        };
        self.num_frames += 1;

        // Start the follower afresh whenever actuation is toggled
        if report.enabled != self.was_enabled {
            info!(
                "Lane assist {}", if report.enabled { "enabled" } else { "disabled" }
            );
            self.follower.reset();
            self.was_enabled = report.enabled;
        }

        if report.enabled {
            self.steer(image, &mut report);
        }

        trace!("{:?}", report);

        if self.archiver.is_active() {
            if let Err(e) = self.archiver.serialise(&report) {
                warn!("Could not archive frame report: {}", e);
            }
        }

        report
    }

    fn steer(&mut self, image: &GrayImage, report: &mut FrameReport) {
        let lines = self.line_det.detect(image);
        report.num_lines = lines.len();

        let centre = (image.width() / 2) as i32;
        let driving_lines = filter_lines(&lines, centre);
        report.num_driving_lines = driving_lines.len();

        if driving_lines.len() < 2 {
            debug!(
                "Frame {}: only {} driving lines, skipping steering",
                report.frame, driving_lines.len()
            );
        }
        else {
            match self.path_gen.generate(driving_lines, report.requested_lane) {
                Ok(path) => {
                    report.path_found = true;
                    report.path_radius_m = path.radius;

                    let target = self.speed_policy
                        .target_speed(&path)
                        .min(self.speed_ctrl.max_speed());
                    match self.speed_ctrl.set_target_speed(target) {
                        Ok(()) => report.target_speed_kmh = target,
                        Err(e) => warn!("Could not set target speed: {}", e)
                    }

                    let car_pos = Point2::new(
                        (image.width() / 2) as f64,
                        image.height() as f64
                    );
                    let fraction = self.follower.get_steering_fraction(&path, car_pos);
                    self.can.set_steering(fraction);

                    let follow = self.follower.report();
                    report.steering_fraction = fraction;
                    report.lookahead_px = follow.lookahead_px;
                    report.offset_m = follow.offset_m;
                },
                Err(e) => debug!("Frame {}: no path: {}", report.frame, e)
            }
        }

        report.stopped_for_stop_line = self.stop_assist.detect_and_handle(
            image, driving_lines, &self.line_det
        );
    }
}

impl LaneAssistHandle {
    fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            running: Arc::new(AtomicBool::new(true)),
            requested_lane: Arc::new(AtomicUsize::new(0))
        }
    }

    /// Set the lane to drive in, 0 being the rightmost.
    pub fn set_requested_lane(&self, lane: usize) {
        self.requested_lane.store(lane, Ordering::Relaxed);
    }

    pub fn requested_lane(&self) -> usize {
        self.requested_lane.load(Ordering::Relaxed)
    }

    /// Enable or disable actuation, returning the new enabled state.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Stop the loop before its next frame.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::mpsc, time::Duration};
    use comms_if::eqpt::can::Gear;
    use crate::{
        can_ctrl::{Actuation, SimCanController, SimSpeedModel},
        line_det::test::{
            curved_calib, curved_params, curved_road, draw_rect, straight_road, test_calib
        },
        params::test::test_kart_params,
        speed_ctrl::{SpeedCtrl, SpeedControllerState}
    };

    fn setup() -> (Arc<SimCanController>, Arc<SpeedCtrl>, LaneAssist) {
        let params = test_kart_params();
        let can = Arc::new(SimCanController::new());
        let sc = Arc::new(SpeedCtrl::new(&params.speed_ctrl, can.clone()));
        let la = LaneAssist::new(&params, test_calib(), sc.clone(), can.clone());
        (can, sc, la)
    }

    fn steering_demands(can: &SimCanController) -> Vec<f64> {
        can.history().iter()
            .filter_map(|a| match a {
                Actuation::Steering(s) => Some(*s),
                _ => None
            })
            .collect()
    }

    #[test]
    fn test_straight_road() {
        let (can, sc, mut la) = setup();

        let report = la.process_frame(&straight_road());

        assert_eq!(report.num_driving_lines, 2);
        assert!(report.path_found);
        assert!(report.path_radius_m > 100.0);
        assert_eq!(report.target_speed_kmh, 10.0);
        assert_eq!(sc.target_speed(), 10.0);

        let steering = steering_demands(&can);
        assert_eq!(steering.len(), 1);
        assert!(steering[0].abs() < 0.1);
        assert!(!report.stopped_for_stop_line);
    }

    #[test]
    fn test_curved_dashed_road() {
        let mut params = test_kart_params();
        params.line_det = curved_params();

        let can = Arc::new(SimCanController::new());
        let sc = Arc::new(SpeedCtrl::new(&params.speed_ctrl, can.clone()));
        let mut la = LaneAssist::new(&params, curved_calib(), sc, can.clone());
        let handle = la.handle();

        let frame = curved_road();
        for lane in 0..3 {
            handle.set_requested_lane(lane);
            let report = la.process_frame(&frame);

            assert_eq!(report.num_lines, 4);
            assert_eq!(report.num_driving_lines, 4);
            assert!(report.path_found);
        }

        let steering = steering_demands(&can);
        assert_eq!(steering.len(), 3);
    }

    #[test]
    fn test_soft_miss() {
        let (can, _, mut la) = setup();

        // One line only, no lane can be formed
        let mut img = GrayImage::new(400, 600);
        draw_rect(&mut img, 273, 0, 4, 600);

        let report = la.process_frame(&img);
        assert!(!report.path_found);
        assert!(can.history().is_empty());

        let report = la.process_frame(&GrayImage::new(400, 600));
        assert_eq!(report.num_lines, 0);
        assert_eq!(report.frame, 1);
        assert!(can.history().is_empty());
    }

    #[test]
    fn test_toggle() {
        let (can, _, mut la) = setup();
        let handle = la.handle();

        assert!(!handle.toggle());
        let report = la.process_frame(&straight_road());
        assert!(!report.enabled);
        assert!(can.history().is_empty());

        assert!(handle.toggle());
        let report = la.process_frame(&straight_road());
        assert!(report.enabled);
        assert_eq!(steering_demands(&can).len(), 1);
    }

    #[test]
    fn test_stop_line() {
        let (_, sc, mut la) = setup();

        let mut img = straight_road();
        draw_rect(&mut img, 130, 398, 60, 4);

        // Ignored while driving
        sc.set_state(SpeedControllerState::Driving);
        assert!(!la.process_frame(&img).stopped_for_stop_line);

        // The line is about 10 m ahead, too far to stop at yet
        sc.set_state(SpeedControllerState::WaitingToStop);
        assert!(!la.process_frame(&img).stopped_for_stop_line);

        // Move the line closer to the kart
        let mut img = straight_road();
        draw_rect(&mut img, 130, 540, 60, 4);
        assert!(la.process_frame(&img).stopped_for_stop_line);
        assert_eq!(sc.state(), SpeedControllerState::Stopped);
    }

    #[test]
    fn test_run() {
        let (can, _, mut la) = setup();

        let mut source = vec![straight_road(), straight_road(), straight_road()].into_iter();
        assert_eq!(la.run(&mut source).unwrap(), 3);
        assert_eq!(steering_demands(&can).len(), 3);

        // A stopped loop processes nothing
        la.handle().stop();
        let mut source = vec![straight_road()].into_iter();
        assert_eq!(la.run(&mut source).unwrap(), 0);
    }

    #[test]
    fn test_run_driving() {
        let params = test_kart_params();
        let can = Arc::new(SimCanController::new());
        let sc = Arc::new(SpeedCtrl::new(&params.speed_ctrl, can.clone()));
        sc.start_driving();
        let mut la = LaneAssist::new(&params, test_calib(), sc.clone(), can.clone());

        let mut source = vec![straight_road(), straight_road()].into_iter();
        assert_eq!(la.run(&mut source).unwrap(), 2);

        assert_eq!(sc.state(), SpeedControllerState::Driving);
        let dems = can.dems();
        assert_eq!(dems.gear, Gear::Drive);
        assert_eq!(dems.throttle, 20);
        assert_eq!(dems.brake, 0);

        // The modelled speed reaches the controller
        let (tx, rx) = mpsc::channel();
        let feedback = can.spawn_feedback_thread(rx);
        let running = Arc::new(AtomicBool::new(true));
        let model = can.spawn_speed_model(
            SimSpeedModel::new(&params.sim_speed), tx, running.clone()
        );

        for _ in 0..400 {
            if sc.current_speed() > 0.0 {
                break
            }
            thread::sleep(Duration::from_millis(5));
        }

        running.store(false, Ordering::SeqCst);
        model.join().unwrap();
        feedback.join().unwrap();

        assert!(sc.current_speed() > 0.0);
        assert!(sc.current_speed() < 10.0);
    }

    #[test]
    fn test_spawn() {
        let (_, _, la) = setup();
        let handle = la.handle();
        handle.set_requested_lane(3);

        let source = Box::new(vec![straight_road(), straight_road()].into_iter());
        let frames = la.spawn(source).join().unwrap().unwrap();

        assert_eq!(frames, 2);
        assert_eq!(handle.requested_lane(), 3);
    }
}
