//! # Stop line assist module
//!
//! While the speed controller is waiting to stop, the stop line assist looks
//! for stop lines between the detected lane lines and stops the kart once the
//! nearest one is within braking distance plus a margin.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::Arc;
use image::GrayImage;
use log::{debug, info};
use serde::Deserialize;

// Internal
use crate::{
    calib::Calibration,
    line_det::{Line, LineDetector, StopLineDetector, StopLineParams},
    speed_ctrl::{SpeedController, SpeedControllerState}
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the stop line assist
#[derive(Deserialize, Debug, Clone)]
pub struct StopLineAssistParams {
    /// Distance left to the stop line, after braking, at which the kart is
    /// stopped.
    ///
    /// Units: meters
    pub min_distance_m: f64,

    /// Stop line detection parameters
    pub stop_line: StopLineParams
}

pub struct StopLineAssist {
    params: StopLineAssistParams,

    calib: Arc<Calibration>,

    detector: StopLineDetector,

    speed_ctrl: Arc<dyn SpeedController>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StopLineAssist {
    pub fn new(
        params: &StopLineAssistParams,
        calib: Arc<Calibration>,
        speed_ctrl: Arc<dyn SpeedController>
    ) -> Self {
        Self {
            params: params.clone(),
            detector: StopLineDetector::new(&params.stop_line, calib.clone()),
            calib,
            speed_ctrl
        }
    }

    /// Look for stop lines in the image and stop the kart if one is close
    /// enough.
    ///
    /// Returns `true` if the kart was stopped. Nothing is done unless the
    /// speed controller is waiting to stop.
    pub fn detect_and_handle(
        &self,
        image: &GrayImage,
        lines: &[Line],
        line_det: &LineDetector
    ) -> bool {
        if self.speed_ctrl.state() != SpeedControllerState::WaitingToStop {
            return false
        }

        if lines.len() < 2 {
            return false
        }

        let stop_lines = self.detector.detect(image, lines, line_det);
        let img_height = image.height() as f64;

        for stop_line in stop_lines.iter() {
            let mean_row = match stop_line.mean_row() {
                Some(r) => r,
                None => continue
            };

            let distance_m = self.calib.get_distance(img_height - mean_row);
            let braking_m = self.speed_ctrl.get_braking_distance();

            debug!(
                "Stop line at {:.2} m, braking distance {:.2} m",
                distance_m, braking_m
            );

            if distance_m - braking_m <= self.params.min_distance_m {
                info!("Stopping for stop line {:.2} m ahead", distance_m);
                self.speed_ctrl.set_state(SpeedControllerState::Stopped);
                return true
            }
        }

        false
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        can_ctrl::SimCanController,
        line_det::test::*,
        speed_ctrl::{test::test_speed_params, SpeedCtrl}
    };
    use comms_if::eqpt::can::SpeedFeedback;

    pub(crate) fn test_assist_params(min_distance_m: f64) -> StopLineAssistParams {
        StopLineAssistParams {
            min_distance_m,
            stop_line: StopLineParams {
                min_length_m: 2.0,
                max_length_m: 4.0,
                spacing_tolerance_px: 2
            }
        }
    }

    fn setup(min_distance_m: f64) -> (Arc<SpeedCtrl>, LineDetector, StopLineAssist) {
        let calib = test_calib();
        let can = Arc::new(SimCanController::new());
        let sc = Arc::new(SpeedCtrl::new(&test_speed_params(), can));

        let assist = StopLineAssist::new(
            &test_assist_params(min_distance_m), calib.clone(), sc.clone()
        );
        (sc, LineDetector::new(&test_params(), calib), assist)
    }

    /// Straight road with a stop line about 10 m ahead of the kart
    fn stop_line_road() -> GrayImage {
        let mut img = straight_road();
        draw_rect(&mut img, 130, 398, 60, 4);
        img
    }

    #[test]
    fn test_stop_within_distance() {
        let (sc, line_det, assist) = setup(11.0);
        let img = stop_line_road();
        let lines = line_det.detect(&img);

        sc.set_state(SpeedControllerState::WaitingToStop);
        assert!(assist.detect_and_handle(&img, &lines, &line_det));
        assert_eq!(sc.state(), SpeedControllerState::Stopped);
    }

    #[test]
    fn test_no_stop_beyond_distance() {
        let (sc, line_det, assist) = setup(5.0);
        let img = stop_line_road();
        let lines = line_det.detect(&img);

        sc.set_state(SpeedControllerState::WaitingToStop);
        assert!(!assist.detect_and_handle(&img, &lines, &line_det));
        assert_eq!(sc.state(), SpeedControllerState::WaitingToStop);

        // At 40 km/h the braking distance is 8 m, which brings the line
        // within range.
        sc.on_speed_feedback(&SpeedFeedback { speed_kmh: 40.0 }.to_message());
        assert!(assist.detect_and_handle(&img, &lines, &line_det));
        assert_eq!(sc.state(), SpeedControllerState::Stopped);
    }

    #[test]
    fn test_ignored_unless_waiting() {
        let (sc, line_det, assist) = setup(11.0);
        let img = stop_line_road();
        let lines = line_det.detect(&img);

        sc.set_state(SpeedControllerState::Driving);
        assert!(!assist.detect_and_handle(&img, &lines, &line_det));
        assert_eq!(sc.state(), SpeedControllerState::Driving);
    }

    #[test]
    fn test_no_stop_line() {
        let (sc, line_det, assist) = setup(11.0);
        let img = straight_road();
        let lines = line_det.detect(&img);

        sc.set_state(SpeedControllerState::WaitingToStop);
        assert!(!assist.detect_and_handle(&img, &lines, &line_det));
        assert_eq!(sc.state(), SpeedControllerState::WaitingToStop);
    }
}
