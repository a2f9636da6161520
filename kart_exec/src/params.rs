//! Parameters of the kart executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::{
    can_ctrl::SimSpeedParams,
    lane_assist::LaneAssistParams,
    line_det::LineDetParams,
    path_follow::PathFollowParams,
    path_gen::PathGenParams,
    speed_ctrl::SpeedCtrlParams,
    stop_line_assist::StopLineAssistParams
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// All parameters of the kart, loaded once at start up from a single file and
/// passed by reference into each module's constructor.
#[derive(Deserialize, Debug, Clone)]
pub struct KartExecParams {
    pub line_det: LineDetParams,

    pub path_gen: PathGenParams,

    pub path_follow: PathFollowParams,

    pub speed_ctrl: SpeedCtrlParams,

    pub stop_line_assist: StopLineAssistParams,

    pub lane_assist: LaneAssistParams,

    /// Speed response of the simulated kart, used when replaying frames
    pub sim_speed: SimSpeedParams
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        can_ctrl::sim::test::test_sim_params,
        line_det::test::test_params,
        path_follow::test::test_follow_params,
        path_gen::test::test_path_params,
        speed_ctrl::test::test_speed_params,
        stop_line_assist::test::test_assist_params,
        lane_assist::SpeedPolicy
    };

    pub(crate) fn test_kart_params() -> KartExecParams {
        KartExecParams {
            line_det: test_params(),
            path_gen: test_path_params(),
            path_follow: test_follow_params(),
            speed_ctrl: test_speed_params(),
            stop_line_assist: test_assist_params(5.0),
            lane_assist: LaneAssistParams {
                speed_policy: SpeedPolicy::Constant { speed_kmh: 10.0 },
                archive_reports: false
            },
            sim_speed: test_sim_params()
        }
    }

    /// The parameter file shipped with the software must load.
    #[test]
    fn test_load_shipped_params() {
        let params: KartExecParams = util::params::from_str(
            include_str!("../../params/kart_exec.toml")
        ).unwrap();

        assert!(params.path_gen.smoothing_window % 2 == 1);
        assert!(params.speed_ctrl.braking.min_force <= params.speed_ctrl.braking.max_force);
        assert!(params.stop_line_assist.stop_line.min_length_m
            < params.stop_line_assist.stop_line.max_length_m);
        assert!(params.sim_speed.feedback_period_ms > 0);
    }
}
