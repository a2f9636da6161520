//! Main kart-side executable entry point.
//!
//! # Architecture
//!
//! The executable replays a directory of top-down frames through the lane
//! assist, against a simulated CAN bus:
//!
//!     - Initialise the session and logging
//!     - Load the kart parameters and the calibration
//!     - Start the CAN feedback thread, the simulated speed sensor and the
//!       speed controller, engaging drive
//!     - Run the lane assist until the frames are exhausted
//!
//! # Usage
//!
//!     kart_exec [--threaded] [--params FILE] <frames_dir>

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::{
    path::PathBuf,
    sync::{Arc, atomic::{AtomicBool, Ordering}, mpsc}
};
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::info;
use structopt::StructOpt;

// Internal
use kart_lib::{
    calib::{Calibration, ImageDirSource},
    can_ctrl::{SimCanController, SimSpeedModel},
    lane_assist::LaneAssist,
    params::KartExecParams,
    speed_ctrl::SpeedCtrl
};
use comms_if::eqpt::can::CanMessage;
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::Session
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "kart_exec", about = "Replay top-down frames through the lane assist")]
struct Args {
    /// Run the lane assist on its own thread
    #[structopt(long)]
    threaded: bool,

    /// Parameter file to use instead of the kart_exec.toml in the params
    /// directory
    #[structopt(long, parse(from_os_str))]
    params: Option<PathBuf>,

    /// Directory of top-down PNG frames
    #[structopt(parse(from_os_str))]
    frames_dir: PathBuf
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    let args = Args::from_args();

    let session = Session::new(
        "kart_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Kart Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: KartExecParams = match args.params {
        Some(ref path) => util::params::load_from_path(path),
        None => util::params::load("kart_exec.toml")
    }.wrap_err("Could not load kart params")?;

    let calib: Calibration = util::params::load("calibration.toml")
        .wrap_err("Could not load the calibration")?;
    let calib = Arc::new(calib);

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let can = Arc::new(SimCanController::new());

    // The feedback thread exits once the speed model stops and drops its
    // sender
    let (feedback_tx, feedback_rx) = mpsc::channel::<CanMessage>();
    let feedback_thread = can.spawn_feedback_thread(feedback_rx);

    let sim_running = Arc::new(AtomicBool::new(true));
    let speed_model_thread = can.spawn_speed_model(
        SimSpeedModel::new(&params.sim_speed),
        feedback_tx,
        sim_running.clone()
    );

    let speed_ctrl = Arc::new(SpeedCtrl::new(&params.speed_ctrl, can.clone()));
    speed_ctrl.start_driving();

    let mut lane_assist = LaneAssist::new(
        &params, calib.clone(), speed_ctrl.clone(), can.clone()
    );

    if params.lane_assist.archive_reports {
        lane_assist.set_archiver(
            Archiver::from_path(&session, "lane_assist/frame_reports.csv")
                .wrap_err("Could not create the frame report archive")?
        );
    }

    let mut source = ImageDirSource::new(&args.frames_dir, calib.output_shape)
        .wrap_err_with(|| format!("Could not open frames in {:?}", args.frames_dir))?;
    info!("Replaying {} frames from {:?}", source.len(), args.frames_dir);

    // ---- MAIN LOOP ----

    let result = match args.threaded {
        true => lane_assist.spawn(Box::new(source))
            .join()
            .map_err(|_| eyre!("The lane assist thread panicked"))?,
        false => lane_assist.run(&mut source)
    };
    let num_frames = result.wrap_err("Lane assist failed")?;

    // ---- SHUTDOWN ----

    sim_running.store(false, Ordering::SeqCst);
    speed_model_thread.join()
        .map_err(|_| eyre!("The speed model thread panicked"))?;
    feedback_thread.join()
        .map_err(|_| eyre!("The CAN feedback thread panicked"))?;

    let dems = can.dems();
    info!("Processed {} frames", num_frames);
    info!("Final demands: {:?}", dems);
    info!("Final speed controller status: {:?}", speed_ctrl.status());

    Ok(())
}
