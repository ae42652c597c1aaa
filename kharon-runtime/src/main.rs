//! `runtime <config.toml>`: parses the DAG's configuration, connects every
//! producer, wires stages into a `kharon_core::scheduler::Scheduler`, and
//! runs until a shutdown signal arrives. Grounded on `braid-run`'s
//! CLI/config-then-launch shape, adapted from braid's async/tokio startup
//! to this runtime's thread-per-stage model.

mod config;

use std::net::TcpStream;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use kharon_attitude::{AttitudeStage, Declination, Producer as AttitudeProducer};
use kharon_core::queue::Queue;
use kharon_core::scheduler::Scheduler;
use kharon_core::TimeBase;
use kharon_gps::GpsReceiver;
use kharon_imu::ImuReceiver;
use kharon_vision::{CameraReceiver, FrameSync, OpticalUp, PassThrough};

use config::RuntimeConfig;

const QUEUE_CAPACITY: usize = 512;
const FRAME_NODE_ARENA_CAPACITY: usize = 64;

/// Read timeout on every device socket, well under
/// `kharon_core::scheduler::SHUTDOWN_GRACE` so a stage parked in a
/// blocking read still notices the DONE bit promptly.
const SOCKET_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct RuntimeCliArgs {
    /// Path to the runtime's TOML configuration file.
    config_file: std::path::PathBuf,
}

fn load_config(path: &std::path::Path) -> Result<RuntimeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn connect(name: &str, addr: std::net::SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).with_context(|| format!("connecting to {name} at {addr}"))?;
    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(SOCKET_READ_TIMEOUT))
        .with_context(|| format!("setting read timeout on {name}"))?;
    Ok(stream)
}

fn run(cfg: RuntimeConfig) -> Result<()> {
    // Fail before opening any sockets; `AttitudeStage::pre_run` enforces the
    // same requirement again once the stage is actually wired up.
    if !cfg.imu.iter().any(|i| matches!(i.gyr_priority, config::PriorityCfg::P1))
        || !cfg.imu.iter().any(|i| matches!(i.acc_priority, config::PriorityCfg::P1))
        || !cfg.imu.iter().any(|i| matches!(i.mag_priority, config::PriorityCfg::P1))
    {
        anyhow::bail!("configuration requires a P1 producer for gyro, acc, and mag");
    }

    let mut scheduler = Scheduler::new();
    let declination = Arc::new(Declination::new(cfg.declination_deg));
    let time_base = Arc::new(TimeBase::new());
    let stage_count = total_stage_count(&cfg);

    let mut attitude_producers = Vec::new();
    for imu in &cfg.imu {
        let stream = connect(&imu.name, imu.addr)?;
        let queue = Arc::new(Queue::new(QUEUE_CAPACITY, 1));
        attitude_producers.push(AttitudeProducer { queue: queue.clone(), priorities: imu.device_config().priority });
        let stage = ImuReceiver::new(imu.name.clone(), Box::new(stream), imu.device_config(), queue);
        scheduler.spawn(stage, stage_count);
    }

    let attitude_out: Arc<Queue<kharon_attitude::AttitudeRecord>> = Arc::new(Queue::new(QUEUE_CAPACITY, 1));
    {
        let tb = time_base.clone();
        let now = Arc::new(move || tb.now());
        let stage = AttitudeStage::new("attitude", attitude_producers, declination.clone(), attitude_out.clone(), now);
        scheduler.spawn(stage, stage_count);
    }

    for gps in &cfg.gps {
        let stream = connect(&gps.name, gps.addr)?;
        let queue = Arc::new(Queue::new(QUEUE_CAPACITY, 1));
        let stage = GpsReceiver::new(gps.name.clone(), Box::new(stream), queue);
        scheduler.spawn(stage, stage_count);
    }

    let mut optical_up_queues = Vec::new();
    for cam in &cfg.camera {
        let stream = connect(&cam.name, cam.addr)?;
        let frame_queue = Arc::new(Queue::new(QUEUE_CAPACITY, 1));
        let camera_stage = CameraReceiver::new(cam.name.clone(), cam.cam_num, stream, frame_queue.clone());
        scheduler.spawn(camera_stage, stage_count);

        let optical_out = Arc::new(Queue::new(QUEUE_CAPACITY, 1));
        optical_up_queues.push(optical_out.clone());
        let optical_stage = OpticalUp::new(
            format!("optical_up_{}", cam.cam_num),
            cam.cam_num,
            frame_queue,
            attitude_out.clone(),
            PassThrough,
            optical_out,
        );
        scheduler.spawn(optical_stage, stage_count);
    }

    if !cfg.camera.is_empty() {
        let frame_set_out = Arc::new(Queue::new(QUEUE_CAPACITY, 1));
        let stage = FrameSync::new(
            "frame_sync",
            optical_up_queues,
            FRAME_NODE_ARENA_CAPACITY,
            cfg.frame_interval_sec,
            frame_set_out,
        );
        scheduler.spawn(stage, stage_count);
    }

    scheduler.launch();
    info!("all stages launched, running until shutdown signal");
    wait_for_shutdown_signal();
    scheduler.shutdown();
    Ok(())
}

/// Stage count the scheduler's barrier must be sized for: one per imu,
/// one for attitude, one per gps, two per camera (receiver + optical-up),
/// and one shared frame-sync stage if any camera is configured.
fn total_stage_count(cfg: &RuntimeConfig) -> usize {
    cfg.imu.len() + 1 + cfg.gps.len() + cfg.camera.len() * 2 + if cfg.camera.is_empty() { 0 } else { 1 }
}

fn wait_for_shutdown_signal() {
    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("failed to install ctrl-c handler");
    let _ = rx.recv();
}

fn main() -> Result<()> {
    let _logging_guard = kharon_core::logging::init();
    let args = RuntimeCliArgs::parse();
    let cfg = match load_config(&args.config_file) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(1);
        }
    };
    run(cfg)
}
