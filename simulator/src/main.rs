// Drives a RobotLocator with a simulated robot and reports how far the
// estimate strays from ground truth.
#![allow(non_snake_case)]

extern crate config;
extern crate env_logger;
extern crate geodesy;
extern crate locator;
#[macro_use]
extern crate log;
extern crate prelude;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate stats;
extern crate toml;

mod settings;
mod simulation_model;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::fs::File;
use std::io;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use config::{ConfigError, LocatorConfig, NoiseParams};
use geodesy::GeoPoint;
use locator::{ManualClock, Pose, RobotLocator};
use prelude::*;

use settings::SimulatorConfig;
use simulation_model::SimulatedRobot;

fn main() {
    env_logger::init();

    let sim_config = match SimulatorConfig::load() {
        Ok(config) => config,
        Err(ConfigError::Io(ref e)) if e.kind() == io::ErrorKind::NotFound => {
            info!("{} not found, using defaults", settings::CONFIG_FILE);
            SimulatorConfig::default()
        }
        Err(e) => {
            error!("unable to load {}: {}", settings::CONFIG_FILE, e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&sim_config) {
        error!("simulation failed: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_flame() {
        warn!("unable to write flame graph: {}", e);
    }
}

fn run(sim_config: &SimulatorConfig) -> Result<(), Box<dyn Error>> {
    let mut locator_config = match LocatorConfig::load(&sim_config.locator_config) {
        Ok(config) => config,
        Err(ConfigError::Io(ref e)) if e.kind() == io::ErrorKind::NotFound => {
            LocatorConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    let reference = match locator_config.reference {
        Some(reference) => reference,
        None => {
            let reference = GeoPoint::new(51.983159, 7.434212);
            warn!("no reference point configured, using {:?}", reference);
            locator_config.reference = Some(reference);
            reference
        }
    };
    locator_config.noise = NoiseParams::load(&sim_config.noise_file)?;

    let clock = ManualClock::new(0.0);
    let mut locator = RobotLocator::new(&locator_config, clock.clone());
    locator.reset(0.0, 0.0, 0.0);

    if let Some(noise) = sim_config.noise_override {
        if locator.set_noise(noise) {
            noise.save(&sim_config.noise_file)?;
            info!("saved noise parameters to {}", sim_config.noise_file);
        }
    }

    let mut rng = StdRng::seed_from_u64(sim_config.seed);
    let mut robot = SimulatedRobot::new(Pose::default());

    let dt = sim_config.dt;
    let dt_duration = Duration::from_secs_f64(dt);
    let n_steps = (sim_config.t / dt) as usize;
    let mut next_odometry = sim_config.odometry.period;
    let mut next_gnss = sim_config.gnss.period;

    let mut position_error = stats::OnlineStats::new();
    let mut heading_error = stats::OnlineStats::new();

    for i in 0..n_steps {
        let _guard = flame::start_guard("simulation step");
        let step_start = Instant::now();

        let t = (i + 1) as float * dt;
        robot.step(dt, sim_config);
        clock.set(t);

        if t >= next_odometry {
            next_odometry += sim_config.odometry.period;
            let samples = robot.odometry(&mut rng, sim_config);
            locator.on_velocity_batch(&samples);
        }

        if t >= next_gnss {
            next_gnss += sim_config.gnss.period;
            let record = robot.gnss(
                &mut rng,
                &reference,
                &locator_config.antenna_offset,
                sim_config,
            )?;
            locator.on_gnss_fix(&record)?;
        }

        let estimate = locator.pose();
        let truth = robot.pose;
        let error = (estimate.x - truth.x).hypot(estimate.y - truth.y);
        position_error.add(error);
        heading_error.add(angle(truth.yaw, estimate.yaw).abs());

        debug!("t={:.2} truth={:?} estimate={:?}", t, truth, estimate);

        let step_elapsed = Instant::now() - step_start;
        if sim_config.real_time {
            if let Some(step_remaining) = dt_duration.checked_sub(step_elapsed) {
                thread::sleep(step_remaining);
            } else {
                warn!(
                    "step missed deadline. took {:.1}ms.",
                    step_elapsed.as_secs_f64() * 1e3
                );
            }
        }
    }

    let velocity = locator.velocity();
    info!(
        "final pose {:?}, velocity linear={:.3} angular={:.3}",
        locator.pose(),
        velocity.linear,
        velocity.angular
    );
    println!(
        "position error (mean/m, stdev/m): ({:.4}, {:.4})",
        position_error.mean(),
        position_error.stddev()
    );
    println!(
        "heading error (mean/rad, stdev/rad): ({:.4}, {:.4})",
        heading_error.mean(),
        heading_error.stddev()
    );

    Ok(())
}

fn write_flame() -> io::Result<()> {
    flame::dump_html(&mut File::create("flame-graph.html")?)
}
