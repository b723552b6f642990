//! Runs a `RobotLocator` on its own thread so that measurement producers on
//! other threads never touch the filter directly.

use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use config::NoiseParams;
use prelude::*;
use crate::{Clock, GnssRecord, Pose, RobotLocator, Velocity, VelocitySample};

pub enum Event {
    Velocity(Vec<VelocitySample>),
    Gnss(GnssRecord),
    Reset { x: float, y: float, yaw: float },
    SetNoise(NoiseParams),
    Stop,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Estimate {
    pub pose: Pose,
    pub velocity: Velocity,
    /// Incremented whenever `Event::SetNoise` changes the parameters, so the
    /// owner can tell when they need persisting.
    pub noise_revision: u64,
}

pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl Clone for EventSender {
    fn clone(&self) -> Self {
        EventSender {
            tx: self.tx.clone(),
        }
    }
}

impl EventSender {
    /// Fails once the locator thread has stopped.
    pub fn send(&self, event: Event) -> Result<(), ()> {
        self.tx.send(event).map_err(|_| ())
    }
}

pub struct Handle<C: Clock> {
    thread: JoinHandle<RobotLocator<C>>,
    estimate: Arc<Mutex<Estimate>>,
}

impl<C: Clock> Handle<C> {
    /// Most recent estimate published by the locator thread.
    pub fn latest(&self) -> Estimate {
        *self.estimate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the locator thread to finish and returns the locator.
    pub fn join(self) -> thread::Result<RobotLocator<C>> {
        self.thread.join()
    }
}

/// Moves `locator` onto a new thread. Events are applied strictly in the
/// order they are received. The thread exits on `Event::Stop` or once every
/// sender has been dropped.
pub fn spawn<C: Clock + Send + 'static>(locator: RobotLocator<C>) -> (EventSender, Handle<C>) {
    let (tx, rx) = mpsc::channel();
    let estimate = Arc::new(Mutex::new(estimate_of(&locator)));

    let published = estimate.clone();
    let thread = thread::spawn(move || run(locator, rx, published));

    (EventSender { tx }, Handle { thread, estimate })
}

fn run<C: Clock>(
    mut locator: RobotLocator<C>,
    rx: mpsc::Receiver<Event>,
    estimate: Arc<Mutex<Estimate>>,
) -> RobotLocator<C> {
    let mut noise_revision = 0;
    for event in rx.iter() {
        match event {
            Event::Velocity(samples) => locator.on_velocity_batch(&samples),
            Event::Gnss(record) => {
                if let Err(e) = locator.on_gnss_fix(&record) {
                    warn!("dropping gnss fix: {}", e);
                }
            }
            Event::Reset { x, y, yaw } => locator.reset(x, y, yaw),
            Event::SetNoise(noise) => {
                if locator.set_noise(noise) {
                    noise_revision += 1;
                    debug!("noise parameters changed: {:?}", noise);
                }
            }
            Event::Stop => break,
        }

        *estimate.lock().unwrap_or_else(PoisonError::into_inner) = Estimate {
            noise_revision,
            ..estimate_of(&locator)
        };
    }
    locator
}

fn estimate_of<C: Clock>(locator: &RobotLocator<C>) -> Estimate {
    Estimate {
        pose: locator.pose(),
        velocity: locator.velocity(),
        noise_revision: 0,
    }
}
