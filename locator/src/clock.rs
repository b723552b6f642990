use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use prelude::*;

/// Source of measurement arrival times in seconds.
pub trait Clock {
    fn now(&self) -> float;
}

/// Wall-clock time since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> float {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        }
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    t: Arc<Mutex<float>>,
}

impl ManualClock {
    pub fn new(t: float) -> ManualClock {
        ManualClock {
            t: Arc::new(Mutex::new(t)),
        }
    }

    pub fn set(&self, t: float) {
        *self.t.lock().unwrap_or_else(PoisonError::into_inner) = t;
    }

    pub fn advance(&self, dt: float) {
        *self.t.lock().unwrap_or_else(PoisonError::into_inner) += dt;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> float {
        *self.t.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
