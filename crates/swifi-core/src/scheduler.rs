//! Countdown scheduler deciding when the next fault fires.
//!
//! The scheduler counts down fault site evaluations. When the countdown runs out
//! a fault fires and a new countdown is drawn uniformly from
//! `[0, max_fault_interval)`. A negative countdown disables injection for the
//! rest of the run.

use crate::corrupt::FaultClass;
use log::{debug, trace};
use rand::Rng;
use serde::Serialize;

/// Process-wide scheduling state of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scheduler {
    countdown: i64,
    max_fault_interval: i64,
    inject_once_data: bool,
    inject_once_address: bool,
}

impl Scheduler {
    /// Creates a scheduler that has not been armed yet.
    ///
    /// The countdown starts negative, so nothing is injected until
    /// [`Scheduler::arm`] is called.
    pub fn new(max_fault_interval: i64) -> Self {
        Self {
            countdown: -1,
            max_fault_interval,
            inject_once_data: false,
            inject_once_address: false,
        }
    }

    /// Sets the first countdown.
    ///
    /// An explicit `initial` countdown is taken as is, including negative values
    /// which disable injection. Without one, the countdown is drawn like after an
    /// injection.
    pub fn arm<R: Rng + ?Sized>(&mut self, initial: Option<i64>, rng: &mut R) {
        match initial {
            Some(countdown) => self.countdown = countdown,
            None => self.draw(rng),
        }
        debug!("Next fault countdown: {}", self.countdown);
    }

    /// Remaining fault site evaluations before the next fault.
    pub fn countdown(&self) -> i64 {
        self.countdown
    }

    /// Mean interval the countdowns are drawn from.
    pub fn max_fault_interval(&self) -> i64 {
        self.max_fault_interval
    }

    /// Whether injection is disabled for the rest of the run.
    pub fn is_disabled(&self) -> bool {
        self.countdown < 0
    }

    /// Puts a fault class into inject-once mode.
    pub fn set_inject_once(&mut self, class: FaultClass) {
        match class {
            FaultClass::Data => self.inject_once_data = true,
            FaultClass::Address => self.inject_once_address = true,
        }
    }

    /// Whether a fault class is in inject-once mode.
    pub fn inject_once(&self, class: FaultClass) -> bool {
        match class {
            FaultClass::Data => self.inject_once_data,
            FaultClass::Address => self.inject_once_address,
        }
    }

    /// Evaluates one fault site.
    ///
    /// Decrements the countdown and reports whether the fault fires at this
    /// site. Firing reseeds the countdown.
    pub fn should_inject<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.countdown < 0 {
            return false;
        }
        self.countdown -= 1;
        if self.countdown <= 0 {
            self.reseed(rng);
            true
        } else {
            false
        }
    }

    /// Draws the countdown for the next fault.
    ///
    /// Once any class is in inject-once mode no further fault is scheduled.
    pub fn reseed<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.inject_once_data || self.inject_once_address {
            trace!("Inject-once mode active, disabling further injection");
            self.countdown = -1;
        } else {
            self.draw(rng);
        }
    }

    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.countdown = if self.max_fault_interval > 0 {
            rng.random_range(0..self.max_fault_interval)
        } else {
            -1
        };
    }

    /// Advances the countdown past `sites` evaluations known not to fire.
    pub(crate) fn skip(&mut self, sites: u32) {
        if self.countdown >= 0 {
            self.countdown -= sites as i64;
        }
    }
}
