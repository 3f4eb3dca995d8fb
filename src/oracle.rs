//! Failure decisions.

use crate::config::{Schedule, SharedConfig};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

/// Seeded generator together with the seed it was built from.
#[derive(Debug)]
struct SeededRng {
    seed: u64,
    rng: StdRng,
}

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// Decides whether a call should fail.
///
/// Samples come from a per-thread generator unless a seed is set, in which
/// case all calls share one seeded generator and the decision sequence is
/// reproducible. A reload that changes `service.seed` restarts the sequence
/// from the new seed.
#[derive(Debug)]
pub struct FailureOracle {
    config: SharedConfig,
    /// Seed that overrides the configured one.
    pinned_seed: Option<u64>,
    seeded: Mutex<Option<SeededRng>>,
}

impl FailureOracle {
    /// Create an oracle reading its probability and seed from `config`.
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            pinned_seed: None,
            seeded: Mutex::new(None),
        }
    }

    /// Create an oracle with an explicit seed, ignoring the configured one.
    pub fn with_seed(config: SharedConfig, seed: u64) -> Self {
        Self {
            config,
            pinned_seed: Some(seed),
            seeded: Mutex::new(Some(SeededRng::new(seed))),
        }
    }

    fn sample(&self) -> f64 {
        let seed = match self.pinned_seed {
            Some(seed) => seed,
            None => match self.config.load().service.seed {
                Some(seed) => seed,
                None => return rand::thread_rng().gen::<f64>(),
            },
        };

        let mut seeded = match self.seeded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match seeded.as_mut() {
            Some(current) if current.seed == seed => current.rng.gen::<f64>(),
            _ => {
                debug!(seed, "Seeding failure decisions");
                let mut fresh = SeededRng::new(seed);
                let sample = fresh.rng.gen::<f64>();
                *seeded = Some(fresh);
                sample
            }
        }
    }

    /// Draw once and return true iff the sample is below `probability`.
    ///
    /// `probability <= 0` never fails and `probability >= 1` always fails.
    pub fn should_fail(&self, probability: f64) -> bool {
        if probability <= 0.0 || probability.is_nan() {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.sample() < probability
    }

    /// Failure probability in the current configuration.
    pub fn current_probability(&self) -> f64 {
        self.config.load().service.fail_probability
    }

    /// Whether failures may be injected right now.
    ///
    /// False when the kill switch is off or no schedule window is open.
    pub fn is_armed(&self) -> bool {
        self.is_armed_at(Utc::now())
    }

    fn is_armed_at(&self, now: DateTime<Utc>) -> bool {
        let config = self.config.load();

        if !config.settings.enabled {
            debug!("Gremlin disabled globally");
            return false;
        }

        if config.safety.schedule.is_empty() {
            return true;
        }

        let armed = config
            .safety
            .schedule
            .iter()
            .any(|schedule| within_schedule(schedule, now));
        if !armed {
            debug!("Outside scheduled gremlin window");
        }
        armed
    }
}

fn within_schedule(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    // Validated on load; an unparsable zone falls back to UTC.
    let tz = schedule.tz().unwrap_or(chrono_tz::UTC);

    let local = now.with_timezone(&tz);
    let time =
        NaiveTime::from_hms_opt(local.hour(), local.minute(), local.second()).unwrap_or_default();

    if !schedule.days.contains(&local.weekday()) {
        return false;
    }

    time >= schedule.start && time <= schedule.end
}
