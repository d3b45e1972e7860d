//! Mock intake generator.
//!
//! Stands in for the bottle when there is no hardware: every period it adds a
//! random sip to the running total and emits the new cumulative reading on
//! the same event queue the device link uses.

use crate::config::MockConfig;
use crate::{IntakeEvent, IntakeReading, IntakeSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Running total plus the sip distribution
#[derive(Debug)]
pub struct MockStepper {
    total: u32,
    delta: RangeInclusive<u32>,
    rng: StdRng,
}

impl MockStepper {
    pub fn new(start_total: u32, delta: RangeInclusive<u32>, rng: StdRng) -> Self {
        Self {
            total: start_total,
            delta,
            rng,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Add one sip and return the new cumulative total
    pub fn step(&mut self) -> u32 {
        let sip = self.rng.gen_range(self.delta.clone());
        self.total = self.total.saturating_add(sip);
        self.total
    }
}

/// Toggleable synthetic intake source
pub struct MockGenerator {
    period: Duration,
    delta: RangeInclusive<u32>,
    seed: Option<u64>,
    next_run: u64,
    active: Option<(u64, JoinHandle<()>)>,
}

impl MockGenerator {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            period: config.period(),
            delta: config.delta_range(),
            seed: None,
            next_run: 1,
            active: None,
        }
    }

    /// Override the tick period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Make the sip sequence reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the running generator, if any
    pub fn run_id(&self) -> Option<u64> {
        self.active.as_ref().map(|(run, _)| *run)
    }

    /// Start ticking from `start_total`. Returns false if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, start_total: u32, events: UnboundedSender<IntakeEvent>) -> bool {
        if self.is_active() {
            return false;
        }

        let run = self.next_run;
        self.next_run += 1;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(run)),
            None => StdRng::from_entropy(),
        };
        let stepper = MockStepper::new(start_total, self.delta.clone(), rng);

        tracing::info!(
            "Mock intake started at {} ml, one sip every {:?}",
            start_total,
            self.period
        );
        let handle = tokio::spawn(run_ticks(run, self.period, stepper, events));
        self.active = Some((run, handle));
        true
    }

    /// Stop ticking immediately. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some((run, handle)) => {
                handle.abort();
                tracing::info!("Mock intake stopped (run {})", run);
                true
            }
            None => false,
        }
    }
}

impl Drop for MockGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticks(
    run: u64,
    period: Duration,
    mut stepper: MockStepper,
    events: UnboundedSender<IntakeEvent>,
) {
    // First sip one full period after activation
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let total = stepper.step();
        tracing::debug!("Mock sip, total now {} ml", total);
        let event = IntakeEvent::Reading {
            source: IntakeSource::Mock(run),
            reading: IntakeReading::now(total),
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_step_stays_in_range() {
        let mut stepper = MockStepper::new(1000, 15..=59, StdRng::seed_from_u64(7));
        let mut previous = stepper.total();
        for _ in 0..500 {
            let total = stepper.step();
            let sip = total - previous;
            assert!((15..=59).contains(&sip), "sip {} out of range", sip);
            previous = total;
        }
    }

    #[test]
    fn test_step_saturates() {
        let mut stepper = MockStepper::new(u32::MAX - 10, 15..=59, StdRng::seed_from_u64(1));
        assert_eq!(stepper.step(), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_continue_from_start_total() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut generator = MockGenerator::new(&MockConfig::default()).with_seed(42);

        assert!(generator.start(500, tx.clone()));
        assert!(!generator.start(0, tx));

        let mut previous = 500;
        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                IntakeEvent::Reading { source, reading } => {
                    assert_eq!(source, IntakeSource::Mock(1));
                    assert!(reading.intake_ml >= previous + 15);
                    assert!(reading.intake_ml <= previous + 59);
                    previous = reading.intake_ml;
                }
                other => panic!("Unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut generator = MockGenerator::new(&MockConfig::default());
        generator.start(0, tx);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_emission() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut generator = MockGenerator::new(&MockConfig::default());
        generator.start(0, tx);
        assert_eq!(generator.run_id(), Some(1));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(generator.stop());
        assert!(!generator.stop());
        assert!(!generator.is_active());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
