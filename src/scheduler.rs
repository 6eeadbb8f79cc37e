//! One-second countdown aligned to the wall clock's step boundaries.
//!
//! The remaining time is recomputed from the clock on every tick, never
//! decremented, so a throttled or suspended runtime reports the true value on
//! its next tick. A boundary is reported once per step: on the first tick that
//! observes a new step window.

use std::{rc::Rc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{clock::Clock, totp::remaining_in_step};

const TICK: Duration = Duration::from_secs(1);

/// At most one armed timer; `start` always disarms the previous one first.
///
/// Must be used from within a [`tokio::task::LocalSet`].
pub struct CountdownScheduler {
    clock: Rc<dyn Clock>,
    step: u64,
    timer: Option<JoinHandle<()>>,
}

impl CountdownScheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            step: 0,
            timer: None,
        }
    }

    /// Reports the remaining seconds right away, then every second.
    ///
    /// `on_boundary` runs after `on_tick` on the tick where the step rolls over.
    pub fn start<T, B>(&mut self, step_seconds: u64, on_tick: T, on_boundary: B)
    where
        T: Fn(u64) + 'static,
        B: Fn() + 'static,
    {
        self.stop();

        let step = step_seconds.max(1);
        let now = self.clock.now();
        let remaining = remaining_in_step(step, now);
        on_tick(remaining);

        let clock = Rc::clone(&self.clock);
        let mut window = now / step;
        let timer = tokio::task::spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let now = clock.now();
                let remaining = remaining_in_step(step, now);
                tracing::trace!(remaining, "Countdown tick");
                on_tick(remaining);

                if now / step != window {
                    window = now / step;
                    tracing::debug!(step, "Step boundary reached");
                    on_boundary();
                }
            }
        });

        self.step = step;
        self.timer = Some(timer);
        tracing::debug!(step, remaining, "Countdown armed");
    }

    /// Disarms the timer; does nothing when already stopped.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            tracing::debug!(step = self.step, "Countdown stopped");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// The step of the armed timer.
    pub fn step(&self) -> Option<u64> {
        self.timer.as_ref().map(|_| self.step)
    }
}

impl Drop for CountdownScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
