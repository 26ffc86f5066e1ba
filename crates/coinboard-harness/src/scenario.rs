//! Scenario runner.
//!
//! Bundles a [`Runtime`] over a [`SimDriver`] with the invariant registry
//! and steps it synchronously: every queued event is handled, timers run,
//! and invariants are checked after each event.

use std::time::Duration;

use coinboard_chat::ChatConfig;
use coinboard_client::{DriverEvent, Runtime, RuntimeError};
use coinboard_core::SessionConfig;

use crate::{
    invariants::{InvariantRegistry, SystemSnapshot},
    sim_driver::{SimDriver, SimDriverError},
    sim_env::SimEnv,
    sim_server::SimServer,
};

/// Upper bound on events handled by one [`Simulation::settle`].
pub const MAX_SETTLE_EVENTS: usize = 10_000;

/// Result type of simulation steps.
pub type SimResult<T> = Result<T, RuntimeError<SimDriverError>>;

/// A runtime wired to a simulated broker on a virtual clock.
pub struct Simulation {
    runtime: Runtime<SimDriver>,
    driver: SimDriver,
    invariants: InvariantRegistry,
}

impl Simulation {
    /// Runtime over `server` with the standard invariants.
    pub fn new(server: SimServer, session: SessionConfig, chat: ChatConfig) -> Self {
        let driver = SimDriver::with_server(SimEnv::new(), server);
        Self::with_driver(driver, session, chat)
    }

    /// Runtime over an existing driver.
    pub fn with_driver(driver: SimDriver, session: SessionConfig, chat: ChatConfig) -> Self {
        let runtime = Runtime::new(driver.clone(), session, chat);
        Self { runtime, driver, invariants: InvariantRegistry::standard() }
    }

    /// Replace the invariant registry.
    #[must_use]
    pub fn with_invariants(mut self, invariants: InvariantRegistry) -> Self {
        self.invariants = invariants;
        self
    }

    /// The runtime.
    pub fn runtime(&self) -> &Runtime<SimDriver> {
        &self.runtime
    }

    /// The runtime, mutably.
    pub fn runtime_mut(&mut self) -> &mut Runtime<SimDriver> {
        &mut self.runtime
    }

    /// Test-side driver handle.
    pub fn driver(&self) -> &SimDriver {
        &self.driver
    }

    /// The virtual clock.
    pub fn env(&self) -> &SimEnv {
        self.driver.env()
    }

    /// Start the runtime and settle.
    pub fn start(&mut self) -> SimResult<usize> {
        self.runtime.start()?;
        self.settle()
    }

    /// Queue `event` and settle.
    pub fn send(&mut self, event: DriverEvent) -> SimResult<usize> {
        self.driver.inject(event);
        self.settle()
    }

    /// Handle queued events until none remain, running timers after each.
    ///
    /// Returns the number of events handled.
    pub fn settle(&mut self) -> SimResult<usize> {
        let mut handled = 0;
        while handled < MAX_SETTLE_EVENTS {
            let Some(event) = self.driver.take_event() else {
                break;
            };
            tracing::trace!(?event, "sim event");
            self.runtime.handle_event(event)?;
            self.runtime.tick()?;
            handled += 1;
            self.check(&format!("after event {handled}"));
        }
        Ok(handled)
    }

    /// Move the clock forward, run timers, and settle.
    pub fn advance(&mut self, by: Duration) -> SimResult<usize> {
        self.env().advance(by);
        self.runtime.tick()?;
        self.check("after tick");
        self.settle()
    }

    /// Advance in `step` increments until `total` has elapsed.
    pub fn advance_by_steps(&mut self, total: Duration, step: Duration) -> SimResult<usize> {
        let mut handled = 0;
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            handled += self.advance(step)?;
            elapsed += step;
        }
        Ok(handled)
    }

    /// Current observable state.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::capture(&self.runtime)
    }

    /// Assert every invariant.
    pub fn check(&self, context: &str) {
        self.invariants.assert_all(&self.snapshot(), context);
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation").field("runtime", &self.runtime).finish_non_exhaustive()
    }
}
