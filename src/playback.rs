//! Playback controller.
//!
//! [`Player`] drives a [`Simulation`] under user commands. It owns no timer:
//! the host passes the current time to [`Player::play`] and [`Player::tick`]
//! and asks [`Player::next_deadline`] when to call back.

use std::time::Duration;

use log::{info, warn};

use crate::{
    config::PlaybackConfig,
    error::ConfigError,
    sim::{LineCounts, PseudocodeLines, RunConfig, Simulation, Step},
    stats::RunStats,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    /// Simulation built, nothing emitted yet.
    Idle,
    Running,
    Paused,
    Finished,
}

pub struct Player {
    config: RunConfig,
    lines: Box<dyn LineCounts>,
    simulation: Simulation,
    playback: PlaybackConfig,
    state: PlayerState,
    deadline: Option<Duration>,
    history: Vec<Step>,
}

impl Player {
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        Self::with_lines(config, Box::new(PseudocodeLines))
    }

    pub fn with_lines(config: RunConfig, lines: Box<dyn LineCounts>) -> Result<Self, ConfigError> {
        let simulation = Simulation::with_lines(config.clone(), lines.as_ref())?;
        Ok(Player {
            config,
            lines,
            simulation,
            playback: PlaybackConfig::default(),
            state: PlayerState::Idle,
            deadline: None,
            history: Vec::new(),
        })
    }

    /// Replaces the run. An invalid config leaves the current run untouched.
    pub fn configure(&mut self, config: RunConfig) -> Result<(), ConfigError> {
        let simulation = Simulation::with_lines(config.clone(), self.lines.as_ref())?;
        info!(
            "player configured: {:?} {:?} over {} points",
            config.method,
            config.operation,
            config.dataset.len()
        );
        self.config = config;
        self.reset(simulation);
        Ok(())
    }

    /// Discards the current run and starts over from the stored config.
    pub fn restart(&mut self) {
        match Simulation::with_lines(self.config.clone(), self.lines.as_ref()) {
            Ok(simulation) => {
                info!("player restarted after {} steps", self.history.len());
                self.reset(simulation);
            }
            Err(err) => {
                // The stored config was accepted once; builds are deterministic.
                warn!("player restart failed: {err}");
                self.finish();
            }
        }
    }

    fn reset(&mut self, simulation: Simulation) {
        self.simulation = simulation;
        self.history.clear();
        self.deadline = None;
        self.state = PlayerState::Idle;
    }

    /// Starts automatic playback. The first step is due one delay after `now`.
    pub fn play(&mut self, now: Duration) {
        if matches!(self.state, PlayerState::Idle | PlayerState::Paused) {
            self.state = PlayerState::Running;
            self.deadline = Some(now.saturating_add(self.playback.delay()));
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlayerState::Running {
            self.state = PlayerState::Paused;
            self.deadline = None;
        }
    }

    /// Emits exactly one step and pauses. Does nothing once finished.
    pub fn advance(&mut self) -> Option<&Step> {
        if self.state == PlayerState::Finished {
            return None;
        }
        self.state = PlayerState::Paused;
        self.deadline = None;
        if self.step_once() {
            self.history.last()
        } else {
            None
        }
    }

    /// Timer callback. Emits a step if playback is running and the deadline
    /// has passed, then schedules the next one.
    pub fn tick(&mut self, now: Duration) -> bool {
        if self.state != PlayerState::Running {
            return false;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return false,
        }
        let emitted = self.step_once();
        if self.state == PlayerState::Running {
            self.deadline = Some(now.saturating_add(self.playback.delay()));
        }
        emitted
    }

    /// Changes the delay between automatic steps. A pending deadline keeps
    /// its time; the new delay applies from the next step on.
    pub fn set_speed(&mut self, delay: Duration) {
        self.playback.set_delay(delay);
    }

    fn step_once(&mut self) -> bool {
        match self.simulation.next_step() {
            Some(step) => {
                self.history.push(step);
                if self.simulation.is_finished() {
                    self.finish();
                }
                true
            }
            None => {
                self.finish();
                false
            }
        }
    }

    fn finish(&mut self) {
        self.state = PlayerState::Finished;
        self.deadline = None;
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.history.last()
    }

    #[must_use]
    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Every step emitted since the last restart.
    #[must_use]
    pub fn history(&self) -> &[Step] {
        &self.history
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.playback.delay()
    }

    #[must_use]
    pub fn stats(&self) -> RunStats {
        self.simulation.stats()
    }
}
