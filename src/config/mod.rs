//! Configuration: file-backed settings and the per-run configuration value

pub mod settings;

pub use settings::Settings;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How aggressively a namespace is remediated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Trust the namespace controller's own diagnosis before touching resources
    #[default]
    Standard,
    /// Proactively strip and delete everything in the namespace
    Force,
}

impl Mode {
    pub fn is_force(self) -> bool {
        self == Mode::Force
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Standard => f.write_str("standard"),
            Mode::Force => f.write_str("force"),
        }
    }
}

/// Fixed-interval, bounded polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub polls: u32,
}

impl PollSchedule {
    pub fn new(interval: Duration, polls: u32) -> Self {
        Self { interval, polls }
    }

    /// Polls needed to cover `timeout` at `interval`, at least one
    pub fn covering(timeout: Duration, interval: Duration) -> Self {
        let polls = if interval.is_zero() {
            1
        } else {
            let polls = (timeout.as_nanos() / interval.as_nanos()).max(1);
            u32::try_from(polls).unwrap_or(u32::MAX)
        };
        Self { interval, polls }
    }

    pub fn total(&self) -> Duration {
        self.interval.saturating_mul(self.polls)
    }
}

/// Every wait and settle pause used by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub standard_wait: PollSchedule,
    pub force_wait: PollSchedule,
    pub initial_delete_wait: PollSchedule,
    pub application_wait: PollSchedule,
    pub application_settle: Duration,
    pub pod_settle: Duration,
    pub cleanup_settle: Duration,
    pub provider_settle: Duration,
}

impl Timings {
    pub fn from_settings(t: &settings::Timeouts) -> Self {
        let poll = Duration::from_secs(t.poll_interval_secs);
        Self {
            standard_wait: PollSchedule::new(poll, t.standard_wait_polls),
            force_wait: PollSchedule::new(poll, t.force_wait_polls),
            initial_delete_wait: PollSchedule::new(poll, t.initial_delete_wait_polls),
            application_wait: PollSchedule::covering(
                Duration::from_secs(t.application_delete_timeout_secs),
                Duration::from_secs(t.application_poll_interval_secs),
            ),
            application_settle: Duration::from_secs(t.application_settle_secs),
            pod_settle: Duration::from_secs(t.pod_settle_secs),
            cleanup_settle: Duration::from_secs(t.cleanup_settle_secs),
            provider_settle: Duration::from_secs(t.provider_settle_secs),
        }
    }

    /// No waiting at all; polls still happen the configured number of times
    pub fn immediate() -> Self {
        let schedule = |polls| PollSchedule::new(Duration::ZERO, polls);
        Self {
            standard_wait: schedule(15),
            force_wait: schedule(30),
            initial_delete_wait: schedule(5),
            application_wait: schedule(30),
            application_settle: Duration::ZERO,
            pod_settle: Duration::ZERO,
            cleanup_settle: Duration::ZERO,
            provider_settle: Duration::ZERO,
        }
    }

    pub fn convergence(&self, mode: Mode) -> PollSchedule {
        match mode {
            Mode::Standard => self.standard_wait,
            Mode::Force => self.force_wait,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_settings(&settings::Timeouts::default())
    }
}

/// Everything one invocation needs, built once at startup
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub kubeconfig: Option<PathBuf>,
    pub mode: Mode,
    pub diagnose_only: bool,
    /// Detect and remove webhooks that block deletes
    pub bypass_webhooks: bool,
    /// Escalate finalizer removal to raw API writes through kubectl
    pub force_api_direct: bool,
    pub assume_yes: bool,
    pub confirm_destructive: bool,
    pub auto_remove_webhooks: bool,
    pub show_progress: bool,
    pub extra_webhook_name_patterns: Vec<String>,
    pub timings: Timings,
}

impl RunConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            kubeconfig: None,
            mode: Mode::Standard,
            diagnose_only: false,
            bypass_webhooks: false,
            force_api_direct: false,
            assume_yes: false,
            confirm_destructive: settings.behavior.confirm_destructive,
            auto_remove_webhooks: settings.behavior.auto_remove_webhooks,
            show_progress: settings.behavior.show_progress,
            extra_webhook_name_patterns: settings.providers.extra_webhook_name_patterns.clone(),
            timings: Timings::from_settings(&settings.timeouts),
        }
    }

    /// Configuration for tests: no sleeps, no prompts, no spinners
    pub fn immediate(mode: Mode) -> Self {
        Self {
            mode,
            timings: Timings::immediate(),
            ..Default::default()
        }
    }
}
