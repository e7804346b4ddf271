//! Logging and Dispatch Monitoring
//!
//! The crate logs through the `log` facade. [`init_logging`] installs a
//! `tracing-subscriber` formatter on stderr, which also receives `log`
//! records through its log bridge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::LevelFilter;
use tracing_subscriber::filter::LevelFilter as TraceLevel;
use tracing_subscriber::util::SubscriberInitExt;

/// Default time after which a dispatch is reported as slow
pub const DEFAULT_SLOW_DISPATCH: Duration = Duration::from_millis(50);

fn trace_level(level: LevelFilter) -> TraceLevel {
    match level {
        LevelFilter::Off => TraceLevel::OFF,
        LevelFilter::Error => TraceLevel::ERROR,
        LevelFilter::Warn => TraceLevel::WARN,
        LevelFilter::Info => TraceLevel::INFO,
        LevelFilter::Debug => TraceLevel::DEBUG,
        LevelFilter::Trace => TraceLevel::TRACE,
    }
}

/// Install the stderr subscriber at `level`
///
/// Only the first call installs anything; later calls log that a
/// subscriber is already in place and leave it untouched.
pub fn init_logging(level: LevelFilter) {
    let installed = tracing_subscriber::fmt()
        .with_max_level(trace_level(level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish()
        .try_init();

    match installed {
        Ok(()) => log::set_max_level(level),
        Err(err) => log::warn!("Logging already initialised, keeping the existing subscriber: {}", err),
    }
}

/// Parse a level name from configuration, defaulting to `Info`
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    count: usize,
    successes: usize,
    total: Duration,
}

/// Statistics for one command
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchStats {
    pub command: String,
    pub count: usize,
    pub avg_duration: Duration,
    pub success_rate: f64,
}

impl DispatchStats {
    fn from_tally(command: &str, tally: &Tally) -> Self {
        Self {
            command: command.to_string(),
            count: tally.count,
            avg_duration: tally.total / tally.count.max(1) as u32,
            success_rate: tally.successes as f64 / tally.count.max(1) as f64,
        }
    }
}

/// Running dispatch totals per command, shared by every bound handler
#[derive(Debug)]
pub struct DispatchMonitor {
    tallies: Mutex<HashMap<String, Tally>>,
    slow_threshold: Duration,
}

impl Default for DispatchMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_DISPATCH)
    }
}

impl DispatchMonitor {
    /// Monitor that warns about dispatches slower than `slow_threshold`
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            tallies: Mutex::new(HashMap::new()),
            slow_threshold,
        }
    }

    /// Record one dispatch, warning if it was slow
    pub fn record(&self, command: &str, duration: Duration, success: bool) {
        if let Ok(mut tallies) = self.tallies.lock() {
            let tally = tallies.entry(command.to_string()).or_default();
            tally.count += 1;
            tally.total += duration;
            if success {
                tally.successes += 1;
            }
        }

        if duration > self.slow_threshold {
            log::warn!(
                "Command '{}' took {:?} (threshold: {:?})",
                command,
                duration,
                self.slow_threshold
            );
        }
    }

    /// Totals for one command, if it has been dispatched
    pub fn stats(&self, command: &str) -> Option<DispatchStats> {
        let tallies = self.tallies.lock().ok()?;
        tallies
            .get(command)
            .map(|tally| DispatchStats::from_tally(command, tally))
    }

    /// Per-command statistics, sorted by command name
    pub fn summary(&self) -> Vec<DispatchStats> {
        let mut stats: Vec<DispatchStats> = self
            .tallies
            .lock()
            .map(|tallies| {
                tallies
                    .iter()
                    .map(|(command, tally)| DispatchStats::from_tally(command, tally))
                    .collect()
            })
            .unwrap_or_default();
        stats.sort_by(|a, b| a.command.cmp(&b.command));
        stats
    }
}

/// Measures one dispatch and reports it to a monitor
pub struct Timer {
    start: Instant,
    command: String,
    monitor: Option<Arc<DispatchMonitor>>,
}

impl Timer {
    /// Start timing `command`; `None` only measures
    pub fn start(command: &str, monitor: Option<Arc<DispatchMonitor>>) -> Self {
        Self {
            start: Instant::now(),
            command: command.to_string(),
            monitor,
        }
    }

    pub fn stop(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        if let Some(monitor) = self.monitor {
            monitor.record(&self.command, duration, success);
        }
        duration
    }
}
