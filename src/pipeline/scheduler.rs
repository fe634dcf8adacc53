//! Timers driving scheduled agents.
//!
//! Accepted schedule expressions:
//!
//! - `@every <duration>` with a humantime duration (`@every 1s`, `@every 1m30s`)
//! - descriptors: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
//! - cron with 5 fields (minute resolution) or 6/7 fields (seconds, optional year)

use chrono::{DateTime, Utc};
use crossbeam_channel::{after, bounded, select, tick, Sender};
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A parsed schedule expression.
#[derive(Debug, Clone)]
pub enum Schedule {
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let expression = expression.trim();
        if let Some(rest) = expression.strip_prefix("@every") {
            let duration = humantime::parse_duration(rest.trim())
                .map_err(|e| format!("invalid interval '{}': {}", rest.trim(), e))?;
            if duration.is_zero() {
                return Err("interval must be greater than zero".into());
            }
            return Ok(Schedule::Every(duration));
        }

        let normalized = if !expression.starts_with('@')
            && expression.split_whitespace().count() == 5
        {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };

        cron::Schedule::from_str(&normalized)
            .map(|s| Schedule::Cron(Box::new(s)))
            .map_err(|e| format!("invalid cron expression '{expression}': {e}"))
    }

    /// Delay from `now` until the next firing, if there is one.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Schedule::Every(interval) => Some(*interval),
            Schedule::Cron(schedule) => {
                let next = schedule.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A timer thread invoking a callback on every firing until halted.
pub struct Timer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn spawn<F>(name: String, schedule: Schedule, mut fire: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new().name(name).spawn(move || match schedule {
            Schedule::Every(interval) => {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => fire(),
                    }
                }
            }
            Schedule::Cron(_) => loop {
                let Some(delay) = schedule.next_delay(Utc::now()) else {
                    break;
                };
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(after(delay)) -> _ => fire(),
                }
            },
        })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop future firings and wait for an in-progress one to finish.
    pub fn halt(&mut self) {
        // dropping the sender disconnects the stop channel
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Timer thread panicked");
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.halt();
    }
}
