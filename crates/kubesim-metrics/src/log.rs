//! Bounded in-memory event log.
//!
//! Keeps the most recent `capacity` entries for the system and test
//! channels combined; the oldest entry is evicted first. Every entry is
//! also emitted through `tracing`.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Success,
    Error,
}

/// Which panel an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogChannel {
    System,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Simulated time of the entry.
    pub at: Duration,
    pub level: LogLevel,
    pub channel: LogChannel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(
        &mut self,
        at: Duration,
        channel: LogChannel,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let secs = at.as_secs();
        match level {
            LogLevel::Info | LogLevel::Success => info!(at = secs, ?channel, "{message}"),
            LogLevel::Warning => warn!(at = secs, ?channel, "{message}"),
            LogLevel::Error => error!(at = secs, ?channel, "{message}"),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(LogEntry {
            at,
            level,
            channel,
            message,
        });
    }

    pub fn system(&mut self, at: Duration, level: LogLevel, message: impl Into<String>) {
        self.push(at, LogChannel::System, level, message);
    }

    pub fn test(&mut self, at: Duration, level: LogLevel, message: impl Into<String>) {
        self.push(at, LogChannel::Test, level, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn channel(&self, channel: LogChannel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.channel == channel)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Success => "SUCCESS",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>5}s] [{}] {}", self.at.as_secs(), self.level, self.message)
    }
}
