//! [`Alert`]: a user-visible, time-stamped status-bar message.

use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warn,
    Crit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub at: SystemTime,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: SystemTime::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warn, message)
    }

    pub fn crit(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Crit, message)
    }
}
