use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("scheduler failed to start: {reason}")]
    SchedulerStart { reason: String },

    #[error("job not found: {name}")]
    JobNotFound { name: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_schedule(schedule: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidSchedule {
            schedule: schedule.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn scheduler_start(reason: impl Into<String>) -> Self {
        Self::SchedulerStart {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(name: impl Into<String>) -> Self {
        Self::JobNotFound { name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
