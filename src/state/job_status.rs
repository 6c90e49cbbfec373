/// Crawl job status definitions
///
/// A job moves `Pending -> Crawling -> {Completed, Error, Stopped}` within one
/// run; a fresh start request moves a terminal job back to `Crawling`.
use std::fmt;

/// Represents the current status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Job was created and has never been crawled
    Pending,

    /// A run is in flight for this job
    Crawling,

    /// The last run fetched, analyzed and scanned the page successfully
    Completed,

    /// The last run failed; the job carries an error message
    Error,

    /// A stop was requested for the job
    Stopped,
}

impl JobStatus {
    /// Returns true if no further automatic transition will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    /// Returns true if a run is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Crawling)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Crawling => "crawling",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "crawling" => Some(Self::Crawling),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 5] {
        [
            Self::Pending,
            Self::Crawling,
            Self::Completed,
            Self::Error,
            Self::Stopped,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
