use std::path::PathBuf;
use std::time::Duration;

use crate::args::Args;
use crate::error::PipelineError;
use crate::scheduler::TimeOfDay;

pub const DEFAULT_POST_LIMIT: usize = 14;
pub const DEFAULT_PACING: Duration = Duration::from_secs(60);

/// What one pipeline run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub subreddit: String,
    pub background: PathBuf,
    pub watermark: Option<String>,
}

impl RunRequest {
    pub fn new(subreddit: impl Into<String>, background: impl Into<PathBuf>) -> Self {
        Self {
            subreddit: subreddit.into(),
            background: background.into(),
            watermark: None,
        }
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let subreddit = self.subreddit.trim();
        if subreddit.is_empty() {
            return Err(PipelineError::Config("subreddit is missing".into()));
        }
        if !subreddit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PipelineError::Config(format!(
                "'{}' is not a valid subreddit name",
                subreddit
            )));
        }
        if self.background.as_os_str().is_empty() {
            return Err(PipelineError::Config("background video is missing".into()));
        }
        if !self.background.is_file() {
            return Err(PipelineError::Config(format!(
                "background video not found: {}",
                self.background.display()
            )));
        }
        Ok(())
    }

    pub fn watermark(&self) -> Option<&str> {
        self.watermark.as_deref().filter(|w| !w.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub post_limit: usize,
    pub pacing: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            post_limit: DEFAULT_POST_LIMIT,
            pacing: DEFAULT_PACING,
        }
    }
}

/// Everything the scheduler needs to arm its two daily timers. Subreddit and
/// background may be absent, in which case arming is deferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub subreddit: Option<String>,
    pub background: Option<PathBuf>,
    pub watermark: Option<String>,
    pub times: [TimeOfDay; 2],
}

impl ScheduleSettings {
    pub fn run_request(&self) -> Option<RunRequest> {
        let subreddit = self.subreddit.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let background = self.background.as_ref().filter(|b| !b.as_os_str().is_empty())?;
        let mut request = RunRequest::new(subreddit, background.clone());
        request.watermark = self.watermark.clone();
        Some(request)
    }
}

impl From<&Args> for PipelineSettings {
    fn from(args: &Args) -> Self {
        Self {
            post_limit: args.limit,
            pacing: Duration::from_secs(args.pacing_secs),
        }
    }
}

impl From<&Args> for ScheduleSettings {
    fn from(args: &Args) -> Self {
        Self {
            subreddit: args.subreddit.clone(),
            background: args.background.clone(),
            watermark: args.watermark.clone(),
            times: [args.time1, args.time2],
        }
    }
}
