use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::{RunRequest, ScheduleSettings};
use crate::error::PipelineError;

/// A wall-clock time of day, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, PipelineError> {
        if hour > 23 || minute > 59 {
            return Err(PipelineError::Config(format!(
                "{:02}:{:02} is not a time of day between 00:00 and 23:59",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    fn as_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

impl FromStr for TimeOfDay {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::Config(format!("'{}' is not a HH:MM time", s));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if h.is_empty() || h.len() > 2 || m.len() != 2 || !digits(h) || !digits(m) {
            return Err(invalid());
        }
        let hour = h.parse().map_err(|_| invalid())?;
        let minute = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Next moment strictly after `now` whose time of day is `time`: later today if it is
/// still ahead, otherwise tomorrow. Local times skipped by a DST jump roll to the next day.
pub fn next_fire<Tz: TimeZone>(time: TimeOfDay, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..3 {
        if let Some(at) = tz.from_local_datetime(&date.and_time(time.as_naive())).earliest() {
            if at > *now {
                return at;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    now.clone() + chrono::Duration::days(1)
}

/// Receives scheduled fires. Must not block: long work belongs in a spawned task.
pub trait RunTrigger: Send + Sync {
    fn fire(&self, request: RunRequest);
}

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmStatus {
    Armed([DateTime<Local>; 2]),
    /// Subreddit or background missing; no timer is set.
    Deferred,
    /// Settings are complete but unusable (bad subreddit name, background not on disk);
    /// no timer is set.
    Invalid(String),
}

/// Two independent daily timers that fire the pipeline.
pub struct Scheduler {
    trigger: Arc<dyn RunTrigger>,
    clock: Clock,
    generation: Arc<Mutex<u64>>,
    timers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(trigger: Arc<dyn RunTrigger>) -> Self {
        Self::with_clock(trigger, Arc::new(Local::now))
    }

    pub fn with_clock(trigger: Arc<dyn RunTrigger>, clock: Clock) -> Self {
        Self {
            trigger,
            clock,
            generation: Arc::new(Mutex::new(0)),
            timers: Vec::new(),
        }
    }

    pub fn armed_timers(&self) -> usize {
        self.timers.iter().filter(|t| !t.is_finished()).count()
    }

    /// Replaces the configuration. Every outstanding timer is cancelled first, then
    /// both slots are re-armed from scratch if the new settings are complete and valid.
    pub fn configure(&mut self, settings: ScheduleSettings) -> ArmStatus {
        self.cancel_timers();
        let times = settings.times;
        let Some(request) = settings.run_request() else {
            info!("Scheduling deferred until subreddit and background video are set");
            return ArmStatus::Deferred;
        };
        if let Err(e) = request.validate() {
            warn!("Not scheduling: {}", e);
            return ArmStatus::Invalid(e.to_string());
        }

        let generation = *self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let now = (self.clock)();
        let started = Instant::now();
        let next = times.map(|time| next_fire(time, &now));

        for (slot, (time, first)) in times.into_iter().zip(next).enumerate() {
            let delay = (first - now).to_std().unwrap_or_default();
            info!(
                "Slot {} armed for {} (r/{})",
                slot + 1,
                first.format("%Y-%m-%d %H:%M"),
                request.subreddit
            );
            self.timers.push(tokio::spawn(run_slot(
                slot,
                time,
                first,
                started + delay,
                request.clone(),
                self.trigger.clone(),
                self.generation.clone(),
                generation,
            )));
        }
        ArmStatus::Armed(next)
    }

    pub fn shutdown(&mut self) {
        self.cancel_timers();
        info!("Scheduler stopped");
    }

    fn cancel_timers(&mut self) {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        debug!("Timers cancelled (generation {})", *generation);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_slot(
    slot: usize,
    time: TimeOfDay,
    mut fire_at: DateTime<Local>,
    mut deadline: Instant,
    request: RunRequest,
    trigger: Arc<dyn RunTrigger>,
    generation: Arc<Mutex<u64>>,
    armed_generation: u64,
) {
    loop {
        sleep_until(deadline).await;
        {
            let current = generation.lock().unwrap_or_else(|e| e.into_inner());
            if *current != armed_generation {
                warn!("Slot {} fired after reconfiguration; ignoring", slot + 1);
                return;
            }
            info!("Slot {} ({}) firing for r/{}", slot + 1, time, request.subreddit);
            trigger.fire(request.clone());
        }

        let next = next_fire(time, &fire_at);
        deadline += (next - fire_at).to_std().unwrap_or_default();
        fire_at = next;
        debug!("Slot {} re-armed for {}", slot + 1, fire_at.format("%Y-%m-%d %H:%M"));
    }
}
