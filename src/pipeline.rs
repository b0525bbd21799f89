use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::compositor::Compositor;
use crate::config::{PipelineSettings, RunRequest};
use crate::error::{ErrorKind, PipelineError};
use crate::export::Exporter;
use crate::reddit::{ContentSource, Post, filter_eligible};
use crate::scheduler::RunTrigger;
use crate::utils::output_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Downloading,
    Composing,
    Exported,
    Failed(ErrorKind),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Exported | JobState::Failed(_))
    }

    fn can_become(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Downloading)
                | (JobState::Pending, JobState::Composing)
                | (JobState::Downloading, JobState::Composing)
                | (JobState::Downloading, JobState::Failed(_))
                | (JobState::Composing, JobState::Exported)
                | (JobState::Composing, JobState::Failed(_))
        )
    }
}

/// Reference to a post that failed, kept on the run result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub title: String,
    pub permalink: String,
}

impl From<&Post> for PostRef {
    fn from(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            permalink: post.permalink.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub post: PostRef,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub submitted: usize,
    pub succeeded: usize,
    pub failures: Vec<JobFailure>,
    pub cancelled: bool,
}

/// One post on its way to becoming a clip.
#[derive(Debug)]
pub struct VideoJob {
    pub post: Post,
    pub background: PathBuf,
    pub watermark: Option<String>,
    pub output_name: String,
    state: JobState,
}

impl VideoJob {
    pub fn new(post: Post, index: usize, request: &RunRequest) -> Self {
        let output_name = output_name(&post.title, index);
        Self {
            post,
            background: request.background.clone(),
            watermark: request.watermark().map(str::to_string),
            output_name,
            state: JobState::Pending,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), PipelineError> {
        if !self.state.can_become(&next) {
            return Err(PipelineError::Composition(format!(
                "illegal job transition {:?} -> {:?} for '{}'",
                self.state, next, self.post.title
            )));
        }
        debug!("Job '{}': {:?} -> {:?}", self.output_name, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Drives fetch, compose and export for one subreddit at a time.
pub struct Orchestrator {
    source: Arc<dyn ContentSource>,
    compositor: Compositor,
    exporter: Arc<dyn Exporter>,
    settings: PipelineSettings,
    active: Arc<Mutex<()>>,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ContentSource>,
        compositor: Compositor,
        exporter: Arc<dyn Exporter>,
        settings: PipelineSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            compositor,
            exporter,
            settings,
            active: Arc::new(Mutex::new(())),
            shutdown,
        }
    }

    /// Asks any in-flight run to stop before its next job.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.active.try_lock().is_err()
    }

    pub async fn wait_idle(&self) {
        let _active = self.active.lock().await;
    }

    /// Runs the whole pipeline once, waiting for any run already in progress.
    pub async fn run(&self, request: &RunRequest) -> Result<RunResult, PipelineError> {
        let _active = self.active.lock().await;
        self.run_exclusive(request).await
    }

    /// Starts a run in the background unless one is already going, in which case the
    /// trigger is dropped.
    pub fn try_start(self: &Arc<Self>, request: RunRequest) -> Option<JoinHandle<()>> {
        let Ok(guard) = self.active.clone().try_lock_owned() else {
            warn!(
                "Run for r/{} already in progress; dropping trigger",
                request.subreddit
            );
            return None;
        };
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            match this.run_exclusive(&request).await {
                Ok(result) => info!(
                    "Run for r/{} finished: {}/{} exported, {} failed",
                    request.subreddit,
                    result.succeeded,
                    result.submitted,
                    result.failures.len()
                ),
                Err(e) => error!("Run for r/{} aborted: {}", request.subreddit, e),
            }
        }))
    }

    async fn run_exclusive(&self, request: &RunRequest) -> Result<RunResult, PipelineError> {
        request.validate()?;
        self.compositor.ensure_loaded().await?;

        let posts = self
            .source
            .fetch_top(&request.subreddit, self.settings.post_limit)
            .await?;
        let mut eligible = filter_eligible(posts);
        eligible.truncate(self.settings.post_limit);
        info!(
            "{} eligible posts to process for r/{}",
            eligible.len(),
            request.subreddit
        );

        let jobs: Vec<VideoJob> = eligible
            .into_iter()
            .enumerate()
            .map(|(i, post)| VideoJob::new(post, i, request))
            .collect();
        let total = jobs.len();
        let mut result = RunResult {
            submitted: total,
            ..RunResult::default()
        };
        let mut shutdown_rx = self.shutdown.subscribe();

        for (i, mut job) in jobs.into_iter().enumerate() {
            if *shutdown_rx.borrow() {
                info!("Shutdown requested, not starting job {}/{}", i + 1, total);
                result.cancelled = true;
                break;
            }

            info!(
                "Processing job {}/{}: {} by u/{} ({} points)",
                i + 1,
                total,
                job.post.title,
                job.post.author,
                job.post.score
            );
            if !job.post.selftext.is_empty() {
                debug!("Post body preview: {:.120}", job.post.selftext.replace('\n', " "));
            }
            match self.process(&mut job).await {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    warn!("Job '{}' failed: {}", job.post.title, e);
                    if !job.state().is_terminal() {
                        // the state machine itself rejected a step; keep the run going
                        error!("Job '{}' left in {:?}", job.post.title, job.state());
                    }
                    result.failures.push(JobFailure {
                        post: PostRef::from(&job.post),
                        kind: e.kind(),
                    });
                }
            }

            if i + 1 < total {
                debug!("Pacing for {:?} before next job", self.settings.pacing);
                tokio::select! {
                    _ = sleep(self.settings.pacing) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }

        Ok(result)
    }

    async fn process(&self, job: &mut VideoJob) -> Result<(), PipelineError> {
        job.advance(JobState::Downloading)?;
        let image = match self.source.download_image(&job.post.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                job.advance(JobState::Failed(e.kind()))?;
                return Err(e);
            }
        };

        job.advance(JobState::Composing)?;
        let composed = self
            .compositor
            .compose_one(&job.post, image, &job.background, job.watermark.as_deref())
            .await;
        let exported = match composed {
            Ok(video) => self.exporter.save(video, &job.output_name).await,
            Err(e) => Err(e),
        };

        match exported {
            Ok(()) => job.advance(JobState::Exported),
            Err(e) => {
                job.advance(JobState::Failed(e.kind()))?;
                Err(e)
            }
        }
    }
}

impl RunTrigger for Arc<Orchestrator> {
    fn fire(&self, request: RunRequest) {
        let _ = self.try_start(request);
    }
}
