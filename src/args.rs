use clap::Parser;
use std::path::PathBuf;

use crate::config::{DEFAULT_PACING, DEFAULT_POST_LIMIT};
use crate::reddit::DEFAULT_FEED_BASE;
use crate::scheduler::TimeOfDay;

#[derive(Parser, Debug)]
#[clap(about = "Turns a subreddit's top image posts into vertical videos twice a day")]
pub struct Args {
    #[clap(long, env = "REDDIT_SHORTS_SUBREDDIT")]
    pub subreddit: Option<String>,

    /// Clip shown in the bottom half of every video.
    #[clap(long, env = "REDDIT_SHORTS_BACKGROUND")]
    pub background: Option<PathBuf>,

    #[clap(long, env = "REDDIT_SHORTS_WATERMARK")]
    pub watermark: Option<String>,

    #[clap(long, env = "REDDIT_SHORTS_TIME1", default_value = "09:00")]
    pub time1: TimeOfDay,

    #[clap(long, env = "REDDIT_SHORTS_TIME2", default_value = "18:00")]
    pub time2: TimeOfDay,

    #[clap(long, env = "REDDIT_SHORTS_OUT", default_value = "./out")]
    pub out: PathBuf,

    #[clap(long, env = "REDDIT_SHORTS_LIMIT", default_value_t = DEFAULT_POST_LIMIT)]
    pub limit: usize,

    #[clap(long, env = "REDDIT_SHORTS_PACING_SECS", default_value_t = DEFAULT_PACING.as_secs())]
    pub pacing_secs: u64,

    #[clap(long, env = "REDDIT_SHORTS_FEED_BASE", default_value = DEFAULT_FEED_BASE)]
    pub feed_base: String,

    #[clap(long, env = "REDDIT_SHORTS_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    #[clap(long, env = "REDDIT_SHORTS_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Run the pipeline once right away and exit instead of scheduling.
    #[clap(long)]
    pub once: bool,
}
