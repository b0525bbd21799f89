use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::reddit::Post;

pub const FRAME_WIDTH: u32 = 1080;
pub const HALF_HEIGHT: u32 = 960;
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const CLIP_SECONDS: u32 = 5;
pub const VIDEO_CODEC: &str = "libx264";
pub const PRESET: &str = "medium";
pub const CRF: u32 = 23;
pub const WATERMARK_X: &str = "10";
pub const WATERMARK_Y: &str = "h-th-10";
pub const WATERMARK_FONT_SIZE: u32 = 24;
pub const WATERMARK_COLOR: &str = "white";

const IMAGE_INPUT: &str = "post_image";
const WATERMARK_FILE: &str = "watermark.txt";
const OUTPUT_FILE: &str = "output.mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOverlay {
    pub text: String,
    pub x: &'static str,
    pub y: &'static str,
    pub font_size: u32,
    pub font_color: &'static str,
}

/// Declarative description of one composition: image on top, background below,
/// optional burned-in watermark, fixed trim and encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraphSpec {
    pub top: (u32, u32),
    pub bottom: (u32, u32),
    pub pixel_format: &'static str,
    pub overlay: Option<TextOverlay>,
    pub duration_secs: u32,
    pub codec: &'static str,
    pub preset: &'static str,
    pub crf: u32,
}

impl FilterGraphSpec {
    pub fn new(watermark: Option<&str>) -> Self {
        let overlay = watermark
            .filter(|text| !text.trim().is_empty())
            .map(|text| TextOverlay {
                text: text.to_string(),
                x: WATERMARK_X,
                y: WATERMARK_Y,
                font_size: WATERMARK_FONT_SIZE,
                font_color: WATERMARK_COLOR,
            });

        Self {
            top: (FRAME_WIDTH, HALF_HEIGHT),
            bottom: (FRAME_WIDTH, HALF_HEIGHT),
            pixel_format: PIXEL_FORMAT,
            overlay,
            duration_secs: CLIP_SECONDS,
            codec: VIDEO_CODEC,
            preset: PRESET,
            crf: CRF,
        }
    }

    /// The `-filter_complex` value. Input 0 is the background clip, input 1 the image;
    /// overlay text is read from `text_file` so the caption never needs escaping.
    pub fn filter_complex(&self, text_file: &str) -> String {
        let mut graph = format!(
            "[1:v]scale={}:{},setsar=1[top];[0:v]scale={}:{},setsar=1[bottom];[top][bottom]vstack,format={}",
            self.top.0, self.top.1, self.bottom.0, self.bottom.1, self.pixel_format
        );
        if let Some(overlay) = &self.overlay {
            graph.push_str(&format!(
                ",drawtext=textfile={}:expansion=none:x={}:y={}:fontsize={}:fontcolor={}",
                text_file, overlay.x, overlay.y, overlay.font_size, overlay.font_color
            ));
        }
        graph.push_str("[v]");
        graph
    }

    pub fn ffmpeg_args(
        &self,
        background: &Path,
        image: &str,
        text_file: &str,
        output: &str,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into(), "-i".into()];
        args.push(background.as_os_str().to_owned());
        args.extend(["-loop", "1", "-i", image].map(OsString::from));
        args.push("-filter_complex".into());
        args.push(self.filter_complex(text_file).into());
        let duration = self.duration_secs.to_string();
        let crf = self.crf.to_string();
        args.extend(
            [
                "-map", "[v]", "-map", "0:a?", "-t", duration.as_str(), "-c:v", self.codec,
                "-preset", self.preset, "-crf", crf.as_str(), "-c:a", "aac", "-movflags", "+faststart", output,
            ]
            .map(OsString::from),
        );
        args
    }
}

#[derive(Debug, Clone)]
pub struct CompositionInputs {
    pub image: Vec<u8>,
    pub image_extension: String,
    pub background: PathBuf,
}

/// A media engine that can run a [`FilterGraphSpec`].
#[async_trait]
pub trait CompositionBackend: Send + Sync {
    async fn load_once(&self) -> Result<(), PipelineError>;

    async fn execute(
        &self,
        graph: &FilterGraphSpec,
        inputs: &CompositionInputs,
    ) -> Result<Vec<u8>, PipelineError>;
}

pub struct FfmpegBackend {
    ffmpeg_path: String,
    version: OnceCell<String>,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            version: OnceCell::new(),
        }
    }
}

#[async_trait]
impl CompositionBackend for FfmpegBackend {
    async fn load_once(&self) -> Result<(), PipelineError> {
        let version = self
            .version
            .get_or_try_init(|| async {
                let output = Command::new(&self.ffmpeg_path)
                    .arg("-version")
                    .output()
                    .await
                    .map_err(|e| {
                        PipelineError::EngineInit(format!("cannot run {}: {}", self.ffmpeg_path, e))
                    })?;
                if !output.status.success() {
                    return Err(PipelineError::EngineInit(format!(
                        "{} -version exited with {}",
                        self.ffmpeg_path, output.status
                    )));
                }
                let stdout = String::from_utf8_lossy(&output.stdout);
                Ok::<_, PipelineError>(stdout.lines().next().unwrap_or_default().to_string())
            })
            .await?;
        debug!("Composition engine ready: {}", version);
        Ok(())
    }

    async fn execute(
        &self,
        graph: &FilterGraphSpec,
        inputs: &CompositionInputs,
    ) -> Result<Vec<u8>, PipelineError> {
        let scratch = tempfile::tempdir()
            .map_err(|e| PipelineError::Composition(format!("cannot create scratch dir: {}", e)))?;
        let background = std::path::absolute(&inputs.background).map_err(|e| {
            PipelineError::Composition(format!(
                "cannot resolve background {}: {}",
                inputs.background.display(),
                e
            ))
        })?;

        let image_name = format!("{}.{}", IMAGE_INPUT, inputs.image_extension);
        tokio::fs::write(scratch.path().join(&image_name), &inputs.image)
            .await
            .map_err(|e| PipelineError::Composition(format!("cannot stage image: {}", e)))?;
        if let Some(overlay) = &graph.overlay {
            tokio::fs::write(scratch.path().join(WATERMARK_FILE), &overlay.text)
                .await
                .map_err(|e| PipelineError::Composition(format!("cannot stage watermark: {}", e)))?;
        }

        let output = Command::new(&self.ffmpeg_path)
            .current_dir(scratch.path())
            .args(graph.ffmpeg_args(&background, &image_name, WATERMARK_FILE, OUTPUT_FILE))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::Composition(format!("cannot run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            error!("ffmpeg failed with {}", output.status);
            return Err(PipelineError::Composition(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        let video = tokio::fs::read(scratch.path().join(OUTPUT_FILE))
            .await
            .map_err(|e| PipelineError::Composition(format!("cannot read output: {}", e)))?;
        if video.is_empty() {
            return Err(PipelineError::Composition("ffmpeg produced an empty file".into()));
        }
        Ok(video)
    }
}

/// Turns posts into finished clips using whatever backend it was built with.
#[derive(Clone)]
pub struct Compositor {
    backend: Arc<dyn CompositionBackend>,
}

impl Compositor {
    pub fn new(backend: Arc<dyn CompositionBackend>) -> Self {
        Self { backend }
    }

    pub async fn ensure_loaded(&self) -> Result<(), PipelineError> {
        self.backend.load_once().await
    }

    pub async fn compose_one(
        &self,
        post: &Post,
        image: Vec<u8>,
        background: &Path,
        watermark: Option<&str>,
    ) -> Result<Vec<u8>, PipelineError> {
        if image.is_empty() {
            return Err(PipelineError::Composition(format!(
                "image for '{}' is empty",
                post.title
            )));
        }
        let image_extension = post
            .image_extension()
            .ok_or_else(|| PipelineError::Composition(format!("'{}' is not an image", post.url)))?;

        let graph = FilterGraphSpec::new(watermark);
        let inputs = CompositionInputs {
            image,
            image_extension: image_extension.to_string(),
            background: background.to_path_buf(),
        };
        info!(
            "Composing '{}' ({}s, watermark: {})",
            post.title,
            graph.duration_secs,
            graph.overlay.is_some()
        );
        self.backend.execute(&graph, &inputs).await
    }
}
