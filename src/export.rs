use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::PipelineError;

/// Destination for finished clips.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn save(&self, blob: Vec<u8>, filename: &str) -> Result<(), PipelineError>;
}

/// Writes clips into a local directory.
pub struct DirExporter {
    dir: PathBuf,
}

impl DirExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Exporter for DirExporter {
    async fn save(&self, blob: Vec<u8>, filename: &str) -> Result<(), PipelineError> {
        let export_err = |e: std::io::Error| PipelineError::Export(format!("{}: {}", filename, e));

        tokio::fs::create_dir_all(&self.dir).await.map_err(export_err)?;
        let target = self.dir.join(filename);
        // written under a dotted name first so a failed write never leaves a truncated clip
        let partial = self.dir.join(format!(".{}.partial", filename));
        tokio::fs::write(&partial, &blob).await.map_err(export_err)?;
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            warn!("Replacing existing {}", target.display());
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(export_err(e));
        }
        info!("Exported {} ({} bytes)", target.display(), blob.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_blob_under_filename() {
        let tmp = tempfile::tempdir().unwrap();
        let exporter = DirExporter::new(tmp.path().join("videos"));

        exporter
            .save(vec![1, 2, 3, 4], "My post.mp4")
            .await
            .unwrap();

        let written = std::fs::read(tmp.path().join("videos").join("My post.mp4")).unwrap();
        assert_eq!(written, vec![1, 2, 3, 4]);
        let leftovers: Vec<_> = std::fs::read_dir(exporter.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn saving_same_name_twice_keeps_latest_clip() {
        let tmp = tempfile::tempdir().unwrap();
        let exporter = DirExporter::new(tmp.path());

        exporter.save(b"first".to_vec(), "clip.mp4").await.unwrap();
        exporter.save(b"second".to_vec(), "clip.mp4").await.unwrap();

        let written = std::fs::read(tmp.path().join("clip.mp4")).unwrap();
        assert_eq!(written, b"second");
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["clip.mp4".to_string()]);
    }

    #[tokio::test]
    async fn unwritable_target_is_export_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let exporter = DirExporter::new(&blocker);
        let err = exporter.save(vec![0], "clip.mp4").await.unwrap_err();
        assert!(matches!(err, PipelineError::Export(_)));
    }
}
