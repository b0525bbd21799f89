use thiserror::Error;

/// Everything that can go wrong between fetching a feed and exporting a video.
///
/// Job-scoped variants (`Network` from an image download, `Composition`, `Export`) are
/// recorded on the run result; the rest abort the run and reach the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("composition engine failed to initialize: {0}")]
    EngineInit(String),

    #[error("composition failed: {0}")]
    Composition(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(String),
}

/// Payload-free tag for a [`PipelineError`], used when recording job failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    EngineInit,
    Composition,
    Config,
    Export,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Network(_) => ErrorKind::Network,
            PipelineError::EngineInit(_) => ErrorKind::EngineInit,
            PipelineError::Composition(_) => ErrorKind::Composition,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Export(_) => ErrorKind::Export,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Network(format!("request timed out: {}", err))
        } else {
            PipelineError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(PipelineError::Network("x".into()).kind(), ErrorKind::Network);
        assert_eq!(
            PipelineError::Composition("x".into()).kind(),
            ErrorKind::Composition
        );
        assert_eq!(PipelineError::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn display_includes_detail() {
        let err = PipelineError::EngineInit("ffmpeg not found".into());
        assert_eq!(
            err.to_string(),
            "composition engine failed to initialize: ffmpeg not found"
        );
    }
}
