use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, OrthoError>;

/// Failure kinds surfaced by the blending pipeline.
///
/// Every failure aborts the run; the driver reports the first one together
/// with the offending path. Recovery is never attempted.
#[derive(thiserror::Error, Debug)]
pub enum OrthoError {
    #[error("malformed metadata in {path:?}: {reason}")]
    MetadataMalformed { path: PathBuf, reason: String },

    #[error("unsupported geometry in {path:?}: {reason}")]
    UnsupportedGeometry { path: PathBuf, reason: String },

    #[error("resolution mismatch in {path:?}: {reason}")]
    ResolutionMismatch { path: PathBuf, reason: String },

    #[error("missing or unreadable input {path:?}: {source}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("tile {name} produced a coverage mask with no valid pixels")]
    EmptyMask { name: String },

    #[error("invalid canvas: {0}")]
    CanvasInvalid(String),

    #[error("mask is {mask_width}x{mask_height} but {context} is {width}x{height}")]
    MaskShapeMismatch {
        context: String,
        mask_width: u32,
        mask_height: u32,
        width: u32,
        height: u32,
    },

    #[error("no tile was fed to the blender")]
    BlenderEmpty,

    #[error("failed to write {path:?}: {source}")]
    IoWriteFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("incompatible pyramid level: {0}")]
    IncompatibleLevel(String),
}

impl OrthoError {
    pub fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MetadataMalformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn geometry(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedGeometry {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn resolution(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ResolutionMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_offending_path() {
        let err = OrthoError::metadata("tiles/a.tfw", "expected 6 values, found 4");
        let text = err.to_string();
        assert!(text.contains("a.tfw"));
        assert!(text.contains("expected 6 values"));
    }

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            OrthoError::geometry("a.tfw", "x")
                .to_string()
                .starts_with("unsupported geometry")
        );
        assert!(
            OrthoError::resolution("a.tfw", "x")
                .to_string()
                .starts_with("resolution mismatch")
        );
        assert!(
            OrthoError::BlenderEmpty
                .to_string()
                .contains("no tile was fed")
        );
    }
}
