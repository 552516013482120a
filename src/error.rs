use thiserror::Error;

/// Errors reported back to whoever drives a compose session.
///
/// Every variant is terminal to the operation that raised it only; the
/// session state stays usable afterwards.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    /// The uploaded file does not declare a raster image type.
    #[error("please select an image file (JPEG, PNG, etc.), got '{mime}'")]
    InvalidFileType { mime: String },

    /// The uploaded bytes could not be decoded as an image.
    #[error("could not read that image, please try another file: {0}")]
    ImageDecode(String),

    /// The frame asset failed to load from both the primary and fallback location.
    #[error("could not load frame '{frame}': {reason}")]
    FrameLoad { frame: String, reason: String },

    /// Export was requested before any photo was uploaded.
    #[error("please upload an image first")]
    NothingToExport,

    /// The composite contains pixels from a source that forbids readback.
    #[error(
        "export blocked: a frame or photo came from a location that does not allow pixel export; use images from your computer instead"
    )]
    ExportSecurityRestricted,

    /// Encoding or saving the composite failed.
    #[error("error generating download, please try again: {0}")]
    ExportFailed(String),

    /// A zoom factor that is not a positive finite number.
    #[error("zoom must be a positive finite number, got {0}")]
    InvalidZoom(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_restriction_is_distinct_from_generic_failure() {
        let restricted = SessionError::ExportSecurityRestricted;
        let failed = SessionError::ExportFailed("disk full".into());
        assert_ne!(restricted, failed);
        assert!(restricted.to_string().contains("does not allow pixel export"));
        assert!(failed.to_string().contains("disk full"));
    }

    #[test]
    fn messages_name_the_condition() {
        let err = SessionError::InvalidFileType {
            mime: "text/plain".into(),
        };
        assert!(err.to_string().contains("text/plain"));
        let err = SessionError::FrameLoad {
            frame: "1styear.png".into(),
            reason: "not found".into(),
        };
        assert!(err.to_string().contains("1styear.png"));
        assert!(SessionError::NothingToExport.to_string().contains("upload"));
    }
}
