//! Unified error types for the bucketdeck core crate.
//!
//! Every fallible domain operation returns a [`CoreError`]. Repositories
//! fold lower-level causes (JSON parsing, local I/O, object-store SDK
//! failures) into the nearest domain kind and keep the cause in the
//! message. Asynchronous failures travel on `.failure` events as
//! `Arc<CoreError>` so events stay cheap to clone.

use thiserror::Error;

/// Coarse classification of a [`CoreError`], used where callers branch on
/// the kind of failure rather than on its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Technical,
    NotLoaded,
    NoConnectionSelected,
    EditorAlreadyOpened,
    InvalidSettings,
    Invalid,
    ReadOnly,
    Cancelled,
}

/// Top-level error type encompassing all core error categories.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The connection, directory, file, bucket or key does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport, serialization or local I/O failure.
    #[error("Technical error: {0}")]
    Technical(String),

    /// Children of a directory were requested before it was loaded.
    #[error("Not loaded: {0}")]
    NotLoaded(String),

    /// The operation needs a selected connection and there is none.
    #[error("No connection selected")]
    NoConnectionSelected,

    /// An editor for this file is already open.
    #[error("Editor already opened: {0}")]
    EditorAlreadyOpened(String),

    /// Settings rejected by the smart constructor.
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    /// A value failed validation (names, paths, connection fields, state
    /// transitions).
    #[error("Invalid: {0}")]
    Invalid(String),

    /// The selected connection is read-only.
    #[error("Connection is read-only: {0}")]
    ReadOnly(String),

    /// The operation's context was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Random-access content failure.
    #[error("Content error: {0}")]
    Content(#[from] ContentError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Technical(_) => ErrorKind::Technical,
            CoreError::NotLoaded(_) => ErrorKind::NotLoaded,
            CoreError::NoConnectionSelected => ErrorKind::NoConnectionSelected,
            CoreError::EditorAlreadyOpened(_) => ErrorKind::EditorAlreadyOpened,
            CoreError::InvalidSettings(_) => ErrorKind::InvalidSettings,
            CoreError::Invalid(_) => ErrorKind::Invalid,
            CoreError::ReadOnly(_) => ErrorKind::ReadOnly,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Content(err) => err.kind(),
        }
    }

    /// Shorthand for `self.kind() == kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

/// Errors raised by [`Settings::new`](crate::settings::Settings::new).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("timeout must be strictly positive")]
    InvalidTimeout,

    #[error("max file preview size must be strictly positive")]
    InvalidMaxPreviewSize,
}

/// Errors raised by a random-access [`Content`](crate::s3::Content) handle.
#[derive(Error, Debug)]
pub enum ContentError {
    /// Read or seek on an object that has not been written yet.
    #[error("object does not exist: {0}")]
    NotExists(String),

    /// Seek went past the end; the cursor was clamped to the end.
    #[error("end of content")]
    Eof,

    /// Seek resolved to a negative offset.
    #[error("negative seek offset: {0}")]
    NegativeOffset(i64),

    /// Uploading the updated object failed; the content was rolled back.
    #[error("upload of {key} failed: {cause}")]
    Upload { key: String, cause: Box<CoreError> },
}

impl ContentError {
    fn kind(&self) -> ErrorKind {
        match self {
            ContentError::NotExists(_) => ErrorKind::NotFound,
            ContentError::Eof | ContentError::NegativeOffset(_) => ErrorKind::Invalid,
            ContentError::Upload { cause, .. } => cause.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_display() {
        let err = CoreError::NotFound("connection abc".into());
        assert_eq!(err.to_string(), "Not found: connection abc");

        let err = CoreError::NoConnectionSelected;
        assert_eq!(err.to_string(), "No connection selected");

        let err = CoreError::EditorAlreadyOpened("/a/b.txt".into());
        assert_eq!(err.to_string(), "Editor already opened: /a/b.txt");
    }

    #[test]
    fn core_error_from_settings_error() {
        let err: CoreError = SettingsError::InvalidTimeout.into();
        assert_eq!(
            err.to_string(),
            "Invalid settings: timeout must be strictly positive"
        );
        assert!(err.is(ErrorKind::InvalidSettings));
    }

    #[test]
    fn content_error_kind_follows_cause() {
        let err: CoreError = ContentError::Upload {
            key: "f".into(),
            cause: Box::new(CoreError::Cancelled),
        }
        .into();
        assert!(err.is(ErrorKind::Cancelled));
        assert_eq!(
            err.to_string(),
            "Content error: upload of f failed: Operation cancelled"
        );

        let err: CoreError = ContentError::NotExists("missing".into()).into();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[test]
    fn kind_of_plain_variants() {
        assert_eq!(CoreError::Technical("x".into()).kind(), ErrorKind::Technical);
        assert_eq!(CoreError::NotLoaded("/".into()).kind(), ErrorKind::NotLoaded);
        assert_eq!(CoreError::ReadOnly("c".into()).kind(), ErrorKind::ReadOnly);
    }
}
