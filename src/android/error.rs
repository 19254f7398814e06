use std::fmt;

/// Builds an [`AxmlError::MalformedInput`] from a format string.
macro_rules! malformed {
    ($msg:literal) => {
        $crate::android::error::AxmlError::MalformedInput($msg.to_string())
    };
    ($fmtstr:literal, $($args:tt)*) => {
        $crate::android::error::AxmlError::MalformedInput(format!($fmtstr, $($args)*))
    };
}

/// Returns early with an [`AxmlError::MalformedInput`].
macro_rules! fail {
    ($($args:tt)*) => {
        return Err(malformed!($($args)*))
    };
}

/// Result alias for binary XML operations.
pub type AxmlResult<T> = Result<T, AxmlError>;

/// Errors surfaced while decoding, rewriting or encoding binary XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxmlError {
    /// The document (or the event stream fed to the encoder) is structurally invalid.
    MalformedInput(String),
    /// Text XML generation failure.
    Xml(String),
}

impl AxmlError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, AxmlError::MalformedInput(_))
    }
}

impl fmt::Display for AxmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxmlError::MalformedInput(msg) => write!(f, "Malformed manifest: {msg}"),
            AxmlError::Xml(msg) => write!(f, "XML error: {msg}"),
        }
    }
}

impl std::error::Error for AxmlError {}

impl From<quick_xml::Error> for AxmlError {
    fn from(value: quick_xml::Error) -> Self {
        AxmlError::Xml(value.to_string())
    }
}

impl From<std::io::Error> for AxmlError {
    fn from(value: std::io::Error) -> Self {
        AxmlError::Xml(value.to_string())
    }
}
