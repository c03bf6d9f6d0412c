use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Server already running: {0}")]
    AlreadyRunning(String),

    #[error("Write permission denied")]
    PermissionDenied,

    #[error("Invalid config file name: {0:?}")]
    InvalidFileName(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_error_display_xml() {
        let xml_err = roxmltree::Document::parse("<unclosed>").unwrap_err();
        let err = Error::Xml(xml_err);
        assert!(err.to_string().starts_with("XML error"));
    }

    #[test]
    fn test_error_display_process() {
        let err = Error::Process("spawn failed".to_string());
        assert_eq!(err.to_string(), "Process error: spawn failed");
    }

    #[test]
    fn test_error_display_already_running() {
        let err = Error::AlreadyRunning("setup.xml".to_string());
        assert_eq!(err.to_string(), "Server already running: setup.xml");
    }

    #[test]
    fn test_error_display_invalid_file_name() {
        let err = Error::InvalidFileName("..".to_string());
        assert_eq!(err.to_string(), "Invalid config file name: \"..\"");
    }

    #[test]
    fn test_error_display_permission_denied() {
        assert_eq!(Error::PermissionDenied.to_string(), "Write permission denied");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
