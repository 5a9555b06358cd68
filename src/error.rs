use std::path::PathBuf;

/// Result type alias for the analyzer
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an analysis run.
///
/// Gaps in the analysis itself (no root router, an unresolvable handler, a missing type
/// definition) are not errors; they are logged and show up as `unknown` schemas.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    /// A source file could not be read or parsed
    LoadError { file: PathBuf, message: String },
    ConfigError(String),
    InvalidArgument(String),
    FrameworkNotDetected,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "IO 错误: {}", e),
            Error::LoadError { file, message } => {
                write!(f, "加载错误 {}: {}", file.display(), message)
            }
            Error::ConfigError(msg) => write!(f, "配置错误: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "无效参数: {}", msg),
            Error::FrameworkNotDetected => write!(f, "未检测到支持的 Web 框架 (axum, actix-web, tide)"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
