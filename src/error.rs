use std::fmt;

#[derive(Debug)]
pub enum ReportError {
    InvalidConfiguration(String),
    Decode(String),
    Rasterize(String),
    Encode(String),
    SurfaceUnavailable,
    Pdf(String),
    Io(std::io::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ReportError::Decode(message) => write!(f, "image decode failed: {}", message),
            ReportError::Rasterize(message) => {
                write!(f, "document rasterization failed: {}", message)
            }
            ReportError::Encode(message) => write!(f, "image encode failed: {}", message),
            ReportError::SurfaceUnavailable => write!(f, "no drawing surface available"),
            ReportError::Pdf(message) => write!(f, "pdf error: {}", message),
            ReportError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReportError {
    fn from(value: std::io::Error) -> Self {
        ReportError::Io(value)
    }
}

impl From<image::ImageError> for ReportError {
    fn from(value: image::ImageError) -> Self {
        ReportError::Decode(value.to_string())
    }
}

impl From<lopdf::Error> for ReportError {
    fn from(value: lopdf::Error) -> Self {
        ReportError::Rasterize(value.to_string())
    }
}
