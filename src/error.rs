use std::path::PathBuf;
use thiserror::Error;

pub type MaxvalResult<T> = Result<T, MaxvalError>;

/// Failures that abort a maxval run.
#[derive(Error, Debug)]
pub enum MaxvalError {
    /// Frame does not fit the grid established by the first frame.
    #[error("frame {frame} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        frame: u32,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Frames must be folded in non-decreasing time order.
    #[error("frame {frame} at time {time} follows a frame at time {previous}")]
    OutOfOrder { frame: u32, time: f64, previous: f64 },

    #[error("summary state already finalized; cannot fold frame {frame}")]
    AlreadyFinalized { frame: u32 },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("no gridded rasters found in {}", dir.display())]
    NoInputRasters { dir: PathBuf },

    #[error("none of the requested frames {requested:?} exist in {}", dir.display())]
    NoFramesSelected { dir: PathBuf, requested: Vec<u32> },

    #[error("time file {}: {reason}", path.display())]
    TimeFile { path: PathBuf, reason: String },

    #[error("{}:{line}: {reason}", path.display())]
    DataFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("extent geometry invalid: {0}")]
    Geometry(String),

    #[error("raster support unavailable: {0}")]
    Unsupported(&'static str),

    #[error("raster {}: {reason}", path.display())]
    Raster { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[cfg(feature = "netcdf")]
    #[error(transparent)]
    Netcdf(#[from] netcdf::Error),
}

impl MaxvalError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        MaxvalError::Configuration(msg.into())
    }

    /// Broad class of the failure, used when reporting which precondition broke.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MaxvalError::ShapeMismatch { .. }
            | MaxvalError::OutOfOrder { .. }
            | MaxvalError::AlreadyFinalized { .. }
            | MaxvalError::Configuration(_) => ErrorCategory::Configuration,
            MaxvalError::NoInputRasters { .. }
            | MaxvalError::NoFramesSelected { .. }
            | MaxvalError::TimeFile { .. } => ErrorCategory::DataAvailability,
            MaxvalError::Geometry(_) => ErrorCategory::Geometry,
            _ => ErrorCategory::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    DataAvailability,
    Geometry,
    Io,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = MaxvalError::ShapeMismatch {
            frame: 3,
            expected: (2, 2),
            actual: (3, 2),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("frame 3"));

        let err = MaxvalError::NoInputRasters {
            dir: PathBuf::from("_gridded_output"),
        };
        assert_eq!(err.category(), ErrorCategory::DataAvailability);
        assert!(err.to_string().contains("_gridded_output"));

        let err = MaxvalError::Geometry("ring not closed".into());
        assert_eq!(err.category(), ErrorCategory::Geometry);
    }
}
