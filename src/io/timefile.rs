use crate::error::{MaxvalError, MaxvalResult};
use std::path::Path;

/// Read the simulation time from a `fort.tNNNN` file: the first
/// whitespace-delimited token of the first line.
pub fn read_frame_time(path: &Path) -> MaxvalResult<f64> {
    let content = std::fs::read_to_string(path).map_err(|e| MaxvalError::TimeFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_frame_time(&content).map_err(|reason| MaxvalError::TimeFile {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_frame_time(content: &str) -> Result<f64, String> {
    let token = content
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .ok_or_else(|| "file is empty".to_string())?;

    // Fortran may write double precision exponents as `D`.
    let time = token
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .map_err(|e| format!("cannot parse time '{token}': {e}"))?;

    if !time.is_finite() || time < 0.0 {
        return Err(format!("time must be finite and non-negative, got {time}"));
    }
    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clawpack_time_file() {
        let content = "    0.120000000000E+03    time\n                     6    meqn\n";
        assert_eq!(parse_frame_time(content).unwrap(), 120.0);
        assert_eq!(parse_frame_time("0.5D+01 time").unwrap(), 5.0);
    }

    #[test]
    fn test_parse_rejects_bad_content() {
        assert!(parse_frame_time("").is_err());
        assert!(parse_frame_time("\n1.0 time").is_err());
        assert!(parse_frame_time("time 1.0").is_err());
        assert!(parse_frame_time("-3.0 time").is_err());
    }

    #[test]
    fn test_missing_file_is_time_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_frame_time(&dir.path().join("fort.t0001")).unwrap_err();
        assert!(matches!(err, MaxvalError::TimeFile { .. }));
    }

    #[test]
    fn test_read_frame_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.t0003");
        std::fs::write(&path, "  3.6E+03  time\n").unwrap();
        assert_eq!(read_frame_time(&path).unwrap(), 3600.0);
    }
}
