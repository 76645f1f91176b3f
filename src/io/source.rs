use crate::config::{
    BAND_DEPTH, BAND_FLUX_X, BAND_FLUX_Y, BAND_LEVEL, BAND_SOLID_FLUX, BAND_SURFACE_ELEVATION,
};
use crate::error::{MaxvalError, MaxvalResult};
use crate::frame::{FrameId, TimestepFrame};
use crate::grid::BoundingBox;
use crate::io::raster::read_bands;
use crate::io::timefile::read_frame_time;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const RASTER_PREFIX: &str = "fort_q";
const TIME_PREFIX: &str = "fort.t";

/// Supplier of the per-timestep frames of one run.
pub trait FrameSource: Send + Sync {
    /// Frame identifiers in increasing timestep order.
    fn list_timesteps(&self) -> MaxvalResult<Vec<FrameId>>;

    fn load_frame(&self, id: FrameId) -> MaxvalResult<TimestepFrame>;
}

/// Files belonging to one gridded timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepFiles {
    pub raster: PathBuf,
    pub time_file: PathBuf,
}

/// Gridded `fort_qNNNN.tif` rasters plus their `fort.tNNNN` time files.
#[derive(Debug, Clone)]
pub struct GriddedRun {
    timesteps: BTreeMap<FrameId, TimestepFiles>,
    bbox: Option<BoundingBox>,
}

impl GriddedRun {
    /// Discover the timesteps of a run. Time files are looked up beside the
    /// raster first, then in the simulation output directory.
    pub fn discover(
        gridded_dir: &Path,
        output_dir: &Path,
        bbox: Option<BoundingBox>,
    ) -> MaxvalResult<Self> {
        let mut timesteps = BTreeMap::new();
        let entries = std::fs::read_dir(gridded_dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MaxvalError::NoInputRasters {
                    dir: gridded_dir.to_path_buf(),
                }
            } else {
                MaxvalError::Io(e)
            }
        })?;

        for entry in entries {
            let path = entry?.path();
            let Some(digits) = frame_digits(&path) else {
                continue;
            };
            let Ok(id) = digits.parse::<FrameId>() else {
                continue;
            };
            let time_name = format!("{TIME_PREFIX}{digits}");
            let beside = gridded_dir.join(&time_name);
            let time_file = if beside.exists() {
                beside
            } else {
                output_dir.join(&time_name)
            };
            timesteps.insert(
                id,
                TimestepFiles {
                    raster: path,
                    time_file,
                },
            );
        }

        if timesteps.is_empty() {
            return Err(MaxvalError::NoInputRasters {
                dir: gridded_dir.to_path_buf(),
            });
        }
        debug!(
            "discovered {} gridded timesteps in {}",
            timesteps.len(),
            gridded_dir.display()
        );
        Ok(GriddedRun { timesteps, bbox })
    }

    pub fn files(&self, id: FrameId) -> Option<&TimestepFiles> {
        self.timesteps.get(&id)
    }
}

impl FrameSource for GriddedRun {
    fn list_timesteps(&self) -> MaxvalResult<Vec<FrameId>> {
        Ok(self.timesteps.keys().copied().collect())
    }

    fn load_frame(&self, id: FrameId) -> MaxvalResult<TimestepFrame> {
        let files = self.timesteps.get(&id).ok_or_else(|| {
            MaxvalError::configuration(format!("frame {id} is not part of this run"))
        })?;
        let time = read_frame_time(&files.time_file)?;

        let bands = [
            BAND_DEPTH,
            BAND_FLUX_X,
            BAND_FLUX_Y,
            BAND_SOLID_FLUX,
            BAND_SURFACE_ELEVATION,
            BAND_LEVEL,
        ];
        let (grid, arrays) = read_bands(&files.raster, &bands, self.bbox.as_ref())?;
        let [depth, flux_x, flux_y, solid_flux, surface_elevation, level]: [_; 6] =
            arrays.try_into().map_err(|got: Vec<_>| MaxvalError::Raster {
                path: files.raster.clone(),
                reason: format!("expected {} bands, read {}", bands.len(), got.len()),
            })?;

        Ok(TimestepFrame {
            id,
            time,
            grid,
            depth,
            flux_x,
            flux_y,
            solid_flux,
            surface_elevation,
            level: level.mapv(|v| if v.is_finite() { v.round() as i32 } else { 0 }),
        })
    }
}

/// The `NNNN` of a `fort_qNNNN.tif` path.
fn frame_digits(path: &Path) -> Option<&str> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("tif") && !ext.eq_ignore_ascii_case("tiff") {
        return None;
    }
    let digits = path.file_stem()?.to_str()?.strip_prefix(RASTER_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits)
}

/// Restrict `available` to the requested frame numbers, keeping order.
pub fn select_frames(
    available: Vec<FrameId>,
    requested: Option<&[FrameId]>,
    dir: &Path,
) -> MaxvalResult<Vec<FrameId>> {
    let Some(requested) = requested else {
        return Ok(available);
    };
    let selected: Vec<FrameId> = available
        .into_iter()
        .filter(|id| requested.contains(id))
        .collect();
    if selected.is_empty() {
        return Err(MaxvalError::NoFramesSelected {
            dir: dir.to_path_buf(),
            requested: requested.to_vec(),
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_frame_digits() {
        assert_eq!(frame_digits(Path::new("g/fort_q0012.tif")), Some("0012"));
        assert_eq!(frame_digits(Path::new("fort_q0001.TIF")), Some("0001"));
        assert_eq!(frame_digits(Path::new("fort_q0001.tif.aux.xml")), None);
        assert_eq!(frame_digits(Path::new("maxval.tif")), None);
        assert_eq!(frame_digits(Path::new("fort_q.tif")), None);
        assert_eq!(frame_digits(Path::new("fort_q00a1.tif")), None);
    }

    #[test]
    fn test_discover_orders_by_frame_number() {
        let gridded = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for name in ["fort_q0010.tif", "fort_q0002.tif", "fort_q0001.tif", "notes.txt"] {
            touch(gridded.path(), name);
        }
        touch(gridded.path(), "fort.t0002");

        let run = GriddedRun::discover(gridded.path(), output.path(), None).unwrap();
        assert_eq!(run.list_timesteps().unwrap(), vec![1, 2, 10]);
        assert_eq!(
            run.files(2).unwrap().time_file,
            gridded.path().join("fort.t0002")
        );
        assert_eq!(
            run.files(10).unwrap().time_file,
            output.path().join("fort.t0010")
        );
    }

    #[test]
    fn test_discover_empty_dir() {
        let gridded = tempfile::tempdir().unwrap();
        let err = GriddedRun::discover(gridded.path(), gridded.path(), None).unwrap_err();
        assert!(matches!(err, MaxvalError::NoInputRasters { .. }));

        let missing = gridded.path().join("nope");
        let err = GriddedRun::discover(&missing, gridded.path(), None).unwrap_err();
        assert!(matches!(err, MaxvalError::NoInputRasters { .. }));
    }

    #[test]
    fn test_missing_time_file_fails_load() {
        let gridded = tempfile::tempdir().unwrap();
        touch(gridded.path(), "fort_q0001.tif");
        let run = GriddedRun::discover(gridded.path(), gridded.path(), None).unwrap();
        let err = run.load_frame(1).unwrap_err();
        assert!(matches!(err, MaxvalError::TimeFile { .. }));
    }

    #[test]
    fn test_select_frames() {
        let dir = Path::new("_gridded_output");
        let all = vec![1, 2, 3, 5];
        assert_eq!(select_frames(all.clone(), None, dir).unwrap(), all);
        assert_eq!(
            select_frames(all.clone(), Some(&[5, 2, 9]), dir).unwrap(),
            vec![2, 5]
        );
        let err = select_frames(all, Some(&[7]), dir).unwrap_err();
        assert!(matches!(err, MaxvalError::NoFramesSelected { .. }));
    }
}
