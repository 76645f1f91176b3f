use crate::error::{MaxvalError, MaxvalResult};
use crate::grid::BoundingBox;
use std::path::PathBuf;
use std::str::FromStr;

pub const GRAVITY: f32 = 9.81;

/// Surface elevation above which a cell counts as reached by the flow.
pub const ARRIVAL_THRESHOLD: f32 = 0.01;

/// Depth-max below this marks a cell as never inundated. Kept apart from
/// `ARRIVAL_THRESHOLD`: any wetting vs. hazard-relevant wetting.
pub const DRY_EPSILON: f32 = 1e-5;

/// Peak times only re-arm within this many time units of the last re-arm.
pub const DEFAULT_RECENCY_WINDOW: f64 = 60.0;

/// Initial depth-min; cells still holding it were never written.
pub const DEPTH_MIN_FILL: f32 = 99999.0;

pub const DEFAULT_RHO_FLUID: f32 = 1000.0;
pub const DEFAULT_RHO_SOLID: f32 = 2700.0;

// Band layout of the gridded per-timestep rasters (1-based)
pub const BAND_DEPTH: usize = 1;
pub const BAND_FLUX_X: usize = 2;
pub const BAND_FLUX_Y: usize = 3;
pub const BAND_SOLID_FLUX: usize = 4;
pub const BAND_SURFACE_ELEVATION: usize = 8;
pub const BAND_LEVEL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Densities {
    pub rho_fluid: f32,
    pub rho_solid: f32,
}

impl Default for Densities {
    fn default() -> Self {
        Densities {
            rho_fluid: DEFAULT_RHO_FLUID,
            rho_solid: DEFAULT_RHO_SOLID,
        }
    }
}

/// Summary quantity used to delineate the extent polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentQuantity {
    Depth,
    Momentum,
    Velocity,
}

impl FromStr for ExtentQuantity {
    type Err = MaxvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "depth" | "height" => Ok(ExtentQuantity::Depth),
            "momentum" => Ok(ExtentQuantity::Momentum),
            "velocity" => Ok(ExtentQuantity::Velocity),
            other => Err(MaxvalError::configuration(format!(
                "unknown extent quantity '{other}', expected depth, momentum or velocity"
            ))),
        }
    }
}

// Output format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    GeoTiff,
    NetCdf,
    Both,
}

impl OutputFormat {
    pub fn geotiff(&self) -> bool {
        matches!(self, OutputFormat::GeoTiff | OutputFormat::Both)
    }

    pub fn netcdf(&self) -> bool {
        matches!(self, OutputFormat::NetCdf | OutputFormat::Both)
    }
}

impl FromStr for OutputFormat {
    type Err = MaxvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "geotiff" | "tif" | "tiff" => Ok(OutputFormat::GeoTiff),
            "netcdf" | "nc" => Ok(OutputFormat::NetCdf),
            "both" => Ok(OutputFormat::Both),
            other => Err(MaxvalError::configuration(format!(
                "unknown output format '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtentConfig {
    pub quantity: ExtentQuantity,
    pub threshold: f32,
    pub out_file: PathBuf,
}

/// Everything a single reduction run needs, resolved from the command line
/// and the run's data files.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub gridded_dir: PathBuf,
    pub output_dir: PathBuf,
    pub out_file: PathBuf,
    pub densities: Densities,
    pub epsg: Option<u32>,
    pub bbox: Option<BoundingBox>,
    pub frames: Option<Vec<u32>>,
    pub write_froude: bool,
    pub extent: Option<ExtentConfig>,
    pub format: OutputFormat,
    pub diagnostics: Option<PathBuf>,
    pub recency_window: f64,
    pub num_threads: usize,
}

impl RunConfig {
    pub fn validate(&self) -> MaxvalResult<()> {
        if !(self.recency_window > 0.0) {
            return Err(MaxvalError::configuration(format!(
                "recency window must be positive, got {}",
                self.recency_window
            )));
        }
        if self.num_threads == 0 {
            return Err(MaxvalError::configuration("num_threads must be at least 1"));
        }
        let d = &self.densities;
        if !(d.rho_fluid > 0.0 && d.rho_solid > 0.0) {
            return Err(MaxvalError::configuration(format!(
                "densities must be positive: rho_f={} rho_s={}",
                d.rho_fluid, d.rho_solid
            )));
        }
        Ok(())
    }
}
