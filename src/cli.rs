use crate::config::{
    DEFAULT_RECENCY_WINDOW, Densities, ExtentConfig, ExtentQuantity, OutputFormat, RunConfig,
};
use crate::error::{MaxvalError, MaxvalResult};
use crate::grid::BoundingBox;
use crate::io::clawdata;
use clap::Parser;
use std::path::PathBuf;
use tracing::{Level, info};

/// Reduce gridded D-Claw output to per-cell maximum values, arrival times
/// and an inundation extent polygon.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Working directory
    #[arg(long = "wdir", default_value = ".")]
    pub wdir: PathBuf,

    /// Directory within wdir containing fort files and *.data files
    #[arg(long = "odir", default_value = "_output")]
    pub odir: PathBuf,

    /// Directory within wdir containing the gridded fort_qNNNN.tif files
    #[arg(long = "gdir", default_value = "_gridded_output")]
    pub gdir: PathBuf,

    /// Output maximum value file name, placed in wdir
    #[arg(long = "outfile", default_value = "maxval.tif")]
    pub outfile: PathBuf,

    /// EPSG code for the output raster and extent
    #[arg(long)]
    pub epsg: Option<u32>,

    /// West extent of bounding box
    #[arg(short, long, allow_negative_numbers = true)]
    pub west: Option<f64>,

    /// East extent of bounding box
    #[arg(short, long, allow_negative_numbers = true)]
    pub east: Option<f64>,

    /// North extent of bounding box
    #[arg(short, long, allow_negative_numbers = true)]
    pub north: Option<f64>,

    /// South extent of bounding box
    #[arg(short, long, allow_negative_numbers = true)]
    pub south: Option<f64>,

    /// AMR region (0-based, regions.data order) to use as the bounding box;
    /// overrides west/east/north/south
    #[arg(short, long)]
    pub region: Option<usize>,

    /// Only fold these frame numbers
    #[arg(long, value_delimiter = ',')]
    pub frames: Option<Vec<u32>>,

    /// Write a froude number maximum band
    #[arg(long)]
    pub write_froude: bool,

    /// Skip writing the extent polygon
    #[arg(long)]
    pub no_extent: bool,

    /// Quantity defining the extent: depth (or height), momentum, velocity
    #[arg(long, default_value = "depth")]
    pub extent_quantity: String,

    /// Threshold; 0 with depth yields the inundated area
    #[arg(long, default_value_t = 0.0)]
    pub extent_threshold: f32,

    /// Extent GeoJSON file name, placed in wdir
    #[arg(long, default_value = "extent.geojson")]
    pub extent_out_file: PathBuf,

    /// Summary raster format: geotiff, netcdf or both
    #[arg(long, default_value = "geotiff")]
    pub format: String,

    /// Write per-frame diagnostics CSV to this file in wdir
    #[arg(long)]
    pub diagnostics: Option<PathBuf>,

    /// Fluid density; defaults to setdig.data
    #[arg(long)]
    pub rho_f: Option<f32>,

    /// Solid density; defaults to setdig.data
    #[arg(long)]
    pub rho_s: Option<f32>,

    /// Time after arrival during which peak times may still move
    #[arg(long, default_value_t = DEFAULT_RECENCY_WINDOW)]
    pub recency_window: f64,

    /// Worker threads for loading frames (default: all cores)
    #[arg(long)]
    pub num_threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

pub fn get_args() -> Args {
    Args::parse()
}

pub fn log_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

impl Args {
    /// Resolve the arguments and the run's data files into a `RunConfig`.
    pub fn into_config(self) -> MaxvalResult<RunConfig> {
        let output_dir = self.wdir.join(&self.odir);

        let bbox = match self.region {
            Some(index) => {
                let region = clawdata::region(&output_dir, index)?;
                info!(
                    "using region {index} (levels {}..={}, t {}..{}) as bounding box: {:?}",
                    region.min_level, region.max_level, region.t1, region.t2, region.bbox
                );
                Some(region.bbox)
            }
            None => match (self.west, self.east, self.south, self.north) {
                (Some(w), Some(e), Some(s), Some(n)) => Some(BoundingBox::new(w, e, s, n)?),
                (None, None, None, None) => None,
                _ => {
                    return Err(MaxvalError::configuration(
                        "west, east, south and north must be given together",
                    ));
                }
            },
        };

        let from_file = clawdata::read_densities(&output_dir)?.unwrap_or_default();
        let densities = Densities {
            rho_fluid: self.rho_f.unwrap_or(from_file.rho_fluid),
            rho_solid: self.rho_s.unwrap_or(from_file.rho_solid),
        };

        let extent = if self.no_extent {
            None
        } else {
            Some(ExtentConfig {
                quantity: self.extent_quantity.parse::<ExtentQuantity>()?,
                threshold: self.extent_threshold,
                out_file: self.wdir.join(&self.extent_out_file),
            })
        };

        let config = RunConfig {
            gridded_dir: self.wdir.join(&self.gdir),
            out_file: self.wdir.join(&self.outfile),
            output_dir,
            densities,
            epsg: self.epsg,
            bbox,
            frames: self.frames,
            write_froude: self.write_froude,
            extent,
            format: self.format.parse::<OutputFormat>()?,
            diagnostics: self.diagnostics.map(|p| self.wdir.join(p)),
            recency_window: self.recency_window,
            num_threads: self.num_threads.unwrap_or_else(num_cpus::get),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("maxval_rs").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let wdir = dir.path().to_str().unwrap();
        let config = parse(&["--wdir", wdir]).into_config().unwrap();
        assert_eq!(config.gridded_dir, dir.path().join("_gridded_output"));
        assert_eq!(config.out_file, dir.path().join("maxval.tif"));
        assert_eq!(config.densities, Densities::default());
        assert_eq!(config.format, OutputFormat::GeoTiff);
        assert_eq!(config.recency_window, DEFAULT_RECENCY_WINDOW);
        let extent = config.extent.unwrap();
        assert_eq!(extent.quantity, ExtentQuantity::Depth);
        assert_eq!(extent.threshold, 0.0);
        assert!(config.bbox.is_none());
        assert!(config.num_threads >= 1);
    }

    #[test]
    fn test_densities_from_setdig_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let odir = dir.path().join("_output");
        std::fs::create_dir(&odir).unwrap();
        std::fs::write(odir.join("setdig.data"), "2500.0 =: rho_s\n1100.0 =: rho_f\n").unwrap();
        let wdir = dir.path().to_str().unwrap();

        let config = parse(&["--wdir", wdir]).into_config().unwrap();
        assert_eq!(config.densities.rho_solid, 2500.0);
        assert_eq!(config.densities.rho_fluid, 1100.0);

        let config = parse(&["--wdir", wdir, "--rho-s", "2000"]).into_config().unwrap();
        assert_eq!(config.densities.rho_solid, 2000.0);
        assert_eq!(config.densities.rho_fluid, 1100.0);
    }

    #[test]
    fn test_bbox_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let wdir = dir.path().to_str().unwrap();
        let config = parse(&[
            "--wdir", wdir, "-w", "-10", "-e", "5", "-s", "-3", "-n", "4", "--frames", "1,3,5",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.bbox, Some(BoundingBox::new(-10.0, 5.0, -3.0, 4.0).unwrap()));
        assert_eq!(config.frames, Some(vec![1, 3, 5]));

        let err = parse(&["--wdir", wdir, "-w", "1"]).into_config().unwrap_err();
        assert!(matches!(err, MaxvalError::Configuration(_)));
    }

    #[test]
    fn test_region_overrides_bbox() {
        let dir = tempfile::tempdir().unwrap();
        let odir = dir.path().join("_output");
        std::fs::create_dir(&odir).unwrap();
        std::fs::write(
            odir.join("regions.data"),
            "1 =: num_regions\n1 4 0.0 1e9 100.0 200.0 10.0 20.0\n",
        )
        .unwrap();
        let wdir = dir.path().to_str().unwrap();
        let config = parse(&["--wdir", wdir, "-w", "0", "-e", "1", "-s", "0", "-n", "1", "-r", "0"])
            .into_config()
            .unwrap();
        assert_eq!(config.bbox.unwrap().west, 100.0);

        let err = parse(&["--wdir", wdir, "-r", "1"]).into_config().unwrap_err();
        assert!(matches!(err, MaxvalError::Configuration(_)));
    }

    #[test]
    fn test_invalid_choices() {
        let dir = tempfile::tempdir().unwrap();
        let wdir = dir.path().to_str().unwrap();
        assert!(
            parse(&["--wdir", wdir, "--extent-quantity", "froude"])
                .into_config()
                .is_err()
        );
        assert!(parse(&["--wdir", wdir, "--format", "shp"]).into_config().is_err());
        assert!(
            parse(&["--wdir", wdir, "--recency-window", "0"])
                .into_config()
                .is_err()
        );
        // An unknown quantity is irrelevant when no extent is written.
        assert!(
            parse(&["--wdir", wdir, "--no-extent", "--extent-quantity", "froude"])
                .into_config()
                .unwrap()
                .extent
                .is_none()
        );
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level("DEBUG"), Level::DEBUG);
        assert_eq!(log_level("bogus"), Level::INFO);
    }
}
