//! GeoTIFF access through GDAL.
//!
//! GDAL needs the system library, so it sits behind the `gdal` feature.
//! Without it every call reports that raster support is unavailable.

use crate::error::MaxvalResult;
use crate::grid::{BoundingBox, Grid};
use crate::state::SummaryBand;
use ndarray::Array2;
use std::path::Path;

#[cfg(feature = "gdal")]
use crate::error::MaxvalError;
#[cfg(feature = "gdal")]
use crate::grid::{GeoTransform, Window};
#[cfg(feature = "gdal")]
use gdal::{Dataset, DriverManager, raster::Buffer, spatial_ref::SpatialRef};

/// Fails when this build cannot read or write GeoTIFF rasters.
#[cfg(feature = "gdal")]
pub fn ensure_available() -> MaxvalResult<()> {
    Ok(())
}

#[cfg(not(feature = "gdal"))]
pub fn ensure_available() -> MaxvalResult<()> {
    Err(unsupported())
}

/// Read 1-based `bands` of a raster, cropped to `bbox` when given.
#[cfg(feature = "gdal")]
pub fn read_bands(
    path: &Path,
    bands: &[usize],
    bbox: Option<&BoundingBox>,
) -> MaxvalResult<(Grid, Vec<Array2<f32>>)> {
    let dataset = Dataset::open(path)?;
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count();
    let transform = GeoTransform(dataset.geo_transform()?);

    let window = match bbox {
        Some(bbox) => Window::for_bbox(&transform, width, height, bbox)?,
        None => Window::full(width, height),
    };

    let mut arrays = Vec::with_capacity(bands.len());
    for &band_idx in bands {
        if band_idx == 0 || band_idx > band_count {
            return Err(MaxvalError::Raster {
                path: path.to_path_buf(),
                reason: format!("band {band_idx} requested, raster has {band_count}"),
            });
        }
        let band = dataset.rasterband(band_idx)?;
        let size = (window.cols, window.rows);
        let buffer = band.read_as::<f32>(
            (window.col_off as isize, window.row_off as isize),
            size,
            size,
            None,
        )?;
        let (_, data) = buffer.into_shape_and_vec();
        let array = Array2::from_shape_vec((window.rows, window.cols), data).map_err(|e| {
            MaxvalError::Raster {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        arrays.push(array);
    }

    let grid = Grid::new(
        window.rows,
        window.cols,
        transform.shifted(window.col_off, window.row_off),
    );
    Ok((grid, arrays))
}

#[cfg(not(feature = "gdal"))]
pub fn read_bands(
    _path: &Path,
    _bands: &[usize],
    _bbox: Option<&BoundingBox>,
) -> MaxvalResult<(Grid, Vec<Array2<f32>>)> {
    Err(unsupported())
}

/// Write `bands` as a float32 GeoTIFF with NaN as no-data.
///
/// The CRS comes from `epsg` when given, otherwise from `template`.
#[cfg(feature = "gdal")]
pub fn write_geotiff(
    path: &Path,
    grid: &Grid,
    bands: &[SummaryBand],
    epsg: Option<u32>,
    template: Option<&Path>,
) -> MaxvalResult<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset =
        driver.create_with_band_type::<f32, _>(path, grid.cols, grid.rows, bands.len())?;
    dataset.set_geo_transform(&grid.transform.0)?;

    match (epsg, template) {
        (Some(code), _) => dataset.set_spatial_ref(&SpatialRef::from_epsg(code)?)?,
        (None, Some(template)) => {
            let wkt = Dataset::open(template)?.projection();
            if !wkt.is_empty() {
                dataset.set_projection(&wkt)?;
            }
        }
        (None, None) => {}
    }

    for (idx, summary) in bands.iter().enumerate() {
        let mut band = dataset.rasterband(idx + 1)?;
        band.set_no_data_value(Some(f64::NAN))?;
        let data: Vec<f32> = summary.data.iter().copied().collect();
        let mut buffer = Buffer::new((grid.cols, grid.rows), data);
        band.write((0, 0), (grid.cols, grid.rows), &mut buffer)?;
    }
    Ok(())
}

#[cfg(not(feature = "gdal"))]
pub fn write_geotiff(
    _path: &Path,
    _grid: &Grid,
    _bands: &[SummaryBand],
    _epsg: Option<u32>,
    _template: Option<&Path>,
) -> MaxvalResult<()> {
    Err(unsupported())
}

#[cfg(not(feature = "gdal"))]
fn unsupported() -> crate::error::MaxvalError {
    crate::error::MaxvalError::Unsupported("reading gridded GeoTIFF rasters needs a build with the `gdal` feature")
}
