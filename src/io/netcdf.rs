use crate::error::MaxvalResult;
use crate::grid::Grid;
use crate::state::SummaryBand;
use chrono::Utc;
use std::path::Path;

// Function to write the summary bands to NetCDF
pub fn write_netcdf_summary(
    path: &Path,
    grid: &Grid,
    bands: &[SummaryBand],
    epsg: Option<u32>,
    frames_folded: usize,
) -> MaxvalResult<()> {
    let mut file = netcdf::create(path)?;

    file.add_dimension("y", grid.rows)?;
    file.add_dimension("x", grid.cols)?;

    // Cell-centre coordinates of a north-up grid
    let t = &grid.transform;
    let xs: Vec<f64> = (0..grid.cols)
        .map(|c| t.apply(c as f64 + 0.5, 0.5).0)
        .collect();
    let ys: Vec<f64> = (0..grid.rows)
        .map(|r| t.apply(0.5, r as f64 + 0.5).1)
        .collect();

    let mut x_var = file.add_variable::<f64>("x", &["x"])?;
    x_var.put_attribute("long_name", "x coordinate of cell centre")?;
    x_var.put_values(&xs, ..)?;

    let mut y_var = file.add_variable::<f64>("y", &["y"])?;
    y_var.put_attribute("long_name", "y coordinate of cell centre")?;
    y_var.put_values(&ys, ..)?;

    for band in bands {
        let mut var = file.add_variable::<f32>(band.name, &["y", "x"])?;
        var.put_attribute("_FillValue", f32::NAN)?;
        var.put_attribute("long_name", band.long_name)?;
        var.put_attribute("units", band.units)?;
        let data: Vec<f32> = band.data.iter().copied().collect();
        var.put_values(&data, ..)?;
    }

    // Global attributes
    file.add_attribute("TITLE", "OUTPUT FROM MAXVAL_RS")?;
    file.add_attribute("GeoTransform", grid.transform.0.to_vec())?;
    if let Some(code) = epsg {
        file.add_attribute("crs", format!("EPSG:{code}"))?;
    }
    file.add_attribute("frames_folded", frames_folded as u64)?;
    file.add_attribute("date_created", Utc::now().to_rfc3339())?;
    file.add_attribute("code_version", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;
    use ndarray::array;

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maxval.nc");
        let grid = Grid::new(2, 2, GeoTransform([10.0, 2.0, 0.0, 20.0, 0.0, -2.0]));
        let bands = vec![SummaryBand {
            name: "depth_max",
            long_name: "maximum flow depth",
            units: "m",
            data: array![[1.0, f32::NAN], [0.5, 2.0]],
        }];
        write_netcdf_summary(&path, &grid, &bands, Some(32610), 4).unwrap();

        let file = netcdf::open(&path).unwrap();
        let xs: Vec<f64> = file.variable("x").unwrap().get_values(..).unwrap();
        assert_eq!(xs, vec![11.0, 13.0]);
        let ys: Vec<f64> = file.variable("y").unwrap().get_values(..).unwrap();
        assert_eq!(ys, vec![19.0, 17.0]);
        let depth: Vec<f32> = file.variable("depth_max").unwrap().get_values(..).unwrap();
        assert_eq!(depth[0], 1.0);
        assert!(depth[1].is_nan());
        assert_eq!(depth[3], 2.0);
    }
}
