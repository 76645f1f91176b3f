pub mod clawdata;
pub mod csv;
pub mod geojson;
#[cfg(feature = "netcdf")]
pub mod netcdf;
pub mod raster;
pub mod source;
pub mod timefile;
