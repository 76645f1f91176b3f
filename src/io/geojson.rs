use crate::error::MaxvalResult;
use crate::extent::ExtentGeometry;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Render the extent as a single-feature GeoJSON FeatureCollection.
pub fn extent_feature_collection(geometry: &ExtentGeometry, epsg: Option<u32>) -> Value {
    let polygons: Vec<Value> = geometry
        .polygons
        .iter()
        .map(|polygon| {
            let rings: Vec<Value> = std::iter::once(&polygon.exterior)
                .chain(polygon.interiors.iter())
                .map(|ring| {
                    let coords: Vec<[f64; 2]> = ring.iter().map(|&(x, y)| [x, y]).collect();
                    json!(coords)
                })
                .collect();
            Value::Array(rings)
        })
        .collect();

    let geometry = match polygons.as_slice() {
        [single] => json!({ "type": "Polygon", "coordinates": single }),
        _ => json!({ "type": "MultiPolygon", "coordinates": polygons }),
    };

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": geometry,
        }],
    });
    if let Some(code) = epsg {
        collection["crs"] = json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{code}") },
        });
    }
    collection
}

pub fn write_extent(path: &Path, geometry: &ExtentGeometry, epsg: Option<u32>) -> MaxvalResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_extent_to(&mut writer, geometry, epsg)
}

fn write_extent_to<W: Write>(
    writer: &mut W,
    geometry: &ExtentGeometry,
    epsg: Option<u32>,
) -> MaxvalResult<()> {
    serde_json::to_writer_pretty(&mut *writer, &extent_feature_collection(geometry, epsg))?;
    writer.flush()?;
    Ok(())
}
