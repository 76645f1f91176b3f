//! Readers for the Clawpack `*.data` parameter files written by `setrun.py`.
//!
//! Each parameter line has the form `value(s)   =: name`; `#` starts a
//! comment line.

use crate::config::Densities;
use crate::error::{MaxvalError, MaxvalResult};
use crate::grid::BoundingBox;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

pub const DIG_DATA_FILE: &str = "setdig.data";
pub const REGIONS_DATA_FILE: &str = "regions.data";

/// One named parameter line, with its 1-based line number.
#[derive(Debug, Clone, PartialEq)]
struct DataLine<'a> {
    line: usize,
    values: Vec<&'a str>,
    name: &'a str,
}

fn data_lines(content: &str) -> impl Iterator<Item = DataLine<'_>> {
    content.lines().enumerate().filter_map(|(idx, raw)| {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let (values, name) = trimmed.split_once("=:")?;
        Some(DataLine {
            line: idx + 1,
            values: values.split_whitespace().collect(),
            name: name.split_whitespace().next().unwrap_or_default(),
        })
    })
}

fn parse_number<T: std::str::FromStr>(path: &Path, line: usize, token: &str) -> MaxvalResult<T>
where
    T::Err: std::fmt::Display,
{
    token
        .replace(['D', 'd'], "E")
        .parse::<T>()
        .map_err(|e| MaxvalError::DataFile {
            path: path.to_path_buf(),
            line,
            reason: format!("cannot parse '{token}': {e}"),
        })
}

/// Named scalar parameters of a data file.
fn scalar_parameters(path: &Path, content: &str) -> MaxvalResult<HashMap<String, f64>> {
    let mut params = HashMap::new();
    for entry in data_lines(content) {
        if let [value] = entry.values.as_slice() {
            // Non-numeric scalars (booleans, file names) are not needed here.
            if let Ok(v) = parse_number::<f64>(path, entry.line, value) {
                params.insert(entry.name.to_string(), v);
            }
        }
    }
    Ok(params)
}

/// Fluid and solid densities from `setdig.data`, if the file exists.
pub fn read_densities(output_dir: &Path) -> MaxvalResult<Option<Densities>> {
    let path = output_dir.join(DIG_DATA_FILE);
    if !path.exists() {
        warn!("{} not found, using default densities", path.display());
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let params = scalar_parameters(&path, &content)?;

    let get = |name: &str| {
        params
            .get(name)
            .map(|v| *v as f32)
            .ok_or_else(|| MaxvalError::DataFile {
                path: path.clone(),
                line: 0,
                reason: format!("parameter '{name}' missing"),
            })
    };
    let densities = Densities {
        rho_fluid: get("rho_f")?,
        rho_solid: get("rho_s")?,
    };
    debug!("densities from {}: {:?}", path.display(), densities);
    Ok(Some(densities))
}

/// AMR refinement region from `regions.data`.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub min_level: i32,
    pub max_level: i32,
    pub t1: f64,
    pub t2: f64,
    pub bbox: BoundingBox,
}

pub fn read_regions(output_dir: &Path) -> MaxvalResult<Vec<Region>> {
    let path = output_dir.join(REGIONS_DATA_FILE);
    let content = std::fs::read_to_string(&path)?;
    parse_regions(&path, &content)
}

fn parse_regions(path: &Path, content: &str) -> MaxvalResult<Vec<Region>> {
    let header = data_lines(content)
        .find(|l| l.name == "num_regions")
        .ok_or_else(|| MaxvalError::DataFile {
            path: path.to_path_buf(),
            line: 0,
            reason: "num_regions not found".into(),
        })?;
    let count: usize = match header.values.as_slice() {
        [n] => parse_number(path, header.line, n)?,
        _ => {
            return Err(MaxvalError::DataFile {
                path: path.to_path_buf(),
                line: header.line,
                reason: "num_regions takes one value".into(),
            });
        }
    };

    let rows = content
        .lines()
        .enumerate()
        .skip(header.line)
        .filter(|(_, l)| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .take(count);

    let mut regions = Vec::with_capacity(count);
    for (idx, row) in rows {
        let line = idx + 1;
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() < 8 {
            return Err(MaxvalError::DataFile {
                path: path.to_path_buf(),
                line,
                reason: format!("expected 8 region fields, found {}", fields.len()),
            });
        }
        let num = |i: usize| parse_number::<f64>(path, line, fields[i]);
        let bbox = BoundingBox::new(num(4)?, num(5)?, num(6)?, num(7)?)?;
        regions.push(Region {
            min_level: parse_number(path, line, fields[0])?,
            max_level: parse_number(path, line, fields[1])?,
            t1: num(2)?,
            t2: num(3)?,
            bbox,
        });
    }

    if regions.len() != count {
        return Err(MaxvalError::DataFile {
            path: path.to_path_buf(),
            line: header.line,
            reason: format!("num_regions is {count} but {} regions follow", regions.len()),
        });
    }
    Ok(regions)
}

/// Region `index` (0-based, in file order).
pub fn region(output_dir: &Path, index: usize) -> MaxvalResult<Region> {
    let mut regions = read_regions(output_dir)?;
    if index < regions.len() {
        return Ok(regions.swap_remove(index));
    }
    Err(MaxvalError::configuration(format!(
        "region {index} requested but {} defines {} regions",
        REGIONS_DATA_FILE,
        regions.len()
    )))
}
