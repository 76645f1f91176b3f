use crate::error::{MaxvalError, MaxvalResult};

/// GDAL-ordered affine transform: `[x0, dx, rot_x, y0, rot_y, dy]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn cell_area(&self) -> f64 {
        (self.0[1] * self.0[5]).abs()
    }

    /// Map pixel-space `(col, row)` to world coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let t = &self.0;
        (
            t[0] + col * t[1] + row * t[2],
            t[3] + col * t[4] + row * t[5],
        )
    }

    /// Transform of a sub-window whose top-left pixel is `(col_off, row_off)`.
    pub fn shifted(&self, col_off: usize, row_off: usize) -> GeoTransform {
        let (x0, y0) = self.apply(col_off as f64, row_off as f64);
        let mut t = self.0;
        t[0] = x0;
        t[3] = y0;
        GeoTransform(t)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }
}

/// Shape and georeferencing shared by every frame of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
}

impl Grid {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform) -> Self {
        Grid {
            rows,
            cols,
            transform,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Spatial sub-region in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, east: f64, south: f64, north: f64) -> MaxvalResult<Self> {
        if !(west < east && south < north) {
            return Err(MaxvalError::configuration(format!(
                "bounding box is empty: west={west} east={east} south={south} north={north}"
            )));
        }
        Ok(BoundingBox {
            west,
            east,
            south,
            north,
        })
    }
}

/// Pixel window of a raster, in the raster's own pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub cols: usize,
    pub rows: usize,
}

impl Window {
    pub fn full(cols: usize, rows: usize) -> Self {
        Window {
            col_off: 0,
            row_off: 0,
            cols,
            rows,
        }
    }

    /// Pixels of a `cols x rows` raster whose cells intersect `bbox`.
    ///
    /// Only north-up transforms are supported for cropping.
    pub fn for_bbox(
        transform: &GeoTransform,
        cols: usize,
        rows: usize,
        bbox: &BoundingBox,
    ) -> MaxvalResult<Self> {
        let t = &transform.0;
        if t[2] != 0.0 || t[4] != 0.0 {
            return Err(MaxvalError::configuration(
                "cannot crop a rotated raster to a bounding box",
            ));
        }
        let to_col = |x: f64| (x - t[0]) / t[1];
        let to_row = |y: f64| (y - t[3]) / t[5];

        let (c0, c1) = ordered(to_col(bbox.west), to_col(bbox.east));
        let (r0, r1) = ordered(to_row(bbox.north), to_row(bbox.south));

        let col_start = c0.floor().max(0.0) as usize;
        let col_end = (c1.ceil().max(0.0) as usize).min(cols);
        let row_start = r0.floor().max(0.0) as usize;
        let row_end = (r1.ceil().max(0.0) as usize).min(rows);

        if col_start >= col_end || row_start >= row_end {
            return Err(MaxvalError::configuration(format!(
                "bounding box {bbox:?} does not overlap the {cols}x{rows} raster"
            )));
        }
        Ok(Window {
            col_off: col_start,
            row_off: row_start,
            cols: col_end - col_start,
            rows: row_end - row_start,
        })
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
