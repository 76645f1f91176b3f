use crate::error::{MaxvalError, MaxvalResult};
use crate::grid::GeoTransform;
use ndarray::Array2;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Cells whose value exceeds `threshold`; NaN cells are outside.
pub fn extent_mask(raster: &Array2<f32>, threshold: f32) -> Array2<bool> {
    raster.mapv(|v| v > threshold)
}

pub type Coord = (f64, f64);

/// Closed ring: first and last coordinates are equal.
pub type Ring = Vec<Coord>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtentPolygon {
    pub exterior: Ring,
    pub interiors: Vec<Ring>,
}

impl ExtentPolygon {
    #[cfg(test)]
    fn contains(&self, x: f64, y: f64) -> bool {
        let inside = |ring: &Ring| ring_contains(ring.iter().copied(), x, y);
        inside(&self.exterior) && !self.interiors.iter().any(inside)
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.exterior).abs()
            - self
                .interiors
                .iter()
                .map(|r| signed_area(r).abs())
                .sum::<f64>()
    }
}

/// Merged extent of a mask: one polygon per 4-connected part.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtentGeometry {
    pub polygons: Vec<ExtentPolygon>,
}

impl ExtentGeometry {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    #[cfg(test)]
    fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(x, y))
    }

    pub fn area(&self) -> f64 {
        self.polygons.iter().map(ExtentPolygon::area).sum()
    }

    /// Check the rings form a valid (multi)polygon.
    pub fn validate(&self) -> MaxvalResult<()> {
        for (idx, polygon) in self.polygons.iter().enumerate() {
            check_ring(&polygon.exterior)
                .map_err(|e| MaxvalError::Geometry(format!("polygon {idx} exterior: {e}")))?;
            if signed_area(&polygon.exterior) <= 0.0 {
                return Err(MaxvalError::Geometry(format!(
                    "polygon {idx} exterior is not counter-clockwise"
                )));
            }
            for (h, hole) in polygon.interiors.iter().enumerate() {
                check_ring(hole).map_err(|e| {
                    MaxvalError::Geometry(format!("polygon {idx} interior {h}: {e}"))
                })?;
                if signed_area(hole) >= 0.0 {
                    return Err(MaxvalError::Geometry(format!(
                        "polygon {idx} interior {h} is not clockwise"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Vectorize `raster > threshold` into a validated geometry in world
/// coordinates.
pub fn delineate(
    raster: &Array2<f32>,
    threshold: f32,
    transform: &GeoTransform,
) -> MaxvalResult<ExtentGeometry> {
    let mask = extent_mask(raster, threshold);
    let rings = trace_rings(&mask)?;
    let pixel_polygons = assemble(rings, &label_components(&mask))?;

    let flips = {
        let t = &transform.0;
        t[1] * t[5] - t[2] * t[4] < 0.0
    };
    let to_world = |ring: &[PixelVertex]| -> Ring {
        let mut out: Ring = ring
            .iter()
            .map(|&(c, r)| transform.apply(c as f64, r as f64))
            .collect();
        // Exteriors counter-clockwise, holes clockwise, in world space.
        if flips {
            out.reverse();
        }
        out
    };

    let geometry = ExtentGeometry {
        polygons: pixel_polygons
            .iter()
            .map(|p| ExtentPolygon {
                exterior: to_world(&p.exterior),
                interiors: p.interiors.iter().map(|h| to_world(h)).collect(),
            })
            .collect(),
    };
    geometry.validate()?;
    Ok(geometry)
}

/// Pixel-corner vertex `(col, row)`.
type PixelVertex = (i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn delta(self) -> (i64, i64) {
        match self {
            Dir::East => (1, 0),
            Dir::South => (0, 1),
            Dir::West => (-1, 0),
            Dir::North => (0, -1),
        }
    }

    /// Clockwise turn on screen (rows grow downwards).
    fn right(self) -> Dir {
        match self {
            Dir::East => Dir::South,
            Dir::South => Dir::West,
            Dir::West => Dir::North,
            Dir::North => Dir::East,
        }
    }

    fn left(self) -> Dir {
        self.right().right().right()
    }
}

fn step(v: PixelVertex, d: Dir) -> PixelVertex {
    let (dx, dy) = d.delta();
    (v.0 + dx, v.1 + dy)
}

/// Boundary rings of the mask, each closed and simple, with the true cells
/// on the right-hand side. Diagonal-only contact does not join true cells.
fn trace_rings(mask: &Array2<bool>) -> MaxvalResult<Vec<Vec<PixelVertex>>> {
    let (rows, cols) = mask.dim();
    let inside = |r: i64, c: i64| {
        r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols && mask[[r as usize, c as usize]]
    };

    // Outgoing boundary edges per vertex; at most two (at a saddle).
    let mut edges: BTreeMap<PixelVertex, Vec<Dir>> = BTreeMap::new();
    for ((r, c), &wet) in mask.indexed_iter() {
        if !wet {
            continue;
        }
        let (r, c) = (r as i64, c as i64);
        if !inside(r - 1, c) {
            edges.entry((c, r)).or_default().push(Dir::East);
        }
        if !inside(r, c + 1) {
            edges.entry((c + 1, r)).or_default().push(Dir::South);
        }
        if !inside(r + 1, c) {
            edges.entry((c + 1, r + 1)).or_default().push(Dir::West);
        }
        if !inside(r, c - 1) {
            edges.entry((c, r + 1)).or_default().push(Dir::North);
        }
    }

    let mut used: HashSet<(PixelVertex, Dir)> = HashSet::new();
    let mut rings = Vec::new();

    for (&start_v, dirs) in &edges {
        for &start_d in dirs {
            if used.contains(&(start_v, start_d)) {
                continue;
            }
            let mut ring = vec![start_v];
            let (mut v, mut d) = (start_v, start_d);
            loop {
                used.insert((v, d));
                let next_v = step(v, d);
                let next_d = match edges.get(&next_v).map(Vec::as_slice) {
                    Some([only]) => *only,
                    Some([_, _]) => d.right(),
                    _ => {
                        return Err(MaxvalError::Geometry(format!(
                            "boundary is open at pixel corner {next_v:?}"
                        )));
                    }
                };
                if (next_v, next_d) == (start_v, start_d) {
                    break;
                }
                if used.contains(&(next_v, next_d)) {
                    return Err(MaxvalError::Geometry(format!(
                        "boundary revisits pixel corner {next_v:?}"
                    )));
                }
                ring.push(next_v);
                v = next_v;
                d = next_d;
            }
            for simple in split_at_touches(ring) {
                rings.push(close(drop_collinear(simple)));
            }
        }
    }
    Ok(rings)
}

/// Split a traced boundary where it passes through the same corner twice,
/// so that every resulting ring is simple. The pieces touch at that corner.
fn split_at_touches(ring: Vec<PixelVertex>) -> Vec<Vec<PixelVertex>> {
    let mut pieces = Vec::new();
    let mut path: Vec<PixelVertex> = Vec::with_capacity(ring.len());
    let mut position: HashMap<PixelVertex, usize> = HashMap::new();

    let first = ring[0];
    for v in ring.into_iter().chain(std::iter::once(first)) {
        if let Some(&i) = position.get(&v) {
            let piece = path.split_off(i);
            for u in &piece {
                position.remove(u);
            }
            pieces.push(piece);
        }
        position.insert(v, path.len());
        path.push(v);
    }
    pieces
}

fn drop_collinear(ring: Vec<PixelVertex>) -> Vec<PixelVertex> {
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let (a, b, c) = (ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]);
            (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0) != 0
        })
        .map(|i| ring[i])
        .collect()
}

fn close(mut ring: Vec<PixelVertex>) -> Vec<PixelVertex> {
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    ring
}

struct PixelPolygon {
    exterior: Vec<PixelVertex>,
    interiors: Vec<Vec<PixelVertex>>,
}

fn pixel_area(ring: &[PixelVertex]) -> i64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum::<i64>()
}

/// 4-connected components of the mask, numbered from 1; 0 is outside.
fn label_components(mask: &Array2<bool>) -> Array2<u32> {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut next = 0u32;
    let mut stack = Vec::new();

    for ((r, c), &wet) in mask.indexed_iter() {
        if !wet || labels[[r, c]] != 0 {
            continue;
        }
        next += 1;
        labels[[r, c]] = next;
        stack.push((r, c));
        while let Some((r, c)) = stack.pop() {
            let neighbours = [
                (r.wrapping_sub(1), c),
                (r + 1, c),
                (r, c.wrapping_sub(1)),
                (r, c + 1),
            ];
            for (nr, nc) in neighbours {
                if nr < rows && nc < cols && mask[[nr, nc]] && labels[[nr, nc]] == 0 {
                    labels[[nr, nc]] = next;
                    stack.push((nr, nc));
                }
            }
        }
    }
    labels
}

/// Cell `(col, row)` beside the first edge of `ring`, on the side `turn`
/// points to from the edge direction.
fn cell_beside_first_edge(ring: &[PixelVertex], turn: fn(Dir) -> Dir) -> (i64, i64) {
    let (a, b) = (ring[0], ring[1]);
    let d = match ((b.0 - a.0).signum(), (b.1 - a.1).signum()) {
        (1, 0) => Dir::East,
        (0, 1) => Dir::South,
        (-1, 0) => Dir::West,
        _ => Dir::North,
    };
    let (dx, dy) = d.delta();
    let (sx, sy) = turn(d).delta();
    // Centre is half a step along the edge plus half a step sideways.
    let floor_half = |v: i64| if v < 0 { -1 } else { 0 };
    (a.0 + floor_half(dx + sx), a.1 + floor_half(dy + sy))
}

/// Sort rings into shells and holes and attach each hole to the shell of the
/// wet component bordering it.
///
/// Only when a component's outline was split into several shells is the
/// owner chosen by containment, among that component's shells.
fn assemble(
    rings: Vec<Vec<PixelVertex>>,
    labels: &Array2<u32>,
) -> MaxvalResult<Vec<PixelPolygon>> {
    let label_at = |(c, r): (i64, i64)| -> Option<u32> {
        let (r, c) = (usize::try_from(r).ok()?, usize::try_from(c).ok()?);
        labels.get([r, c]).copied().filter(|&l| l != 0)
    };
    let wet_label = |ring: &[PixelVertex]| {
        let cell = cell_beside_first_edge(ring, Dir::right);
        label_at(cell).ok_or_else(|| {
            MaxvalError::Geometry(format!("ring edge at {:?} does not border a wet cell", ring[0]))
        })
    };

    let (shells, holes): (Vec<_>, Vec<_>) = rings.into_iter().partition(|r| pixel_area(r) > 0);

    let mut shells_of: HashMap<u32, Vec<usize>> = HashMap::new();
    let mut polygons = Vec::with_capacity(shells.len());
    for exterior in shells {
        shells_of
            .entry(wet_label(&exterior)?)
            .or_default()
            .push(polygons.len());
        polygons.push(PixelPolygon {
            exterior,
            interiors: Vec::new(),
        });
    }

    for hole in holes {
        let candidates = shells_of.get(&wet_label(&hole)?).map_or(&[][..], Vec::as_slice);
        let owner = match candidates {
            [only] => Some(*only),
            _ => {
                let (col, row) = cell_beside_first_edge(&hole, Dir::left);
                let (px, py) = (col as f64 + 0.5, row as f64 + 0.5);
                candidates
                    .iter()
                    .copied()
                    .filter(|&i| {
                        let exterior = &polygons[i].exterior;
                        ring_contains(exterior.iter().map(|&(c, r)| (c as f64, r as f64)), px, py)
                    })
                    .min_by_key(|&i| pixel_area(&polygons[i].exterior))
            }
        };
        let owner = owner.ok_or_else(|| {
            MaxvalError::Geometry(format!("hole at {:?} lies outside every shell", hole[0]))
        })?;
        polygons[owner].interiors.push(hole);
    }
    Ok(polygons)
}

/// Even-odd ray casting test over a closed ring.
fn ring_contains(ring: impl IntoIterator<Item = Coord>, x: f64, y: f64) -> bool {
    let mut points = ring.into_iter();
    let Some(mut prev) = points.next() else {
        return false;
    };
    let mut inside = false;
    for next in points {
        let ((x0, y0), (x1, y1)) = (prev, next);
        if (y0 > y) != (y1 > y) && x < x0 + (y - y0) * (x1 - x0) / (y1 - y0) {
            inside = !inside;
        }
        prev = next;
    }
    inside
}

fn signed_area(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum::<f64>()
        / 2.0
}

fn check_ring(ring: &[Coord]) -> Result<(), String> {
    if ring.len() < 4 {
        return Err(format!("ring has {} coordinates, need at least 4", ring.len()));
    }
    if ring.first() != ring.last() {
        return Err("ring is not closed".into());
    }
    if signed_area(ring) == 0.0 {
        return Err("ring has zero area".into());
    }
    let mut seen = HashSet::new();
    for &(x, y) in &ring[..ring.len() - 1] {
        if !seen.insert((x.to_bits(), y.to_bits())) {
            return Err(format!("ring self-intersects at ({x}, {y})"));
        }
    }
    Ok(())
}
