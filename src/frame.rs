use crate::config::{Densities, GRAVITY};
use crate::error::{MaxvalError, MaxvalResult};
use crate::grid::Grid;
use ndarray::{Array2, Zip};

/// Identifier of one simulation output, the `NNNN` in `fort_qNNNN`.
pub type FrameId = u32;

/// One simulation snapshot on the run grid.
#[derive(Debug, Clone)]
pub struct TimestepFrame {
    pub id: FrameId,
    pub time: f64,
    pub grid: Grid,
    pub depth: Array2<f32>,
    pub flux_x: Array2<f32>,
    pub flux_y: Array2<f32>,
    pub solid_flux: Array2<f32>,
    pub surface_elevation: Array2<f32>,
    pub level: Array2<i32>,
}

impl TimestepFrame {
    pub fn shape(&self) -> (usize, usize) {
        self.depth.dim()
    }

    /// Every band must match the frame's grid.
    pub fn check_shape(&self) -> MaxvalResult<()> {
        check_shapes(
            self.id,
            self.grid.shape(),
            &[
                self.depth.dim(),
                self.flux_x.dim(),
                self.flux_y.dim(),
                self.solid_flux.dim(),
                self.surface_elevation.dim(),
                self.level.dim(),
            ],
        )
    }

    /// Highest refinement level present anywhere in the frame.
    pub fn max_level(&self) -> i32 {
        self.level.iter().copied().max().unwrap_or(0)
    }
}

/// Per-cell physical quantities derived from one frame.
#[derive(Debug, Clone)]
pub struct DerivedQuantities {
    pub solid_fraction: Array2<f32>,
    pub velocity: Array2<f32>,
    pub froude: Array2<f32>,
    pub momentum_flux: Array2<f32>,
}

impl DerivedQuantities {
    pub fn compute(frame: &TimestepFrame, densities: &Densities) -> MaxvalResult<Self> {
        frame.check_shape()?;
        let dim = frame.shape();
        let cell_area = frame.grid.transform.cell_area() as f32;
        let mut solid_fraction = Array2::<f32>::zeros(dim);
        let mut velocity = Array2::<f32>::zeros(dim);
        let mut froude = Array2::<f32>::zeros(dim);
        let mut momentum_flux = Array2::<f32>::zeros(dim);

        Zip::from(&mut velocity)
            .and(&mut froude)
            .and(&frame.depth)
            .and(&frame.flux_x)
            .and(&frame.flux_y)
            .for_each(|vel, fr, &h, &hu, &hv| {
                *vel = velocity_of(h, hu, hv);
                *fr = froude_of(h, *vel);
            });
        Zip::from(&mut solid_fraction)
            .and(&frame.solid_flux)
            .and(&frame.depth)
            .for_each(|m, &hm, &h| *m = checked_ratio(hm, h));

        Zip::from(&mut momentum_flux)
            .and(&frame.depth)
            .and(&solid_fraction)
            .and(&velocity)
            .for_each(|mom, &h, &m, &vel| {
                let density = (1.0 - m) * densities.rho_fluid + m * densities.rho_solid;
                *mom = finite_or_zero(h * cell_area * density * vel);
            });

        Ok(DerivedQuantities {
            solid_fraction,
            velocity,
            froude,
            momentum_flux,
        })
    }

    pub fn check_shape(&self, frame: FrameId, expected: (usize, usize)) -> MaxvalResult<()> {
        check_shapes(
            frame,
            expected,
            &[
                self.solid_fraction.dim(),
                self.velocity.dim(),
                self.froude.dim(),
                self.momentum_flux.dim(),
            ],
        )
    }
}

fn check_shapes(
    frame: FrameId,
    expected: (usize, usize),
    shapes: &[(usize, usize)],
) -> MaxvalResult<()> {
    match shapes.iter().find(|&&s| s != expected) {
        Some(&actual) => Err(MaxvalError::ShapeMismatch {
            frame,
            expected,
            actual,
        }),
        None => Ok(()),
    }
}

/// `num / den`, or 0 when the quotient is undefined.
fn checked_ratio(num: f32, den: f32) -> f32 {
    if den == 0.0 {
        return 0.0;
    }
    finite_or_zero(num / den)
}

fn velocity_of(h: f32, hu: f32, hv: f32) -> f32 {
    let u = checked_ratio(hu, h);
    let v = checked_ratio(hv, h);
    finite_or_zero((u * u + v * v).sqrt())
}

fn froude_of(h: f32, vel: f32) -> f32 {
    if h <= 0.0 {
        return 0.0;
    }
    finite_or_zero(vel / (GRAVITY * h).sqrt())
}

fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() { x } else { 0.0 }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::grid::GeoTransform;
    use ndarray::array;

    /// Frame over a 1x2 grid with unit cells.
    pub(crate) fn frame_1x2(
        id: FrameId,
        time: f64,
        depth: [f32; 2],
        eta: [f32; 2],
        level: [i32; 2],
    ) -> TimestepFrame {
        TimestepFrame {
            id,
            time,
            grid: Grid::new(1, 2, GeoTransform::default()),
            depth: array![[depth[0], depth[1]]],
            flux_x: array![[depth[0], 0.0]],
            flux_y: Array2::zeros((1, 2)),
            solid_flux: Array2::zeros((1, 2)),
            surface_elevation: array![[eta[0], eta[1]]],
            level: array![[level[0], level[1]]],
        }
    }

    #[test]
    fn test_zero_depth_is_safe() {
        let mut frame = frame_1x2(1, 0.0, [0.0, 2.0], [0.0, 0.0], [1, 1]);
        frame.flux_x = array![[3.0, 4.0]];
        frame.flux_y = array![[1.0, 6.0]];
        frame.solid_flux = array![[5.0, 1.0]];

        let d = DerivedQuantities::compute(&frame, &Densities::default()).unwrap();
        assert_eq!(d.solid_fraction[[0, 0]], 0.0);
        assert_eq!(d.velocity[[0, 0]], 0.0);
        assert_eq!(d.froude[[0, 0]], 0.0);
        assert_eq!(d.momentum_flux[[0, 0]], 0.0);
        assert!(d.solid_fraction.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_derived_values() {
        let mut frame = frame_1x2(1, 0.0, [2.0, 0.0], [0.0, 0.0], [1, 1]);
        frame.grid.transform = GeoTransform([0.0, 2.0, 0.0, 0.0, 0.0, -2.0]);
        frame.flux_x = array![[6.0, 0.0]];
        frame.flux_y = array![[8.0, 0.0]];
        frame.solid_flux = array![[1.0, 0.0]];

        let densities = Densities {
            rho_fluid: 1000.0,
            rho_solid: 3000.0,
        };
        let d = DerivedQuantities::compute(&frame, &densities).unwrap();

        // u = 3, v = 4
        assert!((d.velocity[[0, 0]] - 5.0).abs() < 1e-6);
        assert!((d.solid_fraction[[0, 0]] - 0.5).abs() < 1e-6);
        let froude = 5.0 / (9.81f32 * 2.0).sqrt();
        assert!((d.froude[[0, 0]] - froude).abs() < 1e-5);
        // h * area * density * vel = 2 * 4 * 2000 * 5
        assert!((d.momentum_flux[[0, 0]] - 80_000.0).abs() < 1e-2);
    }

    #[test]
    fn test_mismatched_band_is_shape_error() {
        let mut frame = frame_1x2(4, 0.0, [1.0, 0.0], [0.0, 0.0], [1, 1]);
        frame.flux_x = Array2::zeros((1, 3));
        let err = DerivedQuantities::compute(&frame, &Densities::default()).unwrap_err();
        assert!(matches!(
            err,
            MaxvalError::ShapeMismatch {
                frame: 4,
                expected: (1, 2),
                actual: (1, 3),
            }
        ));
    }

    #[test]
    fn test_max_level() {
        let frame = frame_1x2(1, 0.0, [0.0, 0.0], [0.0, 0.0], [1, 3]);
        assert_eq!(frame.max_level(), 3);
    }
}
