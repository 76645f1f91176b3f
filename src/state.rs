use crate::config::{
    ARRIVAL_THRESHOLD, DEPTH_MIN_FILL, DRY_EPSILON, Densities, ExtentQuantity,
};
use crate::error::{MaxvalError, MaxvalResult};
use crate::frame::{DerivedQuantities, FrameId, TimestepFrame};
use crate::grid::Grid;
use ndarray::{Array2, Zip};

/// Time value of a cell the flow has not reached yet.
pub const NOT_ARRIVED: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Max,
    Min,
}

impl Extremum {
    fn wins(self, candidate: f32, current: f32) -> bool {
        match self {
            Extremum::Max => candidate > current,
            Extremum::Min => candidate < current,
        }
    }
}

/// Running extremum of one quantity plus the level that recorded it.
#[derive(Debug, Clone)]
pub struct TrackedQuantity {
    pub value: Array2<f32>,
    pub level: Array2<i32>,
    extremum: Extremum,
}

impl TrackedQuantity {
    pub fn new(dim: (usize, usize), extremum: Extremum, fill: f32) -> Self {
        TrackedQuantity {
            value: Array2::from_elem(dim, fill),
            level: Array2::zeros(dim),
            extremum,
        }
    }

    /// Apply the level-precedence overwrite rule and return the mask of
    /// cells that were written.
    ///
    /// A cell is written when the frame is at least as fine as the recorded
    /// level and its value wins, or when the frame is strictly finer.
    pub fn absorb(&mut self, candidate: &Array2<f32>, level: &Array2<i32>) -> Array2<bool> {
        let extremum = self.extremum;
        let mut overwrite = Array2::from_elem(candidate.dim(), false);
        Zip::from(&mut overwrite)
            .and(&mut self.value)
            .and(&mut self.level)
            .and(candidate)
            .and(level)
            .for_each(|ow, value, rec_level, &new, &lev| {
                *ow = (lev >= *rec_level && extremum.wins(new, *value)) || lev > *rec_level;
                if *ow {
                    *value = new;
                    *rec_level = lev;
                }
            });
        overwrite
    }
}

/// What a single fold observed, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldStats {
    pub frame: FrameId,
    pub time: f64,
    pub max_level: i32,
    pub wet_cells: usize,
    pub new_arrivals: usize,
}

/// Per-cell summary of a whole run, folded one frame at a time.
#[derive(Debug, Clone)]
pub struct SummaryState {
    grid: Grid,
    pub surface_elevation_max: TrackedQuantity,
    pub depth_max: TrackedQuantity,
    pub depth_min: TrackedQuantity,
    pub solid_fraction_max: TrackedQuantity,
    pub velocity_max: TrackedQuantity,
    pub momentum_flux_max: TrackedQuantity,
    pub froude_max: TrackedQuantity,
    pub arrival_time: Array2<f64>,
    pub eta_peak_time: Array2<f64>,
    pub velocity_peak_time: Array2<f64>,
    pub max_level_seen: Array2<i32>,
    recency_window: f64,
    last_time: Option<f64>,
    frames_folded: usize,
    finalized: bool,
}

impl SummaryState {
    pub fn new(grid: Grid, recency_window: f64) -> Self {
        let dim = grid.shape();
        SummaryState {
            grid,
            surface_elevation_max: TrackedQuantity::new(dim, Extremum::Max, 0.0),
            depth_max: TrackedQuantity::new(dim, Extremum::Max, 0.0),
            depth_min: TrackedQuantity::new(dim, Extremum::Min, DEPTH_MIN_FILL),
            solid_fraction_max: TrackedQuantity::new(dim, Extremum::Max, 0.0),
            velocity_max: TrackedQuantity::new(dim, Extremum::Max, 0.0),
            momentum_flux_max: TrackedQuantity::new(dim, Extremum::Max, 0.0),
            froude_max: TrackedQuantity::new(dim, Extremum::Max, 0.0),
            arrival_time: Array2::from_elem(dim, NOT_ARRIVED),
            eta_peak_time: Array2::from_elem(dim, NOT_ARRIVED),
            velocity_peak_time: Array2::from_elem(dim, NOT_ARRIVED),
            max_level_seen: Array2::zeros(dim),
            recency_window,
            last_time: None,
            frames_folded: 0,
            finalized: false,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn frames_folded(&self) -> usize {
        self.frames_folded
    }

    #[cfg(test)]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Time of the most recently folded frame.
    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    /// Derive the frame's quantities and fold it.
    pub fn fold_frame(
        &mut self,
        frame: &TimestepFrame,
        densities: &Densities,
    ) -> MaxvalResult<FoldStats> {
        self.check_frame(frame)?;
        let derived = DerivedQuantities::compute(frame, densities)?;
        self.fold(frame, &derived)
    }

    /// Advance the summary by one frame whose quantities are already derived.
    pub fn fold(
        &mut self,
        frame: &TimestepFrame,
        derived: &DerivedQuantities,
    ) -> MaxvalResult<FoldStats> {
        self.check_frame(frame)?;
        derived.check_shape(frame.id, self.grid.shape())?;

        let time = frame.time;
        let level = &frame.level;
        let maxlevel = frame.max_level();

        Zip::from(&mut self.max_level_seen)
            .and(level)
            .for_each(|seen, &lev| *seen = (*seen).max(lev));

        let overwrite_eta = self
            .surface_elevation_max
            .absorb(&frame.surface_elevation, level);
        self.depth_max.absorb(&frame.depth, level);
        self.depth_min.absorb(&frame.depth, level);
        self.solid_fraction_max.absorb(&derived.solid_fraction, level);
        let overwrite_vel = self.velocity_max.absorb(&derived.velocity, level);
        self.momentum_flux_max.absorb(&derived.momentum_flux, level);
        self.froude_max.absorb(&derived.froude, level);

        let rearm = Zip::from(&overwrite_eta)
            .and(&overwrite_vel)
            .map_collect(|&eta, &vel| (eta, vel));

        let window = self.recency_window;
        let mut new_arrivals = 0usize;
        Zip::from(&mut self.arrival_time)
            .and(&mut self.eta_peak_time)
            .and(&mut self.velocity_peak_time)
            .and(&frame.surface_elevation)
            .and(level)
            .and(&rearm)
            .for_each(|arrival, eta_t, vel_t, &eta, &lev, &(ow_eta, ow_vel)| {
                if eta > ARRIVAL_THRESHOLD && *arrival < 0.0 && lev == maxlevel {
                    *arrival = time;
                    *eta_t = time;
                    *vel_t = time;
                    new_arrivals += 1;
                }
                // Only the first peak after arrival is timed.
                let recent = (time - *eta_t) < window && *arrival >= 0.0;
                if recent && ow_eta {
                    *eta_t = time;
                }
                if recent && ow_vel {
                    *vel_t = time;
                }
            });

        let wet_cells = frame.depth.iter().filter(|&&h| h > DRY_EPSILON).count();

        self.last_time = Some(time);
        self.frames_folded += 1;

        Ok(FoldStats {
            frame: frame.id,
            time,
            max_level: maxlevel,
            wet_cells,
            new_arrivals,
        })
    }

    fn check_frame(&self, frame: &TimestepFrame) -> MaxvalResult<()> {
        if self.finalized {
            return Err(MaxvalError::AlreadyFinalized { frame: frame.id });
        }
        frame.check_shape()?;
        let expected = self.grid.shape();
        if frame.grid.shape() != expected {
            return Err(MaxvalError::ShapeMismatch {
                frame: frame.id,
                expected,
                actual: frame.grid.shape(),
            });
        }
        if let Some(previous) = self.last_time {
            if frame.time < previous {
                return Err(MaxvalError::OutOfOrder {
                    frame: frame.id,
                    time: frame.time,
                    previous,
                });
            }
        }
        Ok(())
    }

    /// Replace never-inundated cells and unset sentinels with NaN.
    ///
    /// Safe to call more than once; later calls find nothing left to mask.
    pub fn finalize(&mut self) {
        let never_inundated = self.depth_max.value.mapv(|h| h < DRY_EPSILON);

        for values in [
            &mut self.depth_max.value,
            &mut self.solid_fraction_max.value,
            &mut self.velocity_max.value,
            &mut self.momentum_flux_max.value,
            &mut self.froude_max.value,
        ] {
            Zip::from(values)
                .and(&never_inundated)
                .for_each(|v, &dry| {
                    if dry {
                        *v = f32::NAN;
                    }
                });
        }

        for times in [
            &mut self.eta_peak_time,
            &mut self.velocity_peak_time,
            &mut self.arrival_time,
        ] {
            Zip::from(times)
                .and(&never_inundated)
                .for_each(|t, &dry| {
                    if dry || *t < 0.0 {
                        *t = f64::NAN;
                    }
                });
        }

        self.depth_min.value.mapv_inplace(|h| {
            if h == DEPTH_MIN_FILL { f32::NAN } else { h }
        });

        self.finalized = true;
    }

    /// Number of cells with a recorded depth after finalization.
    pub fn inundated_cells(&self) -> usize {
        self.depth_max
            .value
            .iter()
            .filter(|h| h.is_finite() && **h >= DRY_EPSILON)
            .count()
    }

    pub fn extent_source(&self, quantity: ExtentQuantity) -> &Array2<f32> {
        match quantity {
            ExtentQuantity::Depth => &self.depth_max.value,
            ExtentQuantity::Momentum => &self.momentum_flux_max.value,
            ExtentQuantity::Velocity => &self.velocity_max.value,
        }
    }

    /// Output bands in file order.
    pub fn summary_bands(&self, write_froude: bool) -> Vec<SummaryBand> {
        let as_f32 = |a: &Array2<f64>| a.mapv(|t| t as f32);
        let mut bands = vec![
            SummaryBand::new("depth_max", "maximum flow depth", "m", self.depth_max.value.clone()),
            SummaryBand::new("velocity_max", "maximum velocity", "m s-1", self.velocity_max.value.clone()),
            SummaryBand::new(
                "momentum_max",
                "maximum momentum flux",
                "kg m s-1",
                self.momentum_flux_max.value.clone(),
            ),
            SummaryBand::new(
                "solid_fraction_max",
                "maximum solid volume fraction",
                "1",
                self.solid_fraction_max.value.clone(),
            ),
            SummaryBand::new("eta_peak_time", "time of first surface elevation peak", "s", as_f32(&self.eta_peak_time)),
            SummaryBand::new("velocity_peak_time", "time of first velocity peak", "s", as_f32(&self.velocity_peak_time)),
            SummaryBand::new(
                "eta_max",
                "maximum surface elevation",
                "m",
                self.surface_elevation_max.value.clone(),
            ),
            SummaryBand::new("level_max", "finest refinement level seen", "1", self.max_level_seen.mapv(|l| l as f32)),
            SummaryBand::new("arrival_time", "inundation arrival time", "s", as_f32(&self.arrival_time)),
            SummaryBand::new("depth_min", "minimum flow depth", "m", self.depth_min.value.clone()),
        ];
        if write_froude {
            bands.push(SummaryBand::new("froude_max", "maximum Froude number", "1", self.froude_max.value.clone()));
        }
        bands
    }
}

/// One output raster band.
#[derive(Debug, Clone)]
pub struct SummaryBand {
    pub name: &'static str,
    pub long_name: &'static str,
    pub units: &'static str,
    pub data: Array2<f32>,
}

impl SummaryBand {
    fn new(name: &'static str, long_name: &'static str, units: &'static str, data: Array2<f32>) -> Self {
        SummaryBand {
            name,
            long_name,
            units,
            data,
        }
    }
}
