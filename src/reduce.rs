use crate::config::Densities;
use crate::error::{MaxvalError, MaxvalResult};
use crate::frame::{DerivedQuantities, FrameId, TimestepFrame};
use crate::io::csv::DiagnosticsWriter;
use crate::io::source::FrameSource;
use crate::state::SummaryState;
use indicatif::ProgressBar;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::io::Write;
use tracing::{debug, info};

/// Parameters of the fold over one run.
#[derive(Debug, Clone, Copy)]
pub struct ReduceOptions {
    pub densities: Densities,
    pub recency_window: f64,
    /// Frames loaded concurrently ahead of the fold.
    pub batch_size: usize,
}

/// Load and derive `ids` on the pool in batches, folding each batch in
/// order, then finalize.
///
/// Loading is parallel; folding is strictly sequential in `ids` order.
pub fn reduce_run<S, W>(
    source: &S,
    ids: &[FrameId],
    options: &ReduceOptions,
    pool: &ThreadPool,
    mut diagnostics: Option<&mut DiagnosticsWriter<W>>,
    pb: &ProgressBar,
) -> MaxvalResult<SummaryState>
where
    S: FrameSource + ?Sized,
    W: Write,
{
    if ids.is_empty() {
        return Err(MaxvalError::configuration("no frames to reduce"));
    }
    let batch_size = options.batch_size.max(1);
    let mut state: Option<SummaryState> = None;

    for batch in ids.chunks(batch_size) {
        let loaded: Vec<(TimestepFrame, DerivedQuantities)> = pool.install(|| {
            batch
                .par_iter()
                .map(|&id| {
                    let frame = source.load_frame(id)?;
                    let derived = DerivedQuantities::compute(&frame, &options.densities)?;
                    Ok((frame, derived))
                })
                .collect::<MaxvalResult<Vec<_>>>()
        })?;

        for (frame, derived) in &loaded {
            // The first frame fixes the grid for the run.
            let state = state.get_or_insert_with(|| {
                info!(
                    "grid established from frame {}: {} rows x {} cols",
                    frame.id, frame.grid.rows, frame.grid.cols
                );
                SummaryState::new(frame.grid, options.recency_window)
            });
            let stats = state.fold(frame, derived)?;
            debug!(
                "folded frame {} at t={} (maxlevel {}, {} new arrivals)",
                stats.frame, stats.time, stats.max_level, stats.new_arrivals
            );
            if let Some(writer) = diagnostics.as_deref_mut() {
                writer.record(&stats)?;
            }
            pb.inc(1);
        }
    }

    let mut state = state.ok_or_else(|| MaxvalError::configuration("no frames were folded"))?;
    state.finalize();
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECENCY_WINDOW;
    use crate::frame::tests::frame_1x2;
    use std::collections::BTreeMap;

    struct MemorySource {
        frames: BTreeMap<FrameId, TimestepFrame>,
    }

    impl MemorySource {
        fn new(frames: Vec<TimestepFrame>) -> Self {
            MemorySource {
                frames: frames.into_iter().map(|f| (f.id, f)).collect(),
            }
        }
    }

    impl FrameSource for MemorySource {
        fn list_timesteps(&self) -> MaxvalResult<Vec<FrameId>> {
            Ok(self.frames.keys().copied().collect())
        }

        fn load_frame(&self, id: FrameId) -> MaxvalResult<TimestepFrame> {
            self.frames
                .get(&id)
                .cloned()
                .ok_or_else(|| MaxvalError::configuration(format!("no frame {id}")))
        }
    }

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    fn options(batch_size: usize) -> ReduceOptions {
        ReduceOptions {
            densities: Densities::default(),
            recency_window: DEFAULT_RECENCY_WINDOW,
            batch_size,
        }
    }

    fn surge_frames() -> Vec<TimestepFrame> {
        vec![
            frame_1x2(1, 0.0, [0.5, 0.0], [0.3, 0.0], [1, 1]),
            frame_1x2(2, 20.0, [1.5, 0.0], [0.8, 0.0], [2, 1]),
            frame_1x2(3, 40.0, [1.0, 0.2], [0.6, 0.3], [2, 2]),
            frame_1x2(4, 200.0, [2.5, 0.1], [1.2, 0.1], [2, 2]),
        ]
    }

    #[test]
    fn test_batching_matches_sequential_fold() {
        let frames = surge_frames();
        let source = MemorySource::new(frames.clone());
        let ids = source.list_timesteps().unwrap();

        let mut expected = SummaryState::new(frames[0].grid, DEFAULT_RECENCY_WINDOW);
        for frame in &frames {
            expected.fold_frame(frame, &Densities::default()).unwrap();
        }
        expected.finalize();

        for batch_size in [1, 3, 8] {
            let state = reduce_run::<_, Vec<u8>>(
                &source,
                &ids,
                &options(batch_size),
                &pool(4),
                None,
                &ProgressBar::hidden(),
            )
            .unwrap();
            assert!(state.is_finalized());
            assert_eq!(state.frames_folded(), 4);
            assert_eq!(state.depth_max.value, expected.depth_max.value);
            assert_eq!(state.arrival_time, expected.arrival_time);
            assert_eq!(state.eta_peak_time, expected.eta_peak_time);
            assert_eq!(state.max_level_seen, expected.max_level_seen);
        }
    }

    #[test]
    fn test_run_results() {
        let source = MemorySource::new(surge_frames());
        let state = reduce_run::<_, Vec<u8>>(
            &source,
            &[1, 2, 3, 4],
            &options(2),
            &pool(2),
            None,
            &ProgressBar::hidden(),
        )
        .unwrap();

        // Level 2 at frame 2 supersedes frame 1; frame 4 wins on value.
        assert_eq!(state.depth_max.value[[0, 0]], 2.5);
        assert_eq!(state.depth_max.level[[0, 0]], 2);
        // Frame 2 is finer than frame 1, so depth-min restarts there.
        assert_eq!(state.depth_min.value[[0, 0]], 1.0);
        // Arrival at frame 1 (level 1 was the finest then); peak re-armed at
        // frame 2, and the late surge at t=200 does not move it.
        assert_eq!(state.arrival_time[[0, 0]], 0.0);
        assert_eq!(state.eta_peak_time[[0, 0]], 20.0);
        assert_eq!(state.surface_elevation_max.value[[0, 0]], 1.2);
        // Second cell reached at frame 3 when it first matched the finest level.
        assert_eq!(state.arrival_time[[0, 1]], 40.0);
    }

    #[test]
    fn test_diagnostics_rows() {
        let source = MemorySource::new(surge_frames());
        let mut writer = DiagnosticsWriter::from_writer(Vec::new());
        reduce_run(
            &source,
            &[1, 2, 3, 4],
            &options(2),
            &pool(2),
            Some(&mut writer),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().nth(3).unwrap().starts_with("3,40.0,2,2,1,2"));
    }

    #[test]
    fn test_subset_and_out_of_order() {
        let source = MemorySource::new(surge_frames());
        let state = reduce_run::<_, Vec<u8>>(
            &source,
            &[1, 4],
            &options(4),
            &pool(1),
            None,
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(state.frames_folded(), 2);

        let err = reduce_run::<_, Vec<u8>>(
            &source,
            &[3, 2],
            &options(4),
            &pool(2),
            None,
            &ProgressBar::hidden(),
        )
        .unwrap_err();
        assert!(matches!(err, MaxvalError::OutOfOrder { frame: 2, .. }));
    }

    #[test]
    fn test_load_failure_aborts() {
        let source = MemorySource::new(surge_frames());
        let err = reduce_run::<_, Vec<u8>>(
            &source,
            &[1, 9],
            &options(2),
            &pool(2),
            None,
            &ProgressBar::hidden(),
        )
        .unwrap_err();
        assert!(matches!(err, MaxvalError::Configuration(_)));

        assert!(
            reduce_run::<_, Vec<u8>>(
                &source,
                &[],
                &options(2),
                &pool(1),
                None,
                &ProgressBar::hidden()
            )
            .is_err()
        );
    }
}
