use crate::error::MaxvalResult;
use crate::state::FoldStats;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

// One row per folded frame
#[derive(Debug, Serialize)]
struct DiagnosticsRow {
    frame: u32,
    time: f64,
    max_level: i32,
    wet_cells: usize,
    new_arrivals: usize,
    arrived_cells: usize,
}

/// Per-timestep table of what each fold observed.
pub struct DiagnosticsWriter<W: Write> {
    wtr: Writer<W>,
    arrived_cells: usize,
}

impl DiagnosticsWriter<File> {
    pub fn create(path: &Path) -> MaxvalResult<Self> {
        let wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
        Ok(DiagnosticsWriter {
            wtr,
            arrived_cells: 0,
        })
    }
}

impl<W: Write> DiagnosticsWriter<W> {
    pub fn from_writer(inner: W) -> Self {
        DiagnosticsWriter {
            wtr: WriterBuilder::new().has_headers(true).from_writer(inner),
            arrived_cells: 0,
        }
    }

    pub fn record(&mut self, stats: &FoldStats) -> MaxvalResult<()> {
        self.arrived_cells += stats.new_arrivals;
        self.wtr.serialize(DiagnosticsRow {
            frame: stats.frame,
            time: stats.time,
            max_level: stats.max_level,
            wet_cells: stats.wet_cells,
            new_arrivals: stats.new_arrivals,
            arrived_cells: self.arrived_cells,
        })?;
        Ok(())
    }

    pub fn finish(mut self) -> MaxvalResult<W> {
        self.wtr.flush()?;
        self.wtr
            .into_inner()
            .map_err(|e| crate::error::MaxvalError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(frame: u32, time: f64, new_arrivals: usize) -> FoldStats {
        FoldStats {
            frame,
            time,
            max_level: 3,
            wet_cells: 10,
            new_arrivals,
        }
    }

    #[test]
    fn test_rows_accumulate_arrivals() {
        let mut writer = DiagnosticsWriter::from_writer(Vec::new());
        writer.record(&stats(1, 0.0, 4)).unwrap();
        writer.record(&stats(2, 30.5, 2)).unwrap();
        let bytes = writer.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "frame,time,max_level,wet_cells,new_arrivals,arrived_cells",
                "1,0.0,3,10,4,4",
                "2,30.5,3,10,2,6",
            ]
        );
    }

    #[test]
    fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagnostics.csv");
        let mut writer = DiagnosticsWriter::create(&path).unwrap();
        writer.record(&stats(7, 1.0, 0)).unwrap();
        writer.finish().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("7,1.0,3,10,0,0\n"));
    }
}
