//! Snapshots of the candidate image taken during reconstruction

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::attack::DummyState;
use crate::error::{LeakageError, Result};
use crate::tensor::Tensor;

/// Pixels between tiles in [`ReconstructionHistory::render_grid`].
const GRID_GAP: usize = 1;

/// First candidate image at one logged iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub iteration: usize,
    pub objective: f64,
    /// Detached copy, shape `(C, H, W)`.
    pub image: Tensor,
}

/// Append-only record of snapshots, in iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionHistory {
    snapshots: Vec<Snapshot>,
}

impl ReconstructionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of the first candidate image of `state`.
    pub fn record(&mut self, iteration: usize, objective: f64, state: &DummyState) {
        self.snapshots.push(Snapshot {
            iteration,
            objective,
            image: state.image(0),
        });
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    pub fn first(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Logged objective at `iteration`, if a snapshot was taken there.
    pub fn objective_at(&self, iteration: usize) -> Option<f64> {
        self.snapshots
            .iter()
            .find(|s| s.iteration == iteration)
            .map(|s| s.objective)
    }

    /// Write `iteration,objective` lines to `<output>/logs/dlg_loss.txt`,
    /// creating the directory as needed. Returns the path written.
    pub fn write_objective_log(&self, output: impl AsRef<Path>) -> Result<PathBuf> {
        let log_dir = output.as_ref().join("logs");
        fs::create_dir_all(&log_dir).map_err(|e| LeakageError::io(&log_dir, e))?;
        let log_path = log_dir.join("dlg_loss.txt");
        let file = File::create(&log_path).map_err(|e| LeakageError::io(&log_path, e))?;
        let mut log = BufWriter::new(file);
        for snapshot in &self.snapshots {
            writeln!(log, "{},{}", snapshot.iteration, snapshot.objective)
                .map_err(|e| LeakageError::io(&log_path, e))?;
        }
        log.flush().map_err(|e| LeakageError::io(&log_path, e))?;
        Ok(log_path)
    }

    /// Tile all snapshots row by row, `columns` per row, on a white
    /// background. Returns `None` when there is nothing to draw.
    pub fn render_grid(&self, columns: usize) -> Option<Tensor> {
        let first = self.snapshots.first()?;
        let columns = columns.max(1).min(self.snapshots.len());
        let rows = self.snapshots.len().div_ceil(columns);
        let (channels, height, width) = match *first.image.shape() {
            [c, h, w] => (c, h, w),
            _ => return None,
        };

        let grid_h = rows * height + (rows - 1) * GRID_GAP;
        let grid_w = columns * width + (columns - 1) * GRID_GAP;
        let mut grid = Tensor::filled(vec![channels, grid_h, grid_w], 1.0);
        let data = grid.data_mut();

        for (n, snapshot) in self.snapshots.iter().enumerate() {
            let top = (n / columns) * (height + GRID_GAP);
            let left = (n % columns) * (width + GRID_GAP);
            let pixels = snapshot.image.data();
            for c in 0..channels {
                for y in 0..height {
                    let src = (c * height + y) * width;
                    let dst = (c * grid_h + top + y) * grid_w + left;
                    data[dst..dst + width].copy_from_slice(&pixels[src..src + width]);
                }
            }
        }
        Some(grid)
    }
}

impl<'a> IntoIterator for &'a ReconstructionHistory {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::SimpleRng;

    fn state_with_value(value: f64) -> DummyState {
        let mut state = DummyState::random(vec![1, 1, 2, 2], vec![1, 2], &mut SimpleRng::new(1));
        state.assign_flat(&[value; 6]);
        state
    }

    #[test]
    fn test_record_and_lookup() {
        let mut history = ReconstructionHistory::new();
        assert!(history.is_empty());
        history.record(0, 5.0, &state_with_value(0.1));
        history.record(10, 2.5, &state_with_value(0.2));

        assert_eq!(history.len(), 2);
        assert_eq!(history.first().map(|s| s.iteration), Some(0));
        assert_eq!(history.last().map(|s| s.objective), Some(2.5));
        assert_eq!(history.objective_at(10), Some(2.5));
        assert_eq!(history.objective_at(5), None);
        assert_eq!(history.snapshots()[1].image.shape(), &[1, 2, 2]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut state = state_with_value(0.3);
        let mut history = ReconstructionHistory::new();
        history.record(0, 1.0, &state);
        state.assign_flat(&[9.0; 6]);
        assert_eq!(history.snapshots()[0].image.data(), &[0.3; 4]);
    }

    #[test]
    fn test_render_grid_layout() {
        let mut history = ReconstructionHistory::new();
        for i in 0..3 {
            history.record(i * 10, 1.0, &state_with_value(i as f64 * 0.25));
        }
        let grid = history.render_grid(2).unwrap();
        // 2 rows x 2 columns of 2x2 tiles with 1 pixel gaps.
        assert_eq!(grid.shape(), &[1, 5, 5]);
        let d = grid.data();
        assert_eq!(d[0], 0.0);
        assert_eq!(d[2], 1.0);
        assert_eq!(d[3], 0.25);
        assert_eq!(d[3 * 5], 0.5);
        assert_eq!(d[3 * 5 + 3], 1.0);
        assert!(ReconstructionHistory::new().render_grid(10).is_none());
    }
}
