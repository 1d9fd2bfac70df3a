//! Preset position table with tolerance-aware stepping.

#[derive(Debug, Clone, PartialEq)]
pub struct PresetTable {
    tolerance: f64,
    positions: Vec<f64>,
}

impl PresetTable {
    /// Positions are expected in ascending order.
    pub fn new(tolerance: f64, positions: impl Into<Vec<f64>>) -> Self {
        Self {
            tolerance: tolerance.abs(),
            positions: positions.into(),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.positions.get(index).copied()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.positions.len()
    }

    /// Index of the next preset above `current`.
    ///
    /// An entry within tolerance of `current` counts as already reached and is
    /// skipped. Past the top this clamps to the last index.
    pub fn next_index_up(&self, current: f64) -> Option<usize> {
        let last = self.positions.len().checked_sub(1)?;
        let mut index = self
            .positions
            .iter()
            .position(|&p| p > current)
            .unwrap_or(last);
        if (self.positions[index] - current).abs() <= self.tolerance {
            index = (index + 1).min(last);
        }
        Some(index)
    }

    /// Mirror of [`PresetTable::next_index_up`], scanning from the top.
    /// Below the bottom this clamps to index 0.
    pub fn next_index_down(&self, current: f64) -> Option<usize> {
        if self.positions.is_empty() {
            return None;
        }
        let mut index = self
            .positions
            .iter()
            .rposition(|&p| p < current)
            .unwrap_or(0);
        if (self.positions[index] - current).abs() <= self.tolerance {
            index = index.saturating_sub(1);
        }
        Some(index)
    }
}
