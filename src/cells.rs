// Dual-buffered per-vertex concentration store
//
// Two parallel flat buffers (vertex-major, morphogen-minor) alternate read
// and write roles every step. Dirichlet "fixed" flags pin individual
// concentrations. Vertices are never removed, only ignored.

/// Per-vertex morphogen concentrations in two alternating buffers.
pub struct CellStore {
    morphogen_count: usize,
    buffers: [Vec<f64>; 2],
    fixed: Vec<bool>,
    /// Index of the current read buffer.
    current: usize,
}

impl CellStore {
    pub fn new(vertex_count: usize, morphogen_count: usize) -> Self {
        let len = vertex_count * morphogen_count;
        Self {
            morphogen_count,
            buffers: [vec![0.0; len], vec![0.0; len]],
            fixed: vec![false; len],
            current: 0,
        }
    }

    pub fn morphogen_count(&self) -> usize {
        self.morphogen_count
    }

    pub fn vertex_count(&self) -> usize {
        if self.morphogen_count == 0 {
            0
        } else {
            self.buffers[0].len() / self.morphogen_count
        }
    }

    #[inline]
    fn index(&self, vertex: usize, morphogen: usize) -> usize {
        debug_assert!(morphogen < self.morphogen_count);
        vertex * self.morphogen_count + morphogen
    }

    /// The buffer the current step reads from.
    pub fn read(&self) -> &[f64] {
        &self.buffers[self.current]
    }

    /// Concentration in the read buffer.
    pub fn value(&self, vertex: usize, morphogen: usize) -> f64 {
        self.buffers[self.current][self.index(vertex, morphogen)]
    }

    /// Write directly into the read buffer, making the edit authoritative
    /// immediately (interactive painting, state loading).
    pub fn set_value(&mut self, vertex: usize, morphogen: usize, value: f64) {
        let i = self.index(vertex, morphogen);
        self.buffers[self.current][i] = value;
    }

    pub fn is_fixed(&self, vertex: usize, morphogen: usize) -> bool {
        self.fixed[self.index(vertex, morphogen)]
    }

    pub fn set_fixed(&mut self, vertex: usize, morphogen: usize, fixed: bool) {
        let i = self.index(vertex, morphogen);
        self.fixed[i] = fixed;
    }

    pub fn fixed_flags(&self) -> &[bool] {
        &self.fixed
    }

    /// Move the write buffer out for the duration of a step, leaving an
    /// empty placeholder. The caller returns it via `put_write`.
    pub fn take_write(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.buffers[1 - self.current])
    }

    pub fn put_write(&mut self, buffer: Vec<f64>) {
        debug_assert_eq!(buffer.len(), self.buffers[self.current].len());
        self.buffers[1 - self.current] = buffer;
    }

    /// Flip which buffer is read and which is written. An involution: two
    /// consecutive swaps restore the original assignment.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Grow both buffers and the flag array to `vertex_count`. New entries
    /// start at zero concentration, unfixed. Shrinking is not supported;
    /// stale tail entries of a loaded smaller state are simply ignored.
    pub fn resize(&mut self, vertex_count: usize) {
        let len = vertex_count * self.morphogen_count;
        for buf in &mut self.buffers {
            buf.resize(len, 0.0);
        }
        self.fixed.resize(len, false);
    }

    /// Replace the entire read buffer (state loading, device pulls).
    /// Lengths must match.
    pub fn load(&mut self, data: &[f64]) {
        assert_eq!(data.len(), self.buffers[self.current].len());
        self.buffers[self.current].copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_is_involution() {
        let mut cells = CellStore::new(4, 2);
        cells.set_value(2, 1, 3.5);
        let before = cells.read().to_vec();

        cells.swap();
        assert_ne!(cells.value(2, 1), 3.5);
        cells.swap();
        assert_eq!(cells.read(), before.as_slice());
        assert_eq!(cells.value(2, 1), 3.5);
    }

    #[test]
    fn test_buffers_keep_equal_length() {
        let mut cells = CellStore::new(3, 2);
        cells.resize(10);
        assert_eq!(cells.vertex_count(), 10);
        assert_eq!(cells.read().len(), 20);
        let w = cells.take_write();
        assert_eq!(w.len(), 20);
        cells.put_write(w);
        assert_eq!(cells.fixed_flags().len(), 20);
    }

    #[test]
    fn test_resize_preserves_values() {
        let mut cells = CellStore::new(2, 3);
        cells.set_value(1, 2, 7.0);
        cells.set_fixed(1, 2, true);
        cells.resize(5);
        assert_eq!(cells.value(1, 2), 7.0);
        assert!(cells.is_fixed(1, 2));
        assert_eq!(cells.value(4, 0), 0.0);
    }

    #[test]
    fn test_take_put_write_round_trip() {
        let mut cells = CellStore::new(2, 1);
        let mut w = cells.take_write();
        w[0] = 9.0;
        cells.put_write(w);
        cells.swap();
        assert_eq!(cells.value(0, 0), 9.0);
    }
}
