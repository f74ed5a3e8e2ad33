//! Dense bit matrices used for the transitive relations computed by the compiler.

const WORD_BITS: usize = u64::BITS as usize;

/// A `rows x cols` matrix of bits, stored row-major in 64-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitMatrix {
    rows: usize,
    cols: usize,
    words_per_row: usize,
    words: Vec<u64>,
}

impl BitMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        let words_per_row = cols.div_ceil(WORD_BITS);
        Self {
            rows,
            cols,
            words_per_row,
            words: vec![0; rows * words_per_row],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn row_range(&self, row: usize) -> std::ops::Range<usize> {
        row * self.words_per_row..(row + 1) * self.words_per_row
    }

    pub fn set(&mut self, row: usize, col: usize) {
        assert!(row < self.rows && col < self.cols);
        self.words[row * self.words_per_row + col / WORD_BITS] |= 1 << (col % WORD_BITS);
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        self.words[row * self.words_per_row + col / WORD_BITS] & (1 << (col % WORD_BITS)) != 0
    }

    pub fn row(&self, row: usize) -> &[u64] {
        &self.words[self.row_range(row)]
    }

    /// `row(dst) |= row(src)`. This is the transitive merge step of a closure computation.
    pub fn apply(&mut self, dst: usize, src: usize) {
        if dst == src {
            return;
        }
        for word in 0..self.words_per_row {
            let value = self.words[src * self.words_per_row + word];
            self.words[dst * self.words_per_row + word] |= value;
        }
    }

    pub fn row_is_empty(&self, row: usize) -> bool {
        self.row(row).iter().all(|word| *word == 0)
    }

    /// Iterate over the set columns of a row in increasing order.
    pub fn iter_row(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        let cols = self.cols;
        self.row(row)
            .iter()
            .enumerate()
            .flat_map(|(index, word)| {
                (0..WORD_BITS).filter_map(move |bit| (word & (1 << bit) != 0).then_some(index * WORD_BITS + bit))
            })
            .filter(move |col| *col < cols)
    }

    pub fn transpose(&self) -> BitMatrix {
        let mut transposed = BitMatrix::new(self.cols, self.rows);
        for row in 0..self.rows {
            for col in self.iter_row(row) {
                transposed.set(col, row);
            }
        }
        transposed
    }
}

/// Operations on slices of words, used to combine rows of different matrices of the same width.
pub(crate) mod words {
    pub fn and_assign(dst: &mut [u64], src: &[u64]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d &= s;
        }
    }

    pub fn is_subset(subset: &[u64], superset: &[u64]) -> bool {
        subset.iter().zip(superset).all(|(a, b)| a & !b == 0)
    }

    pub fn intersects(a: &[u64], b: &[u64]) -> bool {
        a.iter().zip(b).any(|(a, b)| a & b != 0)
    }
}
