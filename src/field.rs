use crate::screen;

/// Per-pixel iteration counts, row-major. Produced once by a dispatch and
/// handed on by value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarField {
    size: screen::Size,
    counts: Vec<u32>,
}

impl ScalarField {
    /// `None` unless `counts` has exactly one entry per cell of `size`.
    pub fn new(size: screen::Size, counts: Vec<u32>) -> Option<Self> {
        if counts.len() == size.cell_count() {
            Some(Self { size, counts })
        } else {
            None
        }
    }

    pub fn filled(size: screen::Size, count: u32) -> Self {
        Self {
            size,
            counts: vec![count; size.cell_count()],
        }
    }

    pub fn size(&self) -> screen::Size {
        self.size
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.counts[self.size.index(x, y)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_cell_count() {
        let size = screen::Size::new(3, 2);
        assert!(ScalarField::new(size, vec![0; 5]).is_none());
        assert!(ScalarField::new(size, vec![0; 7]).is_none());
    }

    #[test]
    fn indexes_row_major() {
        let field = ScalarField::new(screen::Size::new(3, 2), vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(field.get(2, 0), 2);
        assert_eq!(field.get(0, 1), 3);
        assert_eq!(field.get(2, 1), 5);
    }
}
