//! Assembly of the full connectivity matrix from population blocks.
use std::ops::Range;

use nalgebra::DMatrix;

use crate::core::population::Populations;
use crate::error::RateNetError;

/// Builder of an `N × N` weight matrix, written one population block at a time.
/// Row ranges index postsynaptic neurons and column ranges presynaptic neurons.
#[derive(Debug, Clone)]
pub struct BlockMatrixBuilder {
    matrix: DMatrix<f64>,
    /// The row and column ranges of the blocks written so far.
    written: Vec<(Range<usize>, Range<usize>)>,
}

impl BlockMatrixBuilder {
    /// Create a zeroed `num_neurons × num_neurons` matrix.
    pub fn new(num_neurons: usize) -> Self {
        BlockMatrixBuilder {
            matrix: DMatrix::zeros(num_neurons, num_neurons),
            written: Vec::new(),
        }
    }

    /// Create a builder spanning all the neurons of the populations.
    pub fn for_populations(populations: &Populations) -> Self {
        Self::new(populations.num_neurons())
    }

    /// Write a block at the given row (postsynaptic) and column (presynaptic) ranges.
    ///
    /// Returns an error if the block shape does not match the ranges, if the ranges go beyond the matrix,
    /// or if the block overlaps a block written before.
    pub fn write_block(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        block: &DMatrix<f64>,
    ) -> Result<(), RateNetError> {
        if block.shape() != (rows.len(), cols.len()) {
            return Err(RateNetError::DimensionMismatch(format!(
                "Block of shape {:?} written at rows {:?} and columns {:?}",
                block.shape(),
                rows,
                cols
            )));
        }
        if rows.end > self.matrix.nrows() || cols.end > self.matrix.ncols() {
            return Err(RateNetError::DimensionMismatch(format!(
                "Block at rows {:?} and columns {:?} exceeds the {:?} matrix",
                rows,
                cols,
                self.matrix.shape()
            )));
        }
        if let Some((r, c)) = self
            .written
            .iter()
            .find(|(r, c)| overlaps(r, &rows) && overlaps(c, &cols))
        {
            return Err(RateNetError::BlockOverlap(format!(
                "Block at rows {:?} and columns {:?} overlaps the block at rows {:?} and columns {:?}",
                rows, cols, r, c
            )));
        }

        self.matrix
            .view_mut((rows.start, cols.start), (rows.len(), cols.len()))
            .copy_from(block);
        self.written.push((rows, cols));
        Ok(())
    }

    /// Write the block of the ordered population pair (`post`, `pre`).
    pub fn write_pair(
        &mut self,
        populations: &Populations,
        post: usize,
        pre: usize,
        block: &DMatrix<f64>,
    ) -> Result<(), RateNetError> {
        match (populations.get(post), populations.get(pre)) {
            (Some(post), Some(pre)) => self.write_block(post.range(), pre.range(), block),
            _ => Err(RateNetError::InvalidParameter(format!(
                "Population pair ({}, {}) out of bounds",
                post, pre
            ))),
        }
    }

    /// The number of blocks written so far.
    pub fn num_blocks(&self) -> usize {
        self.written.len()
    }

    /// Consume the builder and return the assembled matrix.
    pub fn build(self) -> DMatrix<f64> {
        self.matrix
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connectivity::ConnectivityMode;

    #[test]
    fn test_write_blocks() {
        let pops =
            Populations::new(5, &[0.6, 0.4], 1.0, &[1.0, 1.0], ConnectivityMode::Sparse).unwrap();
        let mut builder = BlockMatrixBuilder::for_populations(&pops);

        builder
            .write_pair(&pops, 0, 0, &DMatrix::from_element(3, 3, 1.0))
            .unwrap();
        builder
            .write_pair(&pops, 0, 1, &DMatrix::from_element(3, 2, 2.0))
            .unwrap();
        builder
            .write_pair(&pops, 1, 0, &DMatrix::from_element(2, 3, 3.0))
            .unwrap();
        builder
            .write_pair(&pops, 1, 1, &DMatrix::from_element(2, 2, 4.0))
            .unwrap();
        assert_eq!(builder.num_blocks(), 4);

        let matrix = builder.build();
        assert_eq!(matrix[(0, 0)], 1.0);
        assert_eq!(matrix[(2, 4)], 2.0);
        assert_eq!(matrix[(3, 0)], 3.0);
        assert_eq!(matrix[(4, 4)], 4.0);
    }

    #[test]
    fn test_invalid_blocks() {
        let mut builder = BlockMatrixBuilder::new(4);
        builder
            .write_block(0..2, 0..2, &DMatrix::zeros(2, 2))
            .unwrap();

        assert!(matches!(
            builder.write_block(1..3, 1..3, &DMatrix::zeros(2, 2)),
            Err(RateNetError::BlockOverlap(_))
        ));
        assert!(matches!(
            builder.write_block(2..4, 0..2, &DMatrix::zeros(3, 2)),
            Err(RateNetError::DimensionMismatch(_))
        ));
        assert!(matches!(
            builder.write_block(3..5, 0..2, &DMatrix::zeros(2, 2)),
            Err(RateNetError::DimensionMismatch(_))
        ));
        assert!(builder.write_block(2..4, 0..2, &DMatrix::zeros(2, 2)).is_ok());
    }
}
