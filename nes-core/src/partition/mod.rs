//! Random assignment of coordinates to blocks
//!
//! Each generation the full parameter vector is split into `models` disjoint
//! blocks that are fit independently.  The assignment is reshuffled every
//! generation, so any two coordinates share a block with non-zero probability
//! over time even though a single generation only ever sees block diagonal
//! covariance.

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Clone, Debug, PartialEq)]
/// Maps each coordinate `0..width` onto a block id `0..models`
pub struct PartitionMap {
    translate: Vec<usize>,
    // Coordinates of each block, ascending
    blocks: Vec<Vec<usize>>,
}

impl PartitionMap {
    /// Tiles `0..models` across `width` slots and shuffles the result.  Block sizes
    /// differ by at most one.
    pub fn new<R: Rng>(width: usize, models: usize, rng: &mut R) -> Self {
        assert!(
            models >= 1 && models <= width,
            "cannot split {} coordinates into {} blocks",
            width,
            models
        );
        let mut translate: Vec<usize> = (0..width).map(|i| i % models).collect();
        translate.shuffle(rng);
        PartitionMap::from_translation(translate, models)
    }

    /// Builds a map from an explicit coordinate to block assignment.  Every block
    /// id below `models` must be used.
    pub fn from_translation(translate: Vec<usize>, models: usize) -> Self {
        let mut blocks = vec![Vec::new(); models];
        for (coord, block) in translate.iter().enumerate() {
            assert!(*block < models, "block id {} out of range", block);
            blocks[*block].push(coord);
        }
        assert!(
            blocks.iter().all(|b| !b.is_empty()),
            "every block needs at least one coordinate"
        );
        PartitionMap { translate, blocks }
    }

    #[inline]
    /// Full vector width
    pub fn width(&self) -> usize {
        self.translate.len()
    }

    #[inline]
    /// Number of blocks
    pub fn models(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    /// Block owning `coord`
    pub fn block_of(&self, coord: usize) -> usize {
        self.translate[coord]
    }

    #[inline]
    /// Coordinates of `block`, in ascending order
    pub fn coords(&self, block: usize) -> &[usize] {
        &self.blocks[block]
    }

    /// Projects a full width vector onto `block`
    pub fn gather<T: Copy>(&self, block: usize, vector: &[T]) -> Vec<T> {
        assert_eq!(vector.len(), self.width());
        self.blocks[block].iter().map(|c| vector[*c]).collect()
    }

    /// Writes the values of `block` back into their coordinates within `into`
    pub fn scatter<T: Copy>(&self, block: usize, values: &[T], into: &mut [T]) -> () {
        assert_eq!(into.len(), self.width());
        let coords = &self.blocks[block];
        assert_eq!(values.len(), coords.len());
        for (c, v) in coords.iter().zip(values) {
            into[*c] = *v;
        }
    }
}
