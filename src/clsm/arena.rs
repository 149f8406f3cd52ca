//! Contiguous storage of per-voxel photon indices

use itertools::Itertools;

/// Photon indices of every voxel in one buffer.
///
/// Voxel `v` owns `indices[offsets[v]..offsets[v + 1]]`, strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelArena {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl VoxelArena {
    pub fn empty(n_voxels: usize) -> Self {
        Self {
            offsets: vec![0; n_voxels + 1],
            indices: Vec::new(),
        }
    }

    /// Groups `(voxel, stream index)` pairs by voxel.
    ///
    /// Pairs for voxels outside `0..n_voxels` are ignored.
    pub fn from_assignments(n_voxels: usize, assignments: &[(usize, usize)]) -> Self {
        let mut counts = vec![0usize; n_voxels + 1];
        for &(voxel, _) in assignments {
            if voxel < n_voxels {
                counts[voxel + 1] += 1;
            }
        }
        for v in 0..n_voxels {
            counts[v + 1] += counts[v];
        }
        let offsets = counts.clone();
        let mut cursor = counts;
        let mut indices = vec![0usize; offsets[n_voxels]];
        for &(voxel, index) in assignments {
            if voxel < n_voxels {
                indices[cursor[voxel]] = index;
                cursor[voxel] += 1;
            }
        }

        let mut arena = Self { offsets, indices };
        arena.normalize();
        arena
    }

    pub fn n_voxels(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of stored indices over all voxels.
    pub fn n_indices(&self) -> usize {
        self.indices.len()
    }

    pub fn voxel(&self, voxel: usize) -> &[usize] {
        &self.indices[self.offsets[voxel]..self.offsets[voxel + 1]]
    }

    pub fn count(&self, voxel: usize) -> usize {
        self.offsets[voxel + 1] - self.offsets[voxel]
    }

    pub fn voxels(&self) -> impl ExactSizeIterator<Item = &[usize]> + '_ {
        (0..self.n_voxels()).map(|v| self.voxel(v))
    }

    /// Union of two arenas over the same grid.
    pub fn merge(&self, other: &VoxelArena) -> VoxelArena {
        debug_assert_eq!(self.n_voxels(), other.n_voxels());
        let mut offsets = Vec::with_capacity(self.offsets.len());
        let mut indices = Vec::with_capacity(self.n_indices() + other.n_indices());
        offsets.push(0);
        for (mine, theirs) in self.voxels().zip(other.voxels()) {
            indices.extend(mine.iter().merge(theirs).dedup().copied());
            offsets.push(indices.len());
        }
        Self { offsets, indices }
    }

    /// Moves every voxel to `map(voxel)` in a grid of `n_voxels`, dropping
    /// voxels mapped to `None` and concatenating voxels mapped together.
    pub fn remap(&self, n_voxels: usize, map: impl Fn(usize) -> Option<usize>) -> VoxelArena {
        let assignments: Vec<(usize, usize)> = (0..self.n_voxels())
            .filter_map(|v| map(v).map(|target| (v, target)))
            .flat_map(|(v, target)| self.voxel(v).iter().map(move |&index| (target, index)))
            .collect();
        Self::from_assignments(n_voxels, &assignments)
    }

    /// Keeps only the indices for which `keep` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) {
        self.compact(|_, index| keep(index));
    }

    /// Sorts each voxel and drops duplicate indices.
    fn normalize(&mut self) {
        for v in 0..self.n_voxels() {
            let span = self.offsets[v]..self.offsets[v + 1];
            self.indices[span].sort_unstable();
        }
        self.compact(|last_kept, index| last_kept != Some(index));
    }

    /// Filters every voxel in place; `keep` sees the last index kept in the
    /// current voxel.
    fn compact(&mut self, mut keep: impl FnMut(Option<usize>, usize) -> bool) {
        let mut write = 0;
        let mut start = 0;
        for v in 0..self.n_voxels() {
            let stop = self.offsets[v + 1];
            let mut last_kept = None;
            for read in start..stop {
                let index = self.indices[read];
                if keep(last_kept, index) {
                    self.indices[write] = index;
                    write += 1;
                    last_kept = Some(index);
                }
            }
            start = stop;
            self.offsets[v + 1] = write;
        }
        self.indices.truncate(write);
    }
}
