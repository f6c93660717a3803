use super::DiscreteSpace;
use rayon::prelude::*;
use strength_reduce::StrengthReducedUsize;

/// The shape of a data-parallel sweep over a subdomain.
///
/// A region is either flat (`rank == 1`, a single count along the first
/// slot) or a 3D box given by an offset and an extent in storage
/// coordinates, where storage index 0 is the lower full-ghost cell. The
/// region only delimits work; the caller supplies the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridRegion {
    pub rank: usize,
    pub offset: [usize; 3],
    pub extent: [usize; 3],
}

impl GridRegion {
    pub fn flat(count: usize) -> GridRegion {
        GridRegion {
            rank: 1,
            offset: [0; 3],
            extent: [count, 1, 1],
        }
    }

    pub fn boxed(offset: [usize; 3], extent: [usize; 3]) -> GridRegion {
        GridRegion {
            rank: 3,
            offset,
            extent,
        }
    }

    pub fn len(&self) -> usize {
        self.extent[0] * self.extent[1] * self.extent[2]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequential sweep, last axis fastest.
    pub fn indices(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..self.len()).map(move |n| {
            let k = n % self.extent[2];
            let j = (n / self.extent[2]) % self.extent[1];
            let i = n / (self.extent[2] * self.extent[1]);
            [
                self.offset[0] + i,
                self.offset[1] + j,
                self.offset[2] + k,
            ]
        })
    }

    /// Thread-pool backend: runs `kernel` once for every index in the
    /// region and returns only when all of them are done.
    pub fn par_for_each<F>(&self, kernel: F)
    where
        F: Fn([usize; 3]) + Sync + Send,
    {
        if self.is_empty() {
            return;
        }
        let e2 = StrengthReducedUsize::new(self.extent[2]);
        let e1 = StrengthReducedUsize::new(self.extent[1]);
        let offset = self.offset;
        (0..self.len()).into_par_iter().for_each(|n| {
            let k = n % e2;
            let rest = n / e2;
            let j = rest % e1;
            let i = rest / e1;
            kernel([offset[0] + i, offset[1] + j, offset[2] + k]);
        });
    }
}

impl DiscreteSpace {
    fn interior_cells(&self) -> usize {
        (self.dim[1] * self.dim[2] * self.dim[3]) as usize
    }

    /// Interior cells, flattened.
    pub fn cell_update_protocol(&self) -> GridRegion {
        GridRegion::flat(self.interior_cells())
    }

    /// Interior cells times `elements` per cell, flattened.
    pub fn element_update_protocol(&self, elements: usize) -> GridRegion {
        GridRegion::flat(self.interior_cells() * elements)
    }

    /// Interior cells as a 3D box, offset past the ghost layers.
    pub fn local_update_protocol(&self) -> GridRegion {
        GridRegion::boxed(
            [
                self.layers[1] as usize,
                self.layers[2] as usize,
                self.layers[3] as usize,
            ],
            [
                self.dim[1] as usize,
                self.dim[2] as usize,
                self.dim[3] as usize,
            ],
        )
    }

    /// Every point, ghosts included.
    pub fn point_update_protocol(&self) -> GridRegion {
        GridRegion::boxed(
            [0; 3],
            [
                self.num[1] as usize,
                self.num[2] as usize,
                self.num[3] as usize,
            ],
        )
    }
}
