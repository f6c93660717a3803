use crate::error::PicError;
use crate::space::DiscreteSpace;
use crate::{Float, Int};
use rayon::prelude::*;

pub mod atomic;
pub use atomic::AtomicFloat;

/// Ex, Ey, Ez, Bx, By, Bz
pub const EM_COMPONENTS: usize = 6;
/// rho, Jx, Jy, Jz
pub const SOURCE_COMPONENTS: usize = 4;
/// a^2 and its gradient
pub const LASER_COMPONENTS: usize = 4;
pub const CHI_COMPONENTS: usize = 1;
/// rho, Jx, Jy, Jz of the guiding wave
pub const QO_COMPONENTS: usize = 4;

/// Addressing for a field with `comps` elements per grid point.
///
/// `offset = sum_i (cell[i] - lfg[i]) * stride[i] + element`, with the
/// stride of an ignorable axis equal to zero.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    lfg: [Int; 3],
    ufg: [Int; 3],
    stride: [Int; 3],
    comps: usize,
    len: usize,
}

impl FieldLayout {
    pub fn new(space: &DiscreteSpace, comps: usize) -> FieldLayout {
        let ds = space.decoding_stride();
        let es = space.encoding_stride();
        let mut stride = [0; 3];
        for i in 0..3 {
            // zero exactly where the encoding stride is zero
            stride[i] = if es[i + 1] == 0 {
                0
            } else {
                ds[i + 1] * comps as Int
            };
        }
        FieldLayout {
            lfg: space.lfg().spatial(),
            ufg: space.ufg().spatial(),
            stride,
            comps,
            len: space.points() * comps,
        }
    }

    #[inline(always)]
    pub fn index(&self, cell: [Int; 3], comp: usize) -> usize {
        if !cfg!(feature = "unchecked") {
            assert!(comp < self.comps);
            for i in 0..3 {
                assert!(
                    self.stride[i] == 0 || (cell[i] >= self.lfg[i] && cell[i] <= self.ufg[i]),
                    "cell {:?} outside of the field",
                    cell
                );
            }
        }
        ((cell[0] - self.lfg[0]) * self.stride[0]
            + (cell[1] - self.lfg[1]) * self.stride[1]
            + (cell[2] - self.lfg[2]) * self.stride[2]) as usize
            + comp
    }

    pub fn comps(&self) -> usize {
        self.comps
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lfg(&self) -> [Int; 3] {
        self.lfg
    }

    pub fn ufg(&self) -> [Int; 3] {
        self.ufg
    }
}

/// Plain field data. Read-only while particles are pushed.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    layout: FieldLayout,
    data: Vec<Float>,
}

impl Field {
    pub fn new(space: &DiscreteSpace, comps: usize) -> Field {
        let layout = FieldLayout::new(space, comps);
        Field {
            data: vec![0.0; layout.len()],
            layout,
        }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    #[inline(always)]
    pub fn get(&self, cell: [Int; 3], comp: usize) -> Float {
        self.data[self.layout.index(cell, comp)]
    }

    pub fn set(&mut self, cell: [Int; 3], comp: usize, v: Float) {
        let idx = self.layout.index(cell, comp);
        self.data[idx] = v;
    }

    pub fn data(&self) -> &[Float] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Float] {
        &mut self.data
    }

    /// Sets one component to a constant everywhere, ghosts included.
    pub fn fill(&mut self, comp: usize, v: Float) {
        let comps = self.layout.comps;
        self.data
            .par_chunks_mut(comps)
            .for_each(|point| point[comp] = v);
    }

    /// Fills every point from a function of its cell index.
    pub fn par_fill<F>(&mut self, space: &DiscreteSpace, f: F)
    where
        F: Fn([Int; 3], &mut [Float]) + Sync + Send,
    {
        let decoder = space.decoder();
        let comps = self.layout.comps;
        self.data
            .par_chunks_mut(comps)
            .enumerate()
            .for_each(|(n, point)| f(decoder.decode(n), point));
    }
}

/// Deposit target shared by every task of a mover.
///
/// Each element is an `AtomicFloat`, so tasks hold `&SourceField` and pick
/// per call whether they accumulate atomically or own their footprint.
#[derive(Debug)]
pub struct SourceField {
    layout: FieldLayout,
    data: Vec<AtomicFloat>,
}

impl SourceField {
    pub fn new(space: &DiscreteSpace, comps: usize) -> SourceField {
        let layout = FieldLayout::new(space, comps);
        SourceField {
            data: (0..layout.len()).map(|_| AtomicFloat::new(0.0)).collect(),
            layout,
        }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    #[inline(always)]
    pub fn at(&self, cell: [Int; 3], comp: usize) -> &AtomicFloat {
        &self.data[self.layout.index(cell, comp)]
    }

    pub fn get(&self, cell: [Int; 3], comp: usize) -> Float {
        self.at(cell, comp).load()
    }

    /// Zeroes every point, ghosts included.
    pub fn zero(&self, space: &DiscreteSpace) {
        let lfg = self.layout.lfg;
        let comps = self.layout.comps;
        space.point_update_protocol().par_for_each(|[i, j, k]| {
            let cell = [lfg[0] + i as Int, lfg[1] + j as Int, lfg[2] + k as Int];
            let base = self.layout.index(cell, 0);
            for c in &self.data[base..base + comps] {
                c.store(0.0);
            }
        });
    }

    /// Sum of one component over all storage, ghosts included.
    pub fn total(&self, comp: usize) -> Float {
        self.data
            .iter()
            .skip(comp)
            .step_by(self.layout.comps)
            .map(|c| c.load())
            .sum()
    }

    pub fn snapshot(&self) -> Vec<Float> {
        self.data.iter().map(|c| c.load()).collect()
    }
}

/// The fields one species advance works against. Fields a mover does not
/// use may be left out.
#[derive(Clone, Copy)]
pub struct Flds<'a> {
    pub em: &'a Field,
    pub laser: Option<&'a Field>,
    pub qo_j4: Option<&'a Field>,
    pub sources: &'a SourceField,
    pub chi: Option<&'a SourceField>,
}

impl<'a> Flds<'a> {
    pub fn new(em: &'a Field, sources: &'a SourceField) -> Flds<'a> {
        Flds {
            em,
            laser: None,
            qo_j4: None,
            sources,
            chi: None,
        }
    }

    pub fn laser(&self) -> Result<&'a Field, PicError> {
        self.laser.ok_or(PicError::MissingField("laser"))
    }

    pub fn qo_j4(&self) -> Result<&'a Field, PicError> {
        self.qo_j4.ok_or(PicError::MissingField("qo_j4"))
    }

    pub fn chi(&self) -> Result<&'a SourceField, PicError> {
        self.chi.ok_or(PicError::MissingField("chi"))
    }
}
