use super::bundle::SubarrayBounds;
use super::pushers::{Current, EmSample, GuideSample, PgcDeposit, PgcSample};
use crate::error::PicError;
use crate::flds::{Field, Flds, SourceField};
use crate::flds::{
    CHI_COMPONENTS, EM_COMPONENTS, LASER_COMPONENTS, QO_COMPONENTS, SOURCE_COMPONENTS,
};
use crate::prtls::Particle;
use crate::space::DiscreteSpace;
use crate::{Float, Int};
use itertools::iproduct;

/// Reach of the interpolation stencil, in cells, on every active axis.
pub const STENCIL_LAYERS: Int = 1;

/// Cells a `D`-dimensional stencil spans around its center on each axis.
/// Zero on ignorable axes, and on y when `D == 2`.
pub fn stencil_span<const D: usize>(space: &DiscreteSpace) -> [Int; 3] {
    let ignorable = space.ignorable();
    let mut span = [STENCIL_LAYERS; 3];
    for a in 0..3 {
        if ignorable[a + 1] || (D == 2 && a == 1) {
            span[a] = 0;
        }
    }
    span
}

/// Quadratic spline weights of one particle, shared by gather and scatter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weights {
    pub cell: [Int; 3],
    pub w: [[Float; 3]; 3],
    pub span: [Int; 3],
}

impl Weights {
    pub fn new(prtl: &Particle, span: [Int; 3]) -> Weights {
        let mut w = [[0.0, 1.0, 0.0]; 3];
        for a in 0..3 {
            if span[a] == 0 {
                continue;
            }
            let x = prtl.x[a];
            w[a] = [
                0.5 * (0.5 - x) * (0.5 - x),
                0.75 - x * x,
                0.5 * (0.5 + x) * (0.5 + x),
            ];
        }
        Weights {
            cell: prtl.cell,
            w,
            span,
        }
    }

    /// Every stencil point with its weight.
    #[inline(always)]
    pub fn points(&self) -> impl Iterator<Item = ([Int; 3], Float)> + '_ {
        let s = self.span;
        iproduct!(-s[0]..=s[0], -s[1]..=s[1], -s[2]..=s[2]).map(move |(i, j, k)| {
            let wt = self.w[0][(i + 1) as usize]
                * self.w[1][(j + 1) as usize]
                * self.w[2][(k + 1) as usize];
            ([self.cell[0] + i, self.cell[1] + j, self.cell[2] + k], wt)
        })
    }
}

/// A dense copy of one field over a bundle's subarray bounds.
#[derive(Clone, Debug, Default)]
pub struct Slice {
    low: [Int; 3],
    high: [Int; 3],
    shape: [usize; 3],
    comps: usize,
    data: Vec<Float>,
}

impl Slice {
    pub fn new(comps: usize) -> Slice {
        Slice {
            comps,
            ..Default::default()
        }
    }

    /// Resizes to `bounds` and zeroes.
    pub fn reshape(&mut self, bounds: &SubarrayBounds) {
        self.low = bounds.low.spatial();
        self.high = bounds.high.spatial();
        for a in 0..3 {
            self.shape[a] = (self.high[a] - self.low[a] + 1).max(0) as usize;
        }
        self.data.clear();
        self.data
            .resize(self.shape[0] * self.shape[1] * self.shape[2] * self.comps, 0.0);
    }

    pub fn cells(&self) -> impl Iterator<Item = [Int; 3]> {
        let (lo, hi) = (self.low, self.high);
        iproduct!(lo[0]..=hi[0], lo[1]..=hi[1], lo[2]..=hi[2]).map(|(i, j, k)| [i, j, k])
    }

    #[inline(always)]
    fn offset(&self, cell: [Int; 3]) -> usize {
        if !cfg!(feature = "unchecked") {
            for a in 0..3 {
                assert!(
                    cell[a] >= self.low[a] && cell[a] <= self.high[a],
                    "cell {:?} outside of slice {:?}..={:?}",
                    cell,
                    self.low,
                    self.high
                );
            }
        }
        let i = (cell[0] - self.low[0]) as usize;
        let j = (cell[1] - self.low[1]) as usize;
        let k = (cell[2] - self.low[2]) as usize;
        ((i * self.shape[1] + j) * self.shape[2] + k) * self.comps
    }

    pub fn get(&self, cell: [Int; 3], comp: usize) -> Float {
        self.data[self.offset(cell) + comp]
    }

    pub fn load(&mut self, field: &Field, bounds: &SubarrayBounds) {
        self.reshape(bounds);
        let comps = self.comps;
        for cell in self.cells() {
            let base = self.offset(cell);
            for c in 0..comps {
                self.data[base + c] = field.get(cell, c);
            }
        }
    }

    pub fn load_sources(&mut self, field: &SourceField, bounds: &SubarrayBounds) {
        self.reshape(bounds);
        let comps = self.comps;
        for cell in self.cells() {
            let base = self.offset(cell);
            for c in 0..comps {
                self.data[base + c] = field.get(cell, c);
            }
        }
    }

    /// Weighted sum of the stencil around the particle.
    #[inline(always)]
    pub fn gather<const N: usize>(&self, w: &Weights) -> [Float; N] {
        let mut out = [0.0; N];
        for (cell, wt) in w.points() {
            let base = self.offset(cell);
            for c in 0..N {
                out[c] += wt * self.data[base + c];
            }
        }
        out
    }

    #[inline(always)]
    pub fn scatter(&mut self, w: &Weights, vals: &[Float]) {
        for (cell, wt) in w.points() {
            let base = self.offset(cell);
            for (c, v) in vals.iter().enumerate() {
                self.data[base + c] += wt * v;
            }
        }
    }

    /// Writes the slice back to the shared source field. With
    /// `needs_atomic` the slice holds increments and is accumulated;
    /// otherwise it holds final values and overwrites its footprint.
    pub fn deposit(&self, field: &SourceField, needs_atomic: bool) {
        for cell in self.cells() {
            let base = self.offset(cell);
            for c in 0..self.comps {
                let v = self.data[base + c];
                if needs_atomic {
                    if v != 0.0 {
                        field.at(cell, c).fetch_add(v);
                    }
                } else {
                    field.at(cell, c).store(v);
                }
            }
        }
    }

    fn init_sources(&mut self, field: &SourceField, bounds: &SubarrayBounds, needs_atomic: bool) {
        if needs_atomic {
            self.reshape(bounds);
        } else {
            self.load_sources(field, bounds);
        }
    }
}

/// Per-bundle field access for one pusher: copies the needed fields into
/// local slices, interpolates them to particles and deposits the sources.
pub trait Tiler: Sized {
    type Local;
    type Deposit;

    /// Whether the tiler freezes the y axis.
    const PLANAR: bool;

    fn new(space: &DiscreteSpace) -> Self;

    /// Fails when a field this tiler reads or writes is absent.
    fn check_fields(flds: &Flds) -> Result<(), PicError>;

    fn span(&self) -> [Int; 3];

    fn load_field_slice(&mut self, flds: &Flds, bounds: &SubarrayBounds) -> Result<(), PicError>;

    fn init_source_slice(
        &mut self,
        flds: &Flds,
        bounds: &SubarrayBounds,
        needs_atomic: bool,
    ) -> Result<(), PicError>;

    fn gather(&self, w: &Weights) -> Self::Local;

    fn scatter(&mut self, w: &Weights, deposit: &Self::Deposit);

    fn deposit_source_slice(&self, flds: &Flds, needs_atomic: bool) -> Result<(), PicError>;
}

/// Electromagnetic fields in, rho and J out.
#[derive(Clone, Debug)]
pub struct EmTiler<const D: usize> {
    span: [Int; 3],
    em: Slice,
    sources: Slice,
}

impl<const D: usize> Tiler for EmTiler<D> {
    type Local = EmSample;
    type Deposit = Current;
    const PLANAR: bool = D == 2;

    fn new(space: &DiscreteSpace) -> Self {
        EmTiler {
            span: stencil_span::<D>(space),
            em: Slice::new(EM_COMPONENTS),
            sources: Slice::new(SOURCE_COMPONENTS),
        }
    }

    fn check_fields(_flds: &Flds) -> Result<(), PicError> {
        Ok(())
    }

    fn span(&self) -> [Int; 3] {
        self.span
    }

    fn load_field_slice(&mut self, flds: &Flds, bounds: &SubarrayBounds) -> Result<(), PicError> {
        self.em.load(flds.em, bounds);
        Ok(())
    }

    fn init_source_slice(
        &mut self,
        flds: &Flds,
        bounds: &SubarrayBounds,
        needs_atomic: bool,
    ) -> Result<(), PicError> {
        self.sources.init_sources(flds.sources, bounds, needs_atomic);
        Ok(())
    }

    #[inline(always)]
    fn gather(&self, w: &Weights) -> EmSample {
        let f = self.em.gather::<EM_COMPONENTS>(w);
        EmSample {
            e: [f[0], f[1], f[2]],
            b: [f[3], f[4], f[5]],
        }
    }

    #[inline(always)]
    fn scatter(&mut self, w: &Weights, dep: &Current) {
        self.sources.scatter(w, &[dep.rho, dep.j[0], dep.j[1], dep.j[2]]);
    }

    fn deposit_source_slice(&self, flds: &Flds, needs_atomic: bool) -> Result<(), PicError> {
        self.sources.deposit(flds.sources, needs_atomic);
        Ok(())
    }
}

/// `EmTiler` plus the laser envelope in and chi out.
#[derive(Clone, Debug)]
pub struct PgcTiler<const D: usize> {
    em: EmTiler<D>,
    laser: Slice,
    chi: Slice,
}

impl<const D: usize> Tiler for PgcTiler<D> {
    type Local = PgcSample;
    type Deposit = PgcDeposit;
    const PLANAR: bool = D == 2;

    fn new(space: &DiscreteSpace) -> Self {
        PgcTiler {
            em: EmTiler::new(space),
            laser: Slice::new(LASER_COMPONENTS),
            chi: Slice::new(CHI_COMPONENTS),
        }
    }

    fn check_fields(flds: &Flds) -> Result<(), PicError> {
        flds.laser()?;
        flds.chi()?;
        Ok(())
    }

    fn span(&self) -> [Int; 3] {
        self.em.span
    }

    fn load_field_slice(&mut self, flds: &Flds, bounds: &SubarrayBounds) -> Result<(), PicError> {
        self.em.load_field_slice(flds, bounds)?;
        self.laser.load(flds.laser()?, bounds);
        Ok(())
    }

    fn init_source_slice(
        &mut self,
        flds: &Flds,
        bounds: &SubarrayBounds,
        needs_atomic: bool,
    ) -> Result<(), PicError> {
        self.em.init_source_slice(flds, bounds, needs_atomic)?;
        self.chi.init_sources(flds.chi()?, bounds, needs_atomic);
        Ok(())
    }

    #[inline(always)]
    fn gather(&self, w: &Weights) -> PgcSample {
        let l = self.laser.gather::<LASER_COMPONENTS>(w);
        PgcSample {
            em: self.em.gather(w),
            a2: l[0],
            grad_a2: [l[1], l[2], l[3]],
        }
    }

    #[inline(always)]
    fn scatter(&mut self, w: &Weights, dep: &PgcDeposit) {
        self.em.scatter(w, &dep.current);
        self.chi.scatter(w, &[dep.chi]);
    }

    fn deposit_source_slice(&self, flds: &Flds, needs_atomic: bool) -> Result<(), PicError> {
        self.em.deposit_source_slice(flds, needs_atomic)?;
        self.chi.deposit(flds.chi()?, needs_atomic);
        Ok(())
    }
}

/// Reads the guiding wave's rho and J. Nothing is deposited.
#[derive(Clone, Debug)]
pub struct BohmianTiler<const D: usize> {
    span: [Int; 3],
    guide: Slice,
}

impl<const D: usize> Tiler for BohmianTiler<D> {
    type Local = GuideSample;
    type Deposit = ();
    const PLANAR: bool = D == 2;

    fn new(space: &DiscreteSpace) -> Self {
        BohmianTiler {
            span: stencil_span::<D>(space),
            guide: Slice::new(QO_COMPONENTS),
        }
    }

    fn check_fields(flds: &Flds) -> Result<(), PicError> {
        flds.qo_j4()?;
        Ok(())
    }

    fn span(&self) -> [Int; 3] {
        self.span
    }

    fn load_field_slice(&mut self, flds: &Flds, bounds: &SubarrayBounds) -> Result<(), PicError> {
        self.guide.load(flds.qo_j4()?, bounds);
        Ok(())
    }

    fn init_source_slice(
        &mut self,
        _flds: &Flds,
        _bounds: &SubarrayBounds,
        _needs_atomic: bool,
    ) -> Result<(), PicError> {
        Ok(())
    }

    #[inline(always)]
    fn gather(&self, w: &Weights) -> GuideSample {
        let g = self.guide.gather::<QO_COMPONENTS>(w);
        GuideSample {
            rho: g[0],
            j: [g[1], g[2], g[3]],
        }
    }

    fn scatter(&mut self, _w: &Weights, _dep: &()) {}

    fn deposit_source_slice(&self, _flds: &Flds, _needs_atomic: bool) -> Result<(), PicError> {
        Ok(())
    }
}

pub type TilerEM2D = EmTiler<2>;
pub type TilerEM3D = EmTiler<3>;
pub type TilerPGC2D = PgcTiler<2>;
pub type TilerPGC3D = PgcTiler<3>;
pub type TilerBohmian2D = BohmianTiler<2>;
pub type TilerBohmian3D = BohmianTiler<3>;
