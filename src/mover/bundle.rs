use super::pushers::{BohmianPusher, BorisPusher, PgcPusher, Pusher, UnitaryPusher};
use super::tilers::{Tiler, Weights};
use super::tilers::{TilerBohmian2D, TilerBohmian3D, TilerEM2D, TilerEM3D, TilerPGC2D, TilerPGC3D};
use super::transfer::TransferBuffer;
use crate::error::PicError;
use crate::flds::Flds;
use crate::prtls::{Particle, ParticleRef};
use crate::space::{Axes4, Decoder, DiscreteSpace};
use crate::{Float, Int};

/// Particles pushed together against one set of field slices.
pub const BUNDLE_SIZE: usize = 16;

/// Inclusive cell box of a field sub-region. Slot 0 is unused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubarrayBounds {
    pub low: Axes4<Int>,
    pub high: Axes4<Int>,
}

impl SubarrayBounds {
    pub fn overlaps(&self, other: &SubarrayBounds) -> bool {
        (1..=3).all(|i| self.low[i] <= other.high[i] && other.low[i] <= self.high[i])
    }
}

/// Bounding box of the cells holding `sorted`, widened by `layers` and
/// clamped to the full-ghost region. `sorted` must not be empty.
pub fn get_subarray_bounds(
    space: &DiscreteSpace,
    decoder: &Decoder,
    sorted: &[ParticleRef],
    layers: [Int; 3],
) -> SubarrayBounds {
    let mut lo = [Int::MAX; 3];
    let mut hi = [Int::MIN; 3];
    for r in sorted {
        let cell = decoder.decode(r.key);
        for a in 0..3 {
            lo[a] = lo[a].min(cell[a]);
            hi[a] = hi[a].max(cell[a]);
        }
    }
    let (lfg, ufg) = (space.lfg(), space.ufg());
    let mut bounds = SubarrayBounds::default();
    for a in 0..3 {
        bounds.low[a + 1] = (lo[a] - layers[a]).max(lfg[a + 1]);
        bounds.high[a + 1] = (hi[a] + layers[a]).min(ufg[a + 1]);
    }
    bounds
}

/// What a task hands back for commit: new states of the particles that
/// stayed and the indices of those that left.
#[derive(Debug, Default)]
pub struct TaskOutput {
    pub moved: Vec<(usize, Particle)>,
    pub departed: Vec<usize>,
}

/// Moves one task's particles a bundle at a time with pusher `P` and the
/// field access of tiler `T`.
pub struct BundleMover<'a, P, T> {
    pusher: &'a P,
    tiler: T,
    space: &'a DiscreteSpace,
    decoder: Decoder,
    species: &'a str,
    task: usize,
    frozen: [bool; 3],
    /// Longest step, in cells, that still lands on a neighbor's grid.
    max_shift: [Int; 3],
    bundle: Vec<(usize, Particle)>,
}

impl<'a, P, T> BundleMover<'a, P, T>
where
    P: Pusher,
    T: Tiler<Local = P::Local, Deposit = P::Deposit>,
{
    pub fn new(pusher: &'a P, space: &'a DiscreteSpace, species: &'a str, task: usize) -> Self {
        let ignorable = space.ignorable();
        let (dim, layers) = (space.dim(), space.layers());
        BundleMover {
            pusher,
            tiler: T::new(space),
            space,
            decoder: space.decoder(),
            species,
            task,
            frozen: [ignorable.x(), ignorable.y(), ignorable.z()],
            max_shift: [
                dim.x() + layers.x(),
                dim.y() + layers.y(),
                dim.z() + layers.z(),
            ],
            bundle: Vec::with_capacity(BUNDLE_SIZE),
        }
    }

    /// Pushes every particle of a task. `refs` is the task's sorted range.
    pub fn move_slice(
        &mut self,
        refs: &[ParticleRef],
        particle: &[Particle],
        flds: &Flds,
        needs_atomic: bool,
        transfers: &TransferBuffer,
    ) -> Result<TaskOutput, PicError> {
        let mut out = TaskOutput {
            moved: Vec::with_capacity(refs.len()),
            departed: Vec::new(),
        };
        for chunk in refs.chunks(BUNDLE_SIZE) {
            self.move_bundle(chunk, particle, flds, needs_atomic, transfers, &mut out)?;
        }
        Ok(out)
    }

    fn move_bundle(
        &mut self,
        refs: &[ParticleRef],
        particle: &[Particle],
        flds: &Flds,
        needs_atomic: bool,
        transfers: &TransferBuffer,
        out: &mut TaskOutput,
    ) -> Result<(), PicError> {
        let span = self.tiler.span();
        let bounds = get_subarray_bounds(self.space, &self.decoder, refs, span);
        self.tiler.load_field_slice(flds, &bounds)?;
        self.tiler.init_source_slice(flds, &bounds, needs_atomic)?;

        let dt = self.space.dt();
        self.bundle.clear();
        for r in refs {
            let mut prtl = particle[r.idx];
            let w = Weights::new(&prtl, span);
            let local = self.tiler.gather(&w);
            let (v, dep) = self.pusher.push(&mut prtl, &local, dt);
            let start = prtl.cell;
            if !self.advance_position(&mut prtl, &v, dt) {
                return Err(self.corrupted(
                    r.idx,
                    format!("step from cell {:?} with velocity {:?} leaves the grid", start, v),
                ));
            }
            if !prtl.is_finite() {
                return Err(self.corrupted(
                    r.idx,
                    format!("non-finite state after push: x {:?}, p {:?}", prtl.x, prtl.p),
                ));
            }
            self.tiler.scatter(&w, &dep);
            self.bundle.push((r.idx, prtl));
        }
        self.tiler.deposit_source_slice(flds, needs_atomic)?;

        for &(idx, prtl) in &self.bundle {
            if self.space.contains_near(prtl.cell) {
                out.moved.push((idx, prtl));
            } else {
                transfers.add_transfer_particle(self.space, &prtl);
                out.departed.push(idx);
            }
        }
        Ok(())
    }

    fn corrupted(&self, index: usize, detail: String) -> PicError {
        PicError::CorruptedState {
            species: self.species.to_string(),
            index,
            task: self.task,
            detail,
        }
    }

    /// `x += v dt / spacing`, then moves whole cells out of `x` so that it
    /// is back in `[-0.5, 0.5)`. Returns false, leaving the cell alone, when
    /// the step is NaN or longer than `max_shift` cells.
    #[inline(always)]
    fn advance_position(&self, prtl: &mut Particle, v: &[Float; 3], dt: Float) -> bool {
        let freq = self.space.freq();
        for a in 0..3 {
            if self.frozen[a] {
                continue;
            }
            let x = prtl.x[a] + v[a] * dt * freq[a];
            let shift = (x + 0.5).floor();
            if !(shift.abs() <= self.max_shift[a] as Float) {
                return false;
            }
            prtl.cell[a] += shift as Int;
            prtl.x[a] = x - shift;
        }
        true
    }
}

pub type BundleMoverBoris2D<'a> = BundleMover<'a, BorisPusher, TilerEM2D>;
pub type BundleMoverBoris3D<'a> = BundleMover<'a, BorisPusher, TilerEM3D>;
pub type BundleMoverUnitary2D<'a> = BundleMover<'a, UnitaryPusher, TilerEM2D>;
pub type BundleMoverUnitary3D<'a> = BundleMover<'a, UnitaryPusher, TilerEM3D>;
pub type BundleMoverPGC2D<'a> = BundleMover<'a, PgcPusher, TilerPGC2D>;
pub type BundleMoverPGC3D<'a> = BundleMover<'a, PgcPusher, TilerPGC3D>;
pub type BundleMoverBohmian2D<'a> = BundleMover<'a, BohmianPusher, TilerBohmian2D>;
pub type BundleMoverBohmian3D<'a> = BundleMover<'a, BohmianPusher, TilerBohmian3D>;
