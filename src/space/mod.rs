use crate::error::PicError;
use crate::prtls::Particle;
use crate::{Float, Int};
use strength_reduce::StrengthReducedU64;
use tracing::debug;

pub mod axes;
pub mod checkpoint;
pub mod dispatch;

pub use axes::{Axes4, Axis};
pub use checkpoint::CHECKPOINT_LEN;
pub use dispatch::GridRegion;

/// Geometry of one subdomain: grid sizing, ghost bookkeeping, strides for
/// linear addressing and the timestep scalars.
///
/// Index conventions along a non-ignorable axis with `dim` interior cells
/// and `g` ghost layers:
///
/// ```text
///   lfg        lng   1 ........ dim   ung        ufg
///  1 - g  ...   0    [  interior  ]  dim+1  ...  dim+g
/// ```
///
/// An axis with a single cell is ignorable: all its bounds collapse to 1
/// and its encoding stride is zero, so any index written along it lands on
/// the same storage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscreteSpace {
    dt: Float,
    dth: Float,
    dti: Float,
    corner: [Float; 3],
    size: [Float; 3],
    global_corner: [Float; 3],
    global_size: [Float; 3],
    spacing: [Float; 3],
    freq: [Float; 3],
    num: Axes4<Int>,
    dim: Axes4<Int>,
    lfg: Axes4<Int>,
    ufg: Axes4<Int>,
    lng: Axes4<Int>,
    ung: Axes4<Int>,
    ignorable: Axes4<bool>,
    encoding_stride: Axes4<Int>,
    decoding_stride: Axes4<Int>,
    layers: Axes4<Int>,
}

impl DiscreteSpace {
    /// Single subdomain covering the whole global box.
    pub fn new(
        dims: [Int; 3],
        corner: [Float; 3],
        size: [Float; 3],
        ghost_layers: Int,
    ) -> Result<DiscreteSpace, PicError> {
        let dim = Axes4::from_spatial(0, dims);
        let mut space = DiscreteSpace::default();
        space.resize(dim, dim, Axes4::default(), corner, size, ghost_layers)?;
        Ok(space)
    }

    /// Recomputes every derived quantity. The receiver is untouched when
    /// the geometry is rejected.
    pub fn resize(
        &mut self,
        dim: Axes4<Int>,
        global_dim: Axes4<Int>,
        domain_index: Axes4<Int>,
        global_corner: [Float; 3],
        global_size: [Float; 3],
        ghost_layers: Int,
    ) -> Result<(), PicError> {
        if ghost_layers < 0 {
            return Err(PicError::InvalidGeometry(format!(
                "ghost layers must be non-negative, got {}",
                ghost_layers
            )));
        }
        for i in 1..=3 {
            if dim[i] < 1 || global_dim[i] < 1 {
                return Err(PicError::InvalidGeometry(format!(
                    "axis {} needs at least one cell (local {}, global {})",
                    i, dim[i], global_dim[i]
                )));
            }
            if domain_index[i] < 0 || (domain_index[i] + 1) * dim[i] > global_dim[i] {
                return Err(PicError::InvalidGeometry(format!(
                    "axis {}: block {} of {} cells does not fit in {} global cells",
                    i, domain_index[i], dim[i], global_dim[i]
                )));
            }
            let spacing = global_size[i - 1] / global_dim[i] as Float;
            if !(spacing > 0.0) || !spacing.is_finite() {
                return Err(PicError::InvalidGeometry(format!(
                    "axis {} would have spacing {}",
                    i, spacing
                )));
            }
        }

        self.dim = Axes4::new(0, dim[1], dim[2], dim[3]);
        self.num[0] = 0;
        self.ignorable[0] = false;
        self.lfg[0] = 0;
        self.ufg[0] = 0;
        self.lng[0] = 0;
        self.ung[0] = 0;
        self.layers[0] = ghost_layers;

        for i in 1..=3 {
            if dim[i] == 1 {
                self.layers[i] = 0;
                self.lfg[i] = 1;
                self.ufg[i] = 1;
                self.lng[i] = 1;
                self.ung[i] = 1;
            } else {
                self.layers[i] = ghost_layers;
                self.lfg[i] = 1 - ghost_layers;
                self.ufg[i] = dim[i] + ghost_layers;
                self.lng[i] = 0;
                self.ung[i] = dim[i] + 1;
            }
            self.num[i] = self.ufg[i] - self.lfg[i] + 1;
        }

        self.decoding_stride = Axes4::new(0, self.num[2] * self.num[3], self.num[3], 1);
        self.encoding_stride = self.decoding_stride;
        for i in 1..=3 {
            self.ignorable[i] = dim[i] == 1;
            if self.ignorable[i] {
                self.encoding_stride[i] = 0;
            }
        }

        self.global_corner = global_corner;
        self.global_size = global_size;
        for i in 1..=3 {
            self.spacing[i - 1] = global_size[i - 1] / global_dim[i] as Float;
            self.freq[i - 1] = 1.0 / self.spacing[i - 1];
            self.size[i - 1] = dim[i] as Float * self.spacing[i - 1];
            self.corner[i - 1] = global_corner[i - 1] + domain_index[i] as Float * self.size[i - 1];
        }
        debug!(
            dim = ?self.dim.spatial(),
            num = ?self.num.spatial(),
            layers = ghost_layers,
            "resized discrete space"
        );
        Ok(())
    }

    pub fn set_dt(&mut self, dt: Float) -> Result<(), PicError> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(PicError::InvalidGeometry(format!(
                "timestep must be positive, got {}",
                dt
            )));
        }
        self.dt = dt;
        self.dth = 0.5 * dt;
        self.dti = 1.0 / dt;
        Ok(())
    }

    /// Linear storage offset of a cell. Ignorable axes contribute nothing.
    #[inline(always)]
    pub fn encode(&self, cell: [Int; 3]) -> usize {
        let es = &self.encoding_stride;
        let lfg = &self.lfg;
        ((cell[0] - lfg[1]) * es[1] + (cell[1] - lfg[2]) * es[2] + (cell[2] - lfg[3]) * es[3])
            as usize
    }

    /// Offset including the element axis, for storage with `comps`
    /// elements per point.
    #[inline(always)]
    pub fn encode4(&self, idx: Axes4<Int>, comps: usize) -> usize {
        self.encode(idx.spatial()) * comps + idx.element() as usize
    }

    #[inline(always)]
    pub fn decode(&self, offset: usize) -> [Int; 3] {
        let o = offset as Int;
        let ds = &self.decoding_stride;
        [
            self.lfg[1] + (o / ds[1]) % self.num[1],
            self.lfg[2] + (o / ds[2]) % self.num[2],
            self.lfg[3] + (o / ds[3]) % self.num[3],
        ]
    }

    /// A decoder with the divisions strength-reduced, for hot loops.
    pub fn decoder(&self) -> Decoder {
        let reduce = |v: Int| StrengthReducedU64::new(v.max(1) as u64);
        Decoder {
            stride: [
                reduce(self.decoding_stride[1]),
                reduce(self.decoding_stride[2]),
                reduce(self.decoding_stride[3]),
            ],
            num: [reduce(self.num[1]), reduce(self.num[2]), reduce(self.num[3])],
            lfg: self.lfg.spatial(),
        }
    }

    /// True when the y axis is ignorable, i.e. the run is planar (xz).
    pub fn is_planar(&self) -> bool {
        self.ignorable.y()
    }

    /// Whether the cell lies inside `[lng, ung]` on every axis.
    #[inline(always)]
    pub fn contains_near(&self, cell: [Int; 3]) -> bool {
        (0..3).all(|i| cell[i] >= self.lng[i + 1] && cell[i] <= self.ung[i + 1])
    }

    /// Physical position of a particle.
    pub fn position(&self, prtl: &Particle) -> [Float; 3] {
        let mut pos = [0.0; 3];
        for i in 0..3 {
            pos[i] = self.corner[i] + (prtl.cell[i] as Float - 0.5 + prtl.x[i]) * self.spacing[i];
        }
        pos
    }

    /// Splits a physical position into a cell and an offset in `[-0.5, 0.5)`
    /// from that cell's center. Ignorable axes always map to the center of
    /// cell 1.
    pub fn locate(&self, pos: [Float; 3]) -> ([Int; 3], [Float; 3]) {
        let mut cell = [1; 3];
        let mut x = [0.0; 3];
        for i in 0..3 {
            if self.ignorable[i + 1] {
                continue;
            }
            let s = (pos[i] - self.corner[i]) * self.freq[i] + 0.5;
            let c = (s + 0.5).floor();
            cell[i] = c as Int;
            x[i] = s - c;
        }
        (cell, x)
    }

    pub fn dt(&self) -> Float {
        self.dt
    }
    pub fn dth(&self) -> Float {
        self.dth
    }
    pub fn dti(&self) -> Float {
        self.dti
    }
    pub fn corner(&self) -> [Float; 3] {
        self.corner
    }
    pub fn size(&self) -> [Float; 3] {
        self.size
    }
    pub fn global_corner(&self) -> [Float; 3] {
        self.global_corner
    }
    pub fn global_size(&self) -> [Float; 3] {
        self.global_size
    }
    pub fn spacing(&self) -> [Float; 3] {
        self.spacing
    }
    pub fn freq(&self) -> [Float; 3] {
        self.freq
    }
    pub fn num(&self) -> Axes4<Int> {
        self.num
    }
    pub fn dim(&self) -> Axes4<Int> {
        self.dim
    }
    pub fn lfg(&self) -> Axes4<Int> {
        self.lfg
    }
    pub fn ufg(&self) -> Axes4<Int> {
        self.ufg
    }
    pub fn lng(&self) -> Axes4<Int> {
        self.lng
    }
    pub fn ung(&self) -> Axes4<Int> {
        self.ung
    }
    pub fn ignorable(&self) -> Axes4<bool> {
        self.ignorable
    }
    pub fn encoding_stride(&self) -> Axes4<Int> {
        self.encoding_stride
    }
    pub fn decoding_stride(&self) -> Axes4<Int> {
        self.decoding_stride
    }
    pub fn layers(&self) -> Axes4<Int> {
        self.layers
    }

    /// Number of storage points, ghosts included.
    pub fn points(&self) -> usize {
        (self.num[1] * self.num[2] * self.num[3]) as usize
    }
}

/// Strength-reduced inverse of `DiscreteSpace::encode`.
pub struct Decoder {
    stride: [StrengthReducedU64; 3],
    num: [StrengthReducedU64; 3],
    lfg: [Int; 3],
}

impl Decoder {
    #[inline(always)]
    pub fn decode(&self, offset: usize) -> [Int; 3] {
        let o = offset as u64;
        [
            self.lfg[0] + ((o / self.stride[0]) % self.num[0]) as Int,
            self.lfg[1] + ((o / self.stride[1]) % self.num[1]) as Int,
            self.lfg[2] + ((o / self.stride[2]) % self.num[2]) as Int,
        ]
    }
}
