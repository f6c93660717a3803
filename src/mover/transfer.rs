use crate::prtls::{Particle, TransferParticle};
use crate::space::DiscreteSpace;
use crate::Int;
use std::sync::{Mutex, PoisonError};

/// Subdomain offset a particle in `cell` moves to, and its cell in the
/// frame of that subdomain. Ignorable axes never leave.
pub fn destination(space: &DiscreteSpace, cell: [Int; 3]) -> ([Int; 3], [Int; 3]) {
    let dim = space.dim();
    let ignorable = space.ignorable();
    let mut dst = [0; 3];
    let mut local = cell;
    for a in 0..3 {
        if ignorable[a + 1] {
            continue;
        }
        dst[a] = (cell[a] - 1).div_euclid(dim[a + 1]);
        local[a] = cell[a] - dst[a] * dim[a + 1];
    }
    (dst, local)
}

/// Departures collected by every task of one advance.
#[derive(Debug, Default)]
pub struct TransferBuffer {
    departed: Mutex<Vec<TransferParticle>>,
}

impl TransferBuffer {
    pub fn new() -> TransferBuffer {
        TransferBuffer::default()
    }

    /// Records a particle that is leaving. Safe to call from any task.
    pub fn add_transfer_particle(&self, space: &DiscreteSpace, prtl: &Particle) {
        let (dst, cell) = destination(space, prtl.cell);
        let mut particle = *prtl;
        particle.cell = cell;
        self.departed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TransferParticle { particle, dst });
    }

    pub fn len(&self) -> usize {
        self.departed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The departures ordered by tag, independent of task scheduling.
    pub fn into_sorted(self) -> Vec<TransferParticle> {
        let mut departed = self
            .departed
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        departed.sort_by_key(|t| t.particle.tag);
        departed
    }
}
