use crate::error::PicError;
use crate::space::DiscreteSpace;
use crate::{Float, Int};
use itertools::izip;
use rand::prelude::*;
use rand_distr::StandardNormal;
use tracing::debug;

/// One macro-particle.
///
/// The position is a cell index plus an offset `x` in `[-0.5, 0.5)` from
/// the center of that cell, in units of the grid spacing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Particle {
    pub cell: [Int; 3],
    pub x: [Float; 3],
    pub p: [Float; 3],
    pub number: Float,
    pub aux1: Float,
    pub aux2: Float,
    pub tag: u64,
}

impl Particle {
    pub fn is_finite(&self) -> bool {
        self.x.iter().chain(self.p.iter()).all(|v| v.is_finite())
    }
}

/// A particle that left the subdomain, with its cell already expressed in
/// the frame of the destination subdomain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferParticle {
    pub particle: Particle,
    /// Subdomain offset along x, y, z.
    pub dst: [Int; 3],
}

/// Index into the particle list plus its encoded cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParticleRef {
    pub key: usize,
    pub idx: usize,
}

/// A species: its constants and the particles it owns.
pub struct Species {
    pub name: String,
    pub charge: Float,
    pub mass: Float,
    pub particle: Vec<Particle>,
    pub transfer: Vec<TransferParticle>,
}

impl Species {
    pub fn new(name: &str, charge: Float, mass: Float) -> Species {
        Species {
            name: name.to_string(),
            charge,
            mass,
            particle: Vec::new(),
            transfer: Vec::new(),
        }
    }

    /// Places `ppc` particles in every interior cell at regular offsets,
    /// each carrying `density / ppc`.
    pub fn load_uniform(&mut self, space: &DiscreteSpace, ppc: usize, density: Float) {
        let dim = space.dim();
        let ignorable = space.ignorable();
        self.particle.reserve(ppc * space.cell_update_protocol().len());
        for i in 1..=dim.x() {
            for j in 1..=dim.y() {
                for k in 1..=dim.z() {
                    for n in 0..ppc {
                        // same offset on every axis, spread over the cell
                        let r1 = (2.0 * n as Float + 1.0) / (2.0 * ppc as Float) - 0.5;
                        let mut x = [r1; 3];
                        for a in 0..3 {
                            if ignorable[a + 1] {
                                x[a] = 0.0;
                            }
                        }
                        self.particle.push(Particle {
                            cell: [i, j, k],
                            x,
                            number: density / ppc as Float,
                            tag: self.particle.len() as u64,
                            ..Default::default()
                        });
                    }
                }
            }
        }
        debug!(species = %self.name, count = self.particle.len(), "loaded particles");
    }

    /// Gives every particle a thermal momentum with spread `vth * mass`.
    pub fn thermalize<R: Rng>(&mut self, rng: &mut R, vth: Float) {
        for prtl in self.particle.iter_mut() {
            for p in prtl.p.iter_mut() {
                let r: Float = rng.sample(StandardNormal);
                *p = r * vth * self.mass;
            }
        }
    }

    /// Single-subdomain exchange: every transfer comes back through the
    /// opposite face, which makes the subdomain periodic. The transfer list
    /// is drained, or left untouched if any entry lands outside the grid.
    pub fn exchange_periodic(&mut self, space: &DiscreteSpace) -> Result<usize, PicError> {
        if let Some((pos, t)) = self
            .transfer
            .iter()
            .enumerate()
            .find(|(_, t)| !space.contains_near(t.particle.cell))
        {
            return Err(PicError::CorruptedState {
                species: self.name.clone(),
                index: pos,
                task: 0,
                detail: format!(
                    "transfer with tag {} lands in cell {:?}, outside the subdomain",
                    t.particle.tag, t.particle.cell
                ),
            });
        }
        let count = self.transfer.len();
        self.particle.extend(self.transfer.drain(..).map(|t| t.particle));
        Ok(count)
    }
}

/// Total charge and current carried by a particle list.
pub fn moments(particle: &[Particle], charge: Float, mass: Float) -> (Float, [Float; 3]) {
    let mut rho = 0.0;
    let mut j = [0.0; 3];
    for prtl in particle {
        let gamma = (1.0 + prtl.p.iter().map(|p| p * p).sum::<Float>() / (mass * mass)).sqrt();
        let q = charge * prtl.number;
        rho += q;
        for (ja, pa) in izip!(j.iter_mut(), prtl.p.iter()) {
            *ja += q * pa / (mass * gamma);
        }
    }
    (rho, j)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{build_planar_test_space, build_test_space, E_TOL};
    use rand::rngs::StdRng;

    #[test]
    fn uniform_load_fills_interior() {
        let space = build_test_space();
        let mut sp = Species::new("electrons", -1.0, 1.0);
        sp.load_uniform(&space, 2, 1.0);
        assert_eq!(sp.particle.len(), 2 * 512);
        for (n, prtl) in sp.particle.iter().enumerate() {
            assert_eq!(prtl.tag, n as u64);
            assert!(prtl.cell.iter().all(|&c| (1..=8).contains(&c)));
            assert!(prtl.x.iter().all(|&x| (-0.5..0.5).contains(&x)));
            assert!((prtl.number - 0.5).abs() < E_TOL);
        }
        assert!((sp.particle[0].x[0] + 0.25).abs() < E_TOL);
        assert!((sp.particle[1].x[0] - 0.25).abs() < E_TOL);
    }

    #[test]
    fn planar_load_keeps_ignorable_axis_centered() {
        let space = build_planar_test_space();
        let mut sp = Species::new("ions", 1.0, 1836.0);
        sp.load_uniform(&space, 3, 1.0);
        assert_eq!(sp.particle.len(), 3 * 64);
        assert!(sp.particle.iter().all(|p| p.cell[1] == 1 && p.x[1] == 0.0));
    }

    #[test]
    fn thermal_momenta_scale_with_mass() {
        let space = build_test_space();
        let mut sp = Species::new("ions", 1.0, 100.0);
        sp.load_uniform(&space, 1, 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        sp.thermalize(&mut rng, 0.01);
        let n = sp.particle.len() as Float;
        let var = sp.particle.iter().map(|p| p.p[0] * p.p[0]).sum::<Float>() / n;
        // spread is vth * mass = 1
        assert!((var - 1.0).abs() < 0.25);
        assert!(sp.particle.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn exchange_returns_transfers() {
        let space = build_test_space();
        let mut sp = Species::new("ions", 1.0, 4.0);
        sp.transfer.push(TransferParticle {
            particle: Particle {
                cell: [2, 4, 4],
                ..Default::default()
            },
            dst: [1, 0, 0],
        });
        assert_eq!(sp.exchange_periodic(&space).unwrap(), 1);
        assert!(sp.transfer.is_empty());
        assert_eq!(sp.particle.len(), 1);
    }

    #[test]
    fn bad_transfer_names_species_and_position() {
        let space = build_test_space();
        let mut sp = Species::new("ions", 1.0, 4.0);
        for (tag, cell) in [[3, 4, 4], [20, 4, 4]].iter().enumerate() {
            sp.transfer.push(TransferParticle {
                particle: Particle {
                    cell: *cell,
                    tag: 70 + tag as u64,
                    ..Default::default()
                },
                dst: [0, 0, 0],
            });
        }
        match sp.exchange_periodic(&space) {
            Err(PicError::CorruptedState {
                species,
                index,
                detail,
                ..
            }) => {
                assert_eq!(species, "ions");
                assert_eq!(index, 1);
                assert!(detail.contains("tag 71"));
            }
            other => panic!("expected corrupted state, got {:?}", other),
        }
        assert_eq!(sp.transfer.len(), 2);
        assert!(sp.particle.is_empty());
    }

    #[test]
    fn moments_of_cold_particles() {
        let prtls = vec![
            Particle {
                number: 2.0,
                ..Default::default()
            },
            Particle {
                number: 1.0,
                p: [0.0, 0.0, 0.0],
                ..Default::default()
            },
        ];
        let (rho, j) = moments(&prtls, -1.0, 1.0);
        assert!((rho + 3.0).abs() < E_TOL);
        assert!(j.iter().all(|v| v.abs() < E_TOL));
    }
}
