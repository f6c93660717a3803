use crate::error::PicError;
use crate::flds::Flds;
use crate::prtls::{Particle, ParticleRef, TransferParticle};
use crate::space::DiscreteSpace;
use crate::{Float, Int};
use rayon::prelude::*;
use serde::Deserialize;
use std::marker::PhantomData;
use tracing::{debug, trace};

pub mod bundle;
pub mod pushers;
pub mod tasks;
pub mod tilers;
pub mod transfer;

pub use bundle::{get_subarray_bounds, BundleMover, SubarrayBounds, TaskOutput, BUNDLE_SIZE};
pub use pushers::{BohmianPusher, BorisPusher, PgcPusher, Pusher, UnitaryPusher};
pub use tasks::{bunch_tasks, spread_tasks, TaskPolicy};
pub use tilers::{Tiler, STENCIL_LAYERS};
pub use tilers::{TilerBohmian2D, TilerBohmian3D, TilerEM2D, TilerEM3D, TilerPGC2D, TilerPGC3D};
pub use transfer::TransferBuffer;

/// Which momentum update a species uses.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PusherKind {
    Boris,
    Unitary,
    Pgc,
    Bohmian,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct MoverSettings {
    /// Number of tasks per advance. 0 means one per worker thread.
    #[serde(default)]
    pub tasks: usize,
    #[serde(default)]
    pub policy: TaskPolicy,
}

impl MoverSettings {
    pub fn task_count(&self) -> usize {
        if self.tasks == 0 {
            rayon::current_num_threads()
        } else {
            self.tasks
        }
    }
}

/// Summary of one advance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub pushed: usize,
    pub transferred: usize,
    pub tasks: usize,
    pub needs_atomic: bool,
}

/// One timestep of one species, whatever the pusher and tiler.
pub trait Advance: Send + Sync {
    fn name(&self) -> &str;

    /// Timestep changed by the driver.
    fn set_dt(&mut self, dt: Float) -> Result<(), PicError>;

    /// Pushes every particle once and deposits its sources. Particles that
    /// leave the subdomain are removed from `particle` and appended to
    /// `transfer`. On error `particle` and `transfer` are untouched.
    fn advance(
        &self,
        particle: &mut Vec<Particle>,
        transfer: &mut Vec<TransferParticle>,
        flds: &Flds,
    ) -> Result<MoveReport, PicError>;
}

/// Owns the species constants and schedules the tasks of an advance.
pub struct Mover<P, T> {
    name: String,
    q0: Float,
    m0: Float,
    space: DiscreteSpace,
    settings: MoverSettings,
    span: [Int; 3],
    pusher: P,
    tiler: PhantomData<fn() -> T>,
}

impl<P, T> Mover<P, T>
where
    P: Pusher,
    T: Tiler<Local = P::Local, Deposit = P::Deposit>,
{
    pub fn new(
        name: &str,
        q0: Float,
        m0: Float,
        space: &DiscreteSpace,
        settings: MoverSettings,
    ) -> Result<Self, PicError> {
        if T::PLANAR && !space.is_planar() {
            return Err(PicError::InvalidGeometry(format!(
                "species '{}': planar mover on a grid with {} cells along y",
                name,
                space.dim().y()
            )));
        }
        let ignorable = space.ignorable();
        let layers = space.layers();
        for a in 1..=3 {
            if !ignorable[a] && layers[a] < STENCIL_LAYERS + 1 {
                return Err(PicError::InvalidGeometry(format!(
                    "species '{}': axis {} has {} ghost layers, the mover needs {}",
                    name,
                    a,
                    layers[a],
                    STENCIL_LAYERS + 1
                )));
            }
        }
        if !(m0 > 0.0) {
            return Err(PicError::InvalidGeometry(format!(
                "species '{}': mass must be positive, got {}",
                name, m0
            )));
        }
        let span = T::new(space).span();
        debug!(species = name, q0, m0, ?span, planar = T::PLANAR, "built mover");
        Ok(Mover {
            name: name.to_string(),
            q0,
            m0,
            space: space.clone(),
            settings,
            span,
            pusher: P::new(q0, m0),
            tiler: PhantomData,
        })
    }

    pub fn q0(&self) -> Float {
        self.q0
    }

    pub fn m0(&self) -> Float {
        self.m0
    }

    pub fn space(&self) -> &DiscreteSpace {
        &self.space
    }

    /// References to every particle sorted by cell, then by index.
    pub fn sort_particles(&self, particle: &[Particle]) -> Result<Vec<ParticleRef>, PicError> {
        let mut sorted = Vec::with_capacity(particle.len());
        for (idx, prtl) in particle.iter().enumerate() {
            if !self.space.contains_near(prtl.cell) {
                return Err(self.corrupted(
                    idx,
                    0,
                    format!("starts in cell {:?}, outside the subdomain", prtl.cell),
                ));
            }
            sorted.push(ParticleRef {
                key: self.space.encode(prtl.cell),
                idx,
            });
        }
        sorted.par_sort_unstable();
        Ok(sorted)
    }

    /// Task boundaries over the sorted references.
    pub fn task_map(&self, sorted: &[ParticleRef]) -> Vec<usize> {
        let tasks = self.settings.task_count();
        match self.settings.policy {
            TaskPolicy::Spread => spread_tasks(sorted.len(), tasks),
            TaskPolicy::Bunch => bunch_tasks(sorted, tasks, BUNDLE_SIZE),
        }
    }

    /// True when two tasks may deposit into the same cell.
    pub fn needs_atomic(&self, sorted: &[ParticleRef], task_map: &[usize]) -> bool {
        let decoder = self.space.decoder();
        let footprints: Vec<SubarrayBounds> = task_map
            .windows(2)
            .map(|w| get_subarray_bounds(&self.space, &decoder, &sorted[w[0]..w[1]], self.span))
            .collect();
        for (n, a) in footprints.iter().enumerate() {
            if footprints[n + 1..].iter().any(|b| a.overlaps(b)) {
                return true;
            }
        }
        false
    }

    fn corrupted(&self, index: usize, task: usize, detail: String) -> PicError {
        PicError::CorruptedState {
            species: self.name.clone(),
            index,
            task,
            detail,
        }
    }

    fn move_slice(
        &self,
        task: usize,
        refs: &[ParticleRef],
        particle: &[Particle],
        flds: &Flds,
        needs_atomic: bool,
        transfers: &TransferBuffer,
    ) -> Result<TaskOutput, PicError> {
        trace!(species = %self.name, task, count = refs.len(), "moving slice");
        BundleMover::<P, T>::new(&self.pusher, &self.space, &self.name, task)
            .move_slice(refs, particle, flds, needs_atomic, transfers)
    }
}

impl<P, T> Advance for Mover<P, T>
where
    P: Pusher,
    T: Tiler<Local = P::Local, Deposit = P::Deposit>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn set_dt(&mut self, dt: Float) -> Result<(), PicError> {
        self.space.set_dt(dt)
    }

    fn advance(
        &self,
        particle: &mut Vec<Particle>,
        transfer: &mut Vec<TransferParticle>,
        flds: &Flds,
    ) -> Result<MoveReport, PicError> {
        T::check_fields(flds)?;
        if !(self.space.dt() > 0.0) {
            return Err(PicError::InvalidGeometry(format!(
                "species '{}': timestep not set",
                self.name
            )));
        }
        let sorted = self.sort_particles(particle)?;
        let task_map = self.task_map(&sorted);
        let tasks = task_map.len() - 1;
        let needs_atomic = self.needs_atomic(&sorted, &task_map);

        let transfers = TransferBuffer::new();
        let outputs = {
            let view: &[Particle] = particle;
            (0..tasks)
                .into_par_iter()
                .map(|task| {
                    let refs = &sorted[task_map[task]..task_map[task + 1]];
                    self.move_slice(task, refs, view, flds, needs_atomic, &transfers)
                })
                .collect::<Result<Vec<TaskOutput>, PicError>>()?
        };

        let mut keep = vec![true; particle.len()];
        for out in outputs {
            for (idx, prtl) in out.moved {
                particle[idx] = prtl;
            }
            for idx in out.departed {
                keep[idx] = false;
            }
        }
        let mut idx = 0;
        particle.retain(|_| {
            idx += 1;
            keep[idx - 1]
        });

        let mut departed = transfers.into_sorted();
        let report = MoveReport {
            pushed: sorted.len(),
            transferred: departed.len(),
            tasks,
            needs_atomic,
        };
        transfer.append(&mut departed);
        debug!(
            species = %self.name,
            pushed = report.pushed,
            transferred = report.transferred,
            tasks,
            needs_atomic,
            "advanced species"
        );
        Ok(report)
    }
}

pub type BorisMover2D = Mover<BorisPusher, TilerEM2D>;
pub type BorisMover3D = Mover<BorisPusher, TilerEM3D>;
pub type UnitaryMover2D = Mover<UnitaryPusher, TilerEM2D>;
pub type UnitaryMover3D = Mover<UnitaryPusher, TilerEM3D>;
pub type PgcMover2D = Mover<PgcPusher, TilerPGC2D>;
pub type PgcMover3D = Mover<PgcPusher, TilerPGC3D>;
pub type BohmianMover2D = Mover<BohmianPusher, TilerBohmian2D>;
pub type BohmianMover3D = Mover<BohmianPusher, TilerBohmian3D>;

/// Picks the mover for `kind`, planar when the grid has a single cell
/// along y.
pub fn build_mover(
    kind: PusherKind,
    name: &str,
    q0: Float,
    m0: Float,
    space: &DiscreteSpace,
    settings: MoverSettings,
) -> Result<Box<dyn Advance>, PicError> {
    let planar = space.is_planar();
    let mover: Box<dyn Advance> = match (kind, planar) {
        (PusherKind::Boris, true) => {
            Box::new(BorisMover2D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Boris, false) => {
            Box::new(BorisMover3D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Unitary, true) => {
            Box::new(UnitaryMover2D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Unitary, false) => {
            Box::new(UnitaryMover3D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Pgc, true) => {
            Box::new(PgcMover2D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Pgc, false) => {
            Box::new(PgcMover3D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Bohmian, true) => {
            Box::new(BohmianMover2D::new(name, q0, m0, space, settings)?)
        }
        (PusherKind::Bohmian, false) => {
            Box::new(BohmianMover3D::new(name, q0, m0, space, settings)?)
        }
    };
    Ok(mover)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::flds::{Field, SourceField, EM_COMPONENTS, QO_COMPONENTS, SOURCE_COMPONENTS};
    use crate::prtls::Species;
    use crate::{build_planar_test_space, build_test_space, FieldParams, FieldSet, E_TOL};
    use rand::prelude::*;

    fn thermal_species(space: &DiscreteSpace, ppc: usize) -> Species {
        let mut sp = Species::new("electrons", -1.0, 1.0);
        sp.load_uniform(space, ppc, 1.0);
        let mut rng = StdRng::seed_from_u64(11);
        sp.thermalize(&mut rng, 0.2);
        sp
    }

    fn settings(tasks: usize, policy: TaskPolicy) -> MoverSettings {
        MoverSettings { tasks, policy }
    }

    #[test]
    fn rejects_thin_ghosts_and_wrong_dimensionality() {
        let thin = DiscreteSpace::new([8, 8, 8], [0.0; 3], [1.0; 3], 1).unwrap();
        assert!(matches!(
            BorisMover3D::new("e", -1.0, 1.0, &thin, MoverSettings::default()),
            Err(PicError::InvalidGeometry(_))
        ));
        let space = build_test_space();
        assert!(BorisMover2D::new("e", -1.0, 1.0, &space, MoverSettings::default()).is_err());
        assert!(BorisMover3D::new("e", -1.0, 0.0, &space, MoverSettings::default()).is_err());
        // a single-cell axis needs no ghosts
        let planar = DiscreteSpace::new([8, 1, 8], [0.0; 3], [1.0; 3], 2).unwrap();
        assert!(BorisMover2D::new("e", -1.0, 1.0, &planar, MoverSettings::default()).is_ok());
    }

    #[test]
    fn factory_picks_planar_variant() {
        let planar = build_planar_test_space();
        for &kind in &[
            PusherKind::Boris,
            PusherKind::Unitary,
            PusherKind::Pgc,
            PusherKind::Bohmian,
        ] {
            let mover =
                build_mover(kind, "ions", 1.0, 4.0, &planar, MoverSettings::default()).unwrap();
            assert_eq!(mover.name(), "ions");
            let space = build_test_space();
            build_mover(kind, "ions", 1.0, 4.0, &space, MoverSettings::default()).unwrap();
        }
    }

    #[test]
    fn single_task_never_needs_atomics() {
        let space = build_test_space();
        let sp = thermal_species(&space, 2);
        let mover =
            BorisMover3D::new("e", -1.0, 1.0, &space, settings(1, TaskPolicy::Spread)).unwrap();
        let sorted = mover.sort_particles(&sp.particle).unwrap();
        let map = mover.task_map(&sorted);
        assert_eq!(map, vec![0, sorted.len()]);
        assert!(!mover.needs_atomic(&sorted, &map));

        let many =
            BorisMover3D::new("e", -1.0, 1.0, &space, settings(4, TaskPolicy::Spread)).unwrap();
        let map = many.task_map(&sorted);
        assert_eq!(map.len(), 5);
        // neighboring slabs share a ghost layer of the stencil
        assert!(many.needs_atomic(&sorted, &map));
    }

    #[test]
    fn sorted_refs_follow_cell_order() {
        let space = build_test_space();
        let sp = thermal_species(&space, 3);
        let mover = BorisMover3D::new("e", -1.0, 1.0, &space, MoverSettings::default()).unwrap();
        let sorted = mover.sort_particles(&sp.particle).unwrap();
        assert_eq!(sorted.len(), sp.particle.len());
        for w in sorted.windows(2) {
            assert!(w[0] < w[1]);
        }
        for r in &sorted {
            assert_eq!(r.key, space.encode(sp.particle[r.idx].cell));
        }
    }

    #[test]
    fn task_count_and_policy_do_not_change_the_result() {
        let space = build_test_space();
        let mut em = Field::new(&space, EM_COMPONENTS);
        em.par_fill(&space, |cell, point| {
            point[1] = 0.01 * cell[0] as Float;
            point[5] = 0.5;
        });
        let reference = thermal_species(&space, 2);

        let mut results = Vec::new();
        for &(tasks, policy) in &[
            (1, TaskPolicy::Spread),
            (3, TaskPolicy::Spread),
            (8, TaskPolicy::Spread),
            (8, TaskPolicy::Bunch),
        ] {
            let src = SourceField::new(&space, SOURCE_COMPONENTS);
            let flds = Flds::new(&em, &src);
            let mover = BorisMover3D::new("e", -1.0, 1.0, &space, settings(tasks, policy)).unwrap();
            let mut particle = reference.particle.clone();
            let mut transfer = Vec::new();
            let report = mover.advance(&mut particle, &mut transfer, &flds).unwrap();
            assert_eq!(report.pushed, reference.particle.len());
            assert_eq!(particle.len() + transfer.len(), reference.particle.len());
            // every electron carries -0.5
            assert!((src.total(0) + 0.5 * reference.particle.len() as Float).abs() < 1e-2);
            results.push((particle, transfer, src.snapshot()));
        }
        let (p0, t0, s0) = &results[0];
        for (p, t, s) in &results[1..] {
            assert_eq!(p, p0);
            assert_eq!(t, t0);
            for (a, b) in s.iter().zip(s0.iter()) {
                assert!((a - b).abs() < E_TOL);
            }
        }
    }

    #[test]
    fn failed_advance_commits_nothing() {
        let space = build_test_space();
        let em = Field::new(&space, EM_COMPONENTS);
        let src = SourceField::new(&space, SOURCE_COMPONENTS);
        let flds = Flds::new(&em, &src);
        let mut sp = thermal_species(&space, 1);
        sp.particle[100].p[2] = Float::INFINITY;
        let before = sp.particle.clone();
        let mover =
            BorisMover3D::new("e", -1.0, 1.0, &space, settings(4, TaskPolicy::Spread)).unwrap();
        let err = mover
            .advance(&mut sp.particle, &mut sp.transfer, &flds)
            .unwrap_err();
        assert!(matches!(err, PicError::CorruptedState { index: 100, .. }));
        assert_eq!(sp.particle, before);
        assert!(sp.transfer.is_empty());

        sp.particle[100].p[2] = 0.0;
        sp.particle[7].cell = [-1, 4, 4];
        let err = mover
            .advance(&mut sp.particle, &mut sp.transfer, &flds)
            .unwrap_err();
        assert!(matches!(err, PicError::CorruptedState { index: 7, .. }));
    }

    #[test]
    fn pgc_without_laser_is_missing_field() {
        let space = build_test_space();
        let em = Field::new(&space, EM_COMPONENTS);
        let src = SourceField::new(&space, SOURCE_COMPONENTS);
        let flds = Flds::new(&em, &src);
        let mover = PgcMover3D::new("e", -1.0, 1.0, &space, MoverSettings::default()).unwrap();
        let mut particle = Vec::new();
        let mut transfer = Vec::new();
        assert!(matches!(
            mover.advance(&mut particle, &mut transfer, &flds),
            Err(PicError::MissingField("laser"))
        ));
    }

    #[test]
    fn empty_species_is_a_no_op() {
        let space = build_planar_test_space();
        let em = Field::new(&space, EM_COMPONENTS);
        let src = SourceField::new(&space, SOURCE_COMPONENTS);
        let flds = Flds::new(&em, &src);
        let mover =
            BorisMover2D::new("e", -1.0, 1.0, &space, settings(4, TaskPolicy::Bunch)).unwrap();
        let mut particle = Vec::new();
        let mut transfer = Vec::new();
        let report = mover.advance(&mut particle, &mut transfer, &flds).unwrap();
        assert_eq!(report, MoveReport::default());
    }

    #[test]
    fn runaway_guide_velocity_is_corruption() {
        let space = build_test_space();
        let em = Field::new(&space, EM_COMPONENTS);
        let src = SourceField::new(&space, SOURCE_COMPONENTS);
        let mut guide = Field::new(&space, QO_COMPONENTS);
        guide.fill(0, 1e-9);
        guide.fill(1, 1e20);
        let mut flds = Flds::new(&em, &src);
        flds.qo_j4 = Some(&guide);

        let mut sp = Species::new("tracers", 0.0, 1.0);
        sp.particle.push(Particle {
            cell: [4, 4, 4],
            number: 1.0,
            ..Default::default()
        });
        let before = sp.particle.clone();
        let mover = BohmianMover3D::new("tracers", 0.0, 1.0, &space, MoverSettings::default())
            .unwrap();
        match mover.advance(&mut sp.particle, &mut sp.transfer, &flds) {
            Err(PicError::CorruptedState { species, index, .. }) => {
                assert_eq!(species, "tracers");
                assert_eq!(index, 0);
            }
            other => panic!("expected corrupted state, got {:?}", other),
        }
        assert_eq!(sp.particle, before);
        assert!(sp.transfer.is_empty());
    }

    /// Sum of `-q0^2 n / (m0 gamma)` over everything the species still owns.
    fn expected_chi(sp: &Species, a2: Float) -> Float {
        let qm = sp.charge / sp.mass;
        sp.particle
            .iter()
            .chain(sp.transfer.iter().map(|t| &t.particle))
            .map(|prtl| {
                let p2 = prtl.p.iter().map(|p| p * p).sum::<Float>();
                let gamma = (1.0 + p2 / (sp.mass * sp.mass) + 0.5 * qm * qm * a2).sqrt();
                -sp.charge * sp.charge * prtl.number / (sp.mass * gamma)
            })
            .sum()
    }

    fn pgc_chi_matches_the_particles(space: &DiscreteSpace, mover: &dyn Advance) {
        let a2 = 0.64;
        let params = FieldParams {
            b: [0.0, 0.0, 0.5],
            ..FieldParams::default()
        };
        let mut fields = FieldSet::new(space, &params);
        fields.laser.fill(0, a2);
        let mut sp = thermal_species(space, 2);
        let n = sp.particle.len();
        let report = mover
            .advance(&mut sp.particle, &mut sp.transfer, &fields.flds())
            .unwrap();
        assert_eq!(report.pushed, n);

        let expected = expected_chi(&sp, a2);
        let chi = fields.chi.total(0);
        assert!(chi < 0.0);
        assert!((chi - expected).abs() < 1e-3 * expected.abs());
        // a0 > 0 lowers every particle's susceptibility below the cold value
        assert!(chi > -0.5 * n as Float);
        assert!((fields.sources.total(0) + 0.5 * n as Float).abs() < 1e-2);
    }

    #[test]
    fn pgc_advance_deposits_chi_of_every_particle() {
        let space = build_test_space();
        let mover = PgcMover3D::new("electrons", -1.0, 1.0, &space, settings(4, TaskPolicy::Spread))
            .unwrap();
        pgc_chi_matches_the_particles(&space, &mover);

        let planar = build_planar_test_space();
        let mover = PgcMover2D::new("electrons", -1.0, 1.0, &planar, settings(4, TaskPolicy::Bunch))
            .unwrap();
        pgc_chi_matches_the_particles(&planar, &mover);
    }

    fn pgc_results(space: &DiscreteSpace) {
        let params = FieldParams {
            b: [0.0, 0.0, 0.5],
            a0: 0.8,
            waist: 0.3,
            ..FieldParams::default()
        };
        let reference = thermal_species(space, 2);
        let mut results = Vec::new();
        for &(tasks, policy) in &[
            (1, TaskPolicy::Spread),
            (4, TaskPolicy::Spread),
            (4, TaskPolicy::Bunch),
        ] {
            let fields = FieldSet::new(space, &params);
            let mover = build_mover(
                PusherKind::Pgc,
                "electrons",
                -1.0,
                1.0,
                space,
                settings(tasks, policy),
            )
            .unwrap();
            let mut particle = reference.particle.clone();
            let mut transfer = Vec::new();
            mover
                .advance(&mut particle, &mut transfer, &fields.flds())
                .unwrap();
            results.push((
                particle,
                transfer,
                fields.sources.snapshot(),
                fields.chi.snapshot(),
            ));
        }
        let (p0, t0, s0, c0) = &results[0];
        for (p, t, s, c) in &results[1..] {
            assert_eq!(p, p0);
            assert_eq!(t, t0);
            for (a, b) in s.iter().zip(s0.iter()).chain(c.iter().zip(c0.iter())) {
                assert!((a - b).abs() < E_TOL);
            }
        }
    }

    #[test]
    fn pgc_task_layout_does_not_change_sources_or_chi() {
        pgc_results(&build_test_space());
        pgc_results(&build_planar_test_space());
    }
}
