use anyhow::{Context, Result};
use rand::prelude::*;
use serde::Deserialize;
use std::fs;
use tracing::info;

pub mod error;
pub mod flds;
pub mod mover;
pub mod prtls;
pub mod space;

use flds::{Field, Flds, SourceField};
use flds::{CHI_COMPONENTS, EM_COMPONENTS, LASER_COMPONENTS, QO_COMPONENTS, SOURCE_COMPONENTS};
use mover::{build_mover, Advance, MoverSettings, PusherKind};
use prtls::{moments, Species};
use space::DiscreteSpace;

// We use a type alias for f64/Float to easily support
// double and single precision.
#[cfg(feature = "dprec")]
pub type Float = f64;

#[cfg(not(feature = "dprec"))]
pub type Float = f32;

/// Signed grid index. Ghost cells have negative indices.
pub type Int = i64;

#[derive(Deserialize)]
pub struct Config {
    pub params: Params,
    pub setup: Setup,
    #[serde(default)]
    pub mover: MoverSettings,
    #[serde(default)]
    pub fields: FieldParams,
    pub species: Vec<SpeciesParams>,
}

#[derive(Deserialize)]
pub struct Params {
    /// Interior cells along x, y, z. A single cell makes the axis ignorable.
    pub dims: [Int; 3],
    pub ghost_layers: Int,
    pub corner: [Float; 3],
    pub size: [Float; 3],
    pub dt: Float,
}

#[derive(Deserialize)]
pub struct Setup {
    pub t_final: u32,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Deserialize)]
pub struct SpeciesParams {
    pub name: String,
    pub charge: Float,
    pub mass: Float,
    pub ppc: usize,
    #[serde(default = "unit_density")]
    pub density: Float,
    #[serde(default)]
    pub vth: Float,
    pub pusher: PusherKind,
}

fn unit_density() -> Float {
    1.0
}

/// Background fields of the demo run. All uniform except the laser
/// envelope, a Gaussian centered in the box.
#[derive(Deserialize)]
#[serde(default)]
pub struct FieldParams {
    pub e: [Float; 3],
    pub b: [Float; 3],
    pub a0: Float,
    pub waist: Float,
    pub guide_rho: Float,
    pub guide_j: [Float; 3],
}

impl Default for FieldParams {
    fn default() -> FieldParams {
        FieldParams {
            e: [0.0; 3],
            b: [0.0; 3],
            a0: 0.0,
            waist: 0.25,
            guide_rho: 1.0,
            guide_j: [0.0; 3],
        }
    }
}

impl Config {
    pub fn new() -> Result<Config> {
        let contents =
            fs::read_to_string("config.toml").context("Could not open the config.toml file")?;
        Config::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Config> {
        toml::from_str(contents).with_context(|| "Could not parse Config file")
    }
}

/// Every field a mover may read or write, owned by the driver.
pub struct FieldSet {
    pub em: Field,
    pub laser: Field,
    pub qo_j4: Field,
    pub sources: SourceField,
    pub chi: SourceField,
}

impl FieldSet {
    pub fn new(space: &DiscreteSpace, params: &FieldParams) -> FieldSet {
        let mut em = Field::new(space, EM_COMPONENTS);
        for c in 0..3 {
            em.fill(c, params.e[c]);
            em.fill(c + 3, params.b[c]);
        }

        let mut laser = Field::new(space, LASER_COMPONENTS);
        let (corner, size, spacing) = (space.corner(), space.size(), space.spacing());
        let ignorable = space.ignorable();
        let a2_peak = params.a0 * params.a0;
        let w2 = params.waist * params.waist;
        laser.par_fill(space, |cell, point| {
            let mut dx = [0.0; 3];
            for a in 0..3 {
                if !ignorable[a + 1] {
                    let x = corner[a] + (cell[a] as Float - 0.5) * spacing[a];
                    dx[a] = x - (corner[a] + 0.5 * size[a]);
                }
            }
            let r2 = dx[0] * dx[0] + dx[1] * dx[1] + dx[2] * dx[2];
            let a2 = a2_peak * (-r2 / w2).exp();
            point[0] = a2;
            for a in 0..3 {
                point[a + 1] = -2.0 * a2 * dx[a] / w2;
            }
        });

        let mut qo_j4 = Field::new(space, QO_COMPONENTS);
        qo_j4.fill(0, params.guide_rho);
        for c in 0..3 {
            qo_j4.fill(c + 1, params.guide_j[c]);
        }

        FieldSet {
            em,
            laser,
            qo_j4,
            sources: SourceField::new(space, SOURCE_COMPONENTS),
            chi: SourceField::new(space, CHI_COMPONENTS),
        }
    }

    pub fn flds(&self) -> Flds<'_> {
        Flds {
            em: &self.em,
            laser: Some(&self.laser),
            qo_j4: Some(&self.qo_j4),
            sources: &self.sources,
            chi: Some(&self.chi),
        }
    }
}

/// Runs the single-subdomain demo: every species is pushed `t_final`
/// times against fixed background fields, with periodic exchange.
pub fn run(cfg: Config) -> Result<()> {
    let params = &cfg.params;
    let mut space = DiscreteSpace::new(params.dims, params.corner, params.size, params.ghost_layers)
        .context("Could not build the discrete space")?;
    space.set_dt(params.dt).context("Bad timestep")?;
    let fields = FieldSet::new(&space, &cfg.fields);

    let mut rng = StdRng::seed_from_u64(cfg.setup.seed);
    let mut species = Vec::with_capacity(cfg.species.len());
    let mut movers: Vec<Box<dyn Advance>> = Vec::with_capacity(cfg.species.len());
    for sp_cfg in &cfg.species {
        let mut sp = Species::new(&sp_cfg.name, sp_cfg.charge, sp_cfg.mass);
        sp.load_uniform(&space, sp_cfg.ppc, sp_cfg.density);
        sp.thermalize(&mut rng, sp_cfg.vth);
        let mover = build_mover(sp_cfg.pusher, &sp.name, sp.charge, sp.mass, &space, cfg.mover)
            .with_context(|| format!("Could not build the mover for {}", sp.name))?;
        info!(
            species = %sp.name,
            count = sp.particle.len(),
            pusher = ?sp_cfg.pusher,
            "initialized species"
        );
        movers.push(mover);
        species.push(sp);
    }

    for step in 0..cfg.setup.t_final {
        fields.sources.zero(&space);
        fields.chi.zero(&space);
        let flds = fields.flds();
        for (sp, mover) in species.iter_mut().zip(movers.iter()) {
            let report = mover
                .advance(&mut sp.particle, &mut sp.transfer, &flds)
                .with_context(|| format!("Step {}: could not advance {}", step, sp.name))?;
            sp.exchange_periodic(&space)
                .with_context(|| format!("Step {}: could not exchange {}", step, sp.name))?;
            let (rho, j) = moments(&sp.particle, sp.charge, sp.mass);
            info!(
                step,
                species = %sp.name,
                pushed = report.pushed,
                transferred = report.transferred,
                tasks = report.tasks,
                rho,
                jx = j[0],
                "advanced"
            );
        }
        info!(step, rho = fields.sources.total(0), "deposited sources");
    }
    Ok(())
}

#[cfg(test)]
pub const E_TOL: Float = 1e-4;

/// Unit box, 8 cells per axis, 2 ghost layers, dt = 0.1.
#[cfg(test)]
pub(crate) fn build_test_space() -> DiscreteSpace {
    let mut space = DiscreteSpace::new([8, 8, 8], [0.0; 3], [1.0; 3], 2).unwrap();
    space.set_dt(0.1).unwrap();
    space
}

/// Like `build_test_space`, with a single cell along y.
#[cfg(test)]
pub(crate) fn build_planar_test_space() -> DiscreteSpace {
    let mut space = DiscreteSpace::new([8, 1, 8], [0.0; 3], [1.0; 3], 2).unwrap();
    space.set_dt(0.1).unwrap();
    space
}
