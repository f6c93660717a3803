use pic_rs::flds::{Field, SourceField, EM_COMPONENTS, SOURCE_COMPONENTS};
use pic_rs::prtls::Species;
use pic_rs::space::DiscreteSpace;
use pic_rs::{Float, Int};
use rand::prelude::*;

pub const E_TOL: Float = 1e-4;

pub fn setup_space(dims: [Int; 3]) -> DiscreteSpace {
    // A small unit box so tests stay fast
    let mut space = DiscreteSpace::new(dims, [0.0; 3], [1.0; 3], 2).unwrap();
    space.set_dt(0.1).unwrap();
    space
}

pub fn setup_flds(space: &DiscreteSpace) -> (Field, SourceField) {
    let mut em = Field::new(space, EM_COMPONENTS);
    em.fill(0, 0.02);
    em.fill(5, 1.0);
    (em, SourceField::new(space, SOURCE_COMPONENTS))
}

pub fn setup_species(space: &DiscreteSpace, ppc: usize, vth: Float) -> Species {
    let mut sp = Species::new("electrons", -1.0, 1.0);
    sp.load_uniform(space, ppc, 1.0);
    let mut rng = StdRng::seed_from_u64(1234);
    sp.thermalize(&mut rng, vth);
    sp
}
