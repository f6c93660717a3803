use crate::prtls::Particle;
use crate::Float;

/// Guiding current below which the Bohmian velocity is taken as zero.
pub const BOHM_FLOOR: Float = 1e-10;

/// Electric and magnetic field at a particle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EmSample {
    pub e: [Float; 3],
    pub b: [Float; 3],
}

/// Fields seen by a particle in a ponderomotive guiding-center push.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PgcSample {
    pub em: EmSample,
    pub a2: Float,
    pub grad_a2: [Float; 3],
}

/// Guiding charge and current density at a particle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GuideSample {
    pub rho: Float,
    pub j: [Float; 3],
}

/// What one particle contributes to rho and J.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Current {
    pub rho: Float,
    pub j: [Float; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PgcDeposit {
    pub current: Current,
    pub chi: Float,
}

/// Momentum update of a single particle from the fields interpolated to it.
///
/// `push` updates `p` in place and returns the velocity the position
/// advance should use together with the particle's source contribution.
/// Positions are left to the caller.
pub trait Pusher: Send + Sync {
    type Local: Copy + Default;
    type Deposit: Copy + Default;

    fn new(q0: Float, m0: Float) -> Self
    where
        Self: Sized;

    fn push(
        &self,
        prtl: &mut Particle,
        local: &Self::Local,
        dt: Float,
    ) -> ([Float; 3], Self::Deposit);
}

#[inline(always)]
fn dot(a: &[Float; 3], b: &[Float; 3]) -> Float {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline(always)]
fn cross(a: &[Float; 3], b: &[Float; 3]) -> [Float; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline(always)]
fn scale(a: &[Float; 3], s: Float) -> [Float; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// `a += s * b`
#[inline(always)]
fn axpy(a: &mut [Float; 3], b: &[Float; 3], s: Float) {
    a[0] += s * b[0];
    a[1] += s * b[1];
    a[2] += s * b[2];
}

#[inline(always)]
fn lorentz(p: &[Float; 3], m: Float) -> Float {
    (1.0 + dot(p, p) / (m * m)).sqrt()
}

/// Boris rotation of `p` by `t = qB dt / (2 m gamma)`.
#[inline(always)]
fn boris_rotate(p: &mut [Float; 3], t: &[Float; 3]) {
    let s = scale(t, 2.0 / (1.0 + dot(t, t)));
    let mut prime = *p;
    axpy(&mut prime, &cross(p, t), 1.0);
    axpy(p, &cross(&prime, &s), 1.0);
}

fn current(q: Float, v: &[Float; 3]) -> Current {
    Current { rho: q, j: scale(v, q) }
}

/// Relativistic Boris push.
#[derive(Clone, Copy, Debug)]
pub struct BorisPusher {
    q0: Float,
    m0: Float,
}

impl Pusher for BorisPusher {
    type Local = EmSample;
    type Deposit = Current;

    fn new(q0: Float, m0: Float) -> BorisPusher {
        BorisPusher { q0, m0 }
    }

    fn push(&self, prtl: &mut Particle, local: &EmSample, dt: Float) -> ([Float; 3], Current) {
        let h = 0.5 * self.q0 * dt;
        let m = self.m0;
        let mut p = prtl.p;
        axpy(&mut p, &local.e, h);
        let gamma = lorentz(&p, m);
        boris_rotate(&mut p, &scale(&local.b, h / (m * gamma)));
        axpy(&mut p, &local.e, h);
        prtl.p = p;
        let v = scale(&p, 1.0 / (m * lorentz(&p, m)));
        (v, current(self.q0 * prtl.number, &v))
    }
}

/// Unit quaternion `(w, v)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub w: Float,
    pub v: [Float; 3],
}

impl Quaternion {
    /// Right-handed rotation by `|omega|` about `omega`.
    pub fn rotation(omega: &[Float; 3]) -> Quaternion {
        let angle = dot(omega, omega).sqrt();
        if angle == 0.0 {
            return Quaternion { w: 1.0, v: [0.0; 3] };
        }
        let half = 0.5 * angle;
        Quaternion {
            w: half.cos(),
            v: scale(omega, half.sin() / angle),
        }
    }

    pub fn rotate(&self, u: &[Float; 3]) -> [Float; 3] {
        let t = scale(&cross(&self.v, u), 2.0);
        let mut out = *u;
        axpy(&mut out, &t, self.w);
        axpy(&mut out, &cross(&self.v, &t), 1.0);
        out
    }
}

/// Like Boris, but the magnetic step is an exact rotation through the
/// gyro-angle instead of the Boris approximation `2 atan(theta / 2)`.
#[derive(Clone, Copy, Debug)]
pub struct UnitaryPusher {
    q0: Float,
    m0: Float,
}

impl Pusher for UnitaryPusher {
    type Local = EmSample;
    type Deposit = Current;

    fn new(q0: Float, m0: Float) -> UnitaryPusher {
        UnitaryPusher { q0, m0 }
    }

    fn push(&self, prtl: &mut Particle, local: &EmSample, dt: Float) -> ([Float; 3], Current) {
        let h = 0.5 * self.q0 * dt;
        let m = self.m0;
        let mut p = prtl.p;
        axpy(&mut p, &local.e, h);
        let gamma = lorentz(&p, m);
        // dp/dt = p x omega, a rotation by -|omega| dt about omega
        let omega = scale(&local.b, -self.q0 * dt / (m * gamma));
        p = Quaternion::rotation(&omega).rotate(&p);
        axpy(&mut p, &local.e, h);
        prtl.p = p;
        let v = scale(&p, 1.0 / (m * lorentz(&p, m)));
        (v, current(self.q0 * prtl.number, &v))
    }
}

/// Ponderomotive guiding-center push. The laser envelope enters through an
/// effective gamma and a force along `-grad a^2`.
#[derive(Clone, Copy, Debug)]
pub struct PgcPusher {
    q0: Float,
    m0: Float,
}

impl PgcPusher {
    fn gamma_eff(&self, p: &[Float; 3], a2: Float) -> Float {
        let qm = self.q0 / self.m0;
        (1.0 + dot(p, p) / (self.m0 * self.m0) + 0.5 * qm * qm * a2).sqrt()
    }
}

impl Pusher for PgcPusher {
    type Local = PgcSample;
    type Deposit = PgcDeposit;

    fn new(q0: Float, m0: Float) -> PgcPusher {
        PgcPusher { q0, m0 }
    }

    fn push(&self, prtl: &mut Particle, local: &PgcSample, dt: Float) -> ([Float; 3], PgcDeposit) {
        let h = 0.5 * self.q0 * dt;
        let m = self.m0;
        let mut p = prtl.p;
        let force = scale(
            &local.grad_a2,
            -self.q0 * self.q0 / (4.0 * m * self.gamma_eff(&p, local.a2)),
        );
        axpy(&mut p, &local.em.e, h);
        axpy(&mut p, &force, 0.5 * dt);
        let gamma = self.gamma_eff(&p, local.a2);
        boris_rotate(&mut p, &scale(&local.em.b, h / (m * gamma)));
        axpy(&mut p, &local.em.e, h);
        axpy(&mut p, &force, 0.5 * dt);
        prtl.p = p;

        let gamma = self.gamma_eff(&p, local.a2);
        let v = scale(&p, 1.0 / (m * gamma));
        let deposit = PgcDeposit {
            current: current(self.q0 * prtl.number, &v),
            chi: -self.q0 * self.q0 * prtl.number / (m * gamma),
        };
        (v, deposit)
    }
}

/// Moves particles along `v = J / rho` of a guiding wave. Deposits nothing.
#[derive(Clone, Copy, Debug)]
pub struct BohmianPusher {
    m0: Float,
}

impl Pusher for BohmianPusher {
    type Local = GuideSample;
    type Deposit = ();

    fn new(_q0: Float, m0: Float) -> BohmianPusher {
        BohmianPusher { m0 }
    }

    fn push(&self, prtl: &mut Particle, local: &GuideSample, _dt: Float) -> ([Float; 3], ()) {
        let v = if local.rho.abs() > BOHM_FLOOR {
            scale(&local.j, 1.0 / local.rho)
        } else {
            [0.0; 3]
        };
        prtl.p = scale(&v, self.m0);
        (v, ())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::E_TOL;

    fn magnetized(bz: Float) -> EmSample {
        EmSample {
            e: [0.0; 3],
            b: [0.0, 0.0, bz],
        }
    }

    fn angle(a: &[Float; 3], b: &[Float; 3]) -> Float {
        (cross(a, b)[2]).atan2(dot(a, b))
    }

    #[test]
    fn boris_conserves_energy_in_pure_b() {
        let pusher = BorisPusher::new(1.0, 1.0);
        let mut prtl = Particle {
            p: [1.0, 0.0, 0.3],
            number: 1.0,
            ..Default::default()
        };
        let p0 = dot(&prtl.p, &prtl.p);
        for _ in 0..1000 {
            pusher.push(&mut prtl, &magnetized(2.0), 0.1);
        }
        assert!((dot(&prtl.p, &prtl.p) - p0).abs() < 1e-3);
        assert!((prtl.p[2] - 0.3).abs() < E_TOL);
    }

    #[test]
    fn boris_and_unitary_rotation_angles() {
        let (bz, dt) = (3.0, 0.2);
        let gamma = (2.0 as Float).sqrt();
        let theta = bz * dt / gamma;

        let mut boris = Particle {
            p: [1.0, 0.0, 0.0],
            ..Default::default()
        };
        BorisPusher::new(1.0, 1.0).push(&mut boris, &magnetized(bz), dt);
        let mut unitary = boris;
        unitary.p = [1.0, 0.0, 0.0];
        UnitaryPusher::new(1.0, 1.0).push(&mut unitary, &magnetized(bz), dt);

        // a positive charge in +z field turns clockwise
        assert!(boris.p[1] < 0.0 && unitary.p[1] < 0.0);
        let boris_angle = -angle(&[1.0, 0.0, 0.0], &boris.p);
        let unitary_angle = -angle(&[1.0, 0.0, 0.0], &unitary.p);
        assert!((unitary_angle - theta).abs() < E_TOL);
        assert!((boris_angle - 2.0 * (0.5 * theta).atan()).abs() < E_TOL);
        assert!((dot(&unitary.p, &unitary.p) - 1.0).abs() < E_TOL);
    }

    #[test]
    fn electric_kick_and_current() {
        let pusher = BorisPusher::new(-1.0, 1.0);
        let mut prtl = Particle {
            number: 2.0,
            ..Default::default()
        };
        let local = EmSample {
            e: [0.5, 0.0, 0.0],
            b: [0.0; 3],
        };
        let (v, dep) = pusher.push(&mut prtl, &local, 0.1);
        assert!((prtl.p[0] + 0.05).abs() < E_TOL);
        assert!(v[0] < 0.0);
        assert!((dep.rho + 2.0).abs() < E_TOL);
        assert!((dep.j[0] - (-2.0 * v[0])).abs() < E_TOL);
    }

    #[test]
    fn quaternion_identity_and_quarter_turn() {
        let q = Quaternion::rotation(&[0.0; 3]);
        assert_eq!(q.rotate(&[1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
        let quarter = Quaternion::rotation(&[0.0, 0.0, std::f64::consts::FRAC_PI_2 as Float]);
        let r = quarter.rotate(&[1.0, 0.0, 0.0]);
        assert!(r[0].abs() < E_TOL && (r[1] - 1.0).abs() < E_TOL && r[2].abs() < E_TOL);
    }

    #[test]
    fn pgc_matches_boris_without_laser() {
        let em = EmSample {
            e: [0.1, -0.2, 0.05],
            b: [0.3, 0.0, 1.0],
        };
        let mut a = Particle {
            p: [0.2, 0.1, -0.4],
            number: 1.0,
            ..Default::default()
        };
        let mut b = a;
        let (va, _) = BorisPusher::new(-1.0, 1.0).push(&mut a, &em, 0.1);
        let (vb, dep) = PgcPusher::new(-1.0, 1.0).push(
            &mut b,
            &PgcSample {
                em,
                ..Default::default()
            },
            0.1,
        );
        for i in 0..3 {
            assert!((a.p[i] - b.p[i]).abs() < E_TOL);
            assert!((va[i] - vb[i]).abs() < E_TOL);
        }
        assert!(dep.chi < 0.0);
    }

    #[test]
    fn pgc_pushes_down_the_intensity_gradient() {
        let pusher = PgcPusher::new(-1.0, 1.0);
        let mut prtl = Particle {
            number: 1.0,
            ..Default::default()
        };
        let local = PgcSample {
            a2: 1.0,
            grad_a2: [2.0, 0.0, 0.0],
            ..Default::default()
        };
        let (v, dep) = pusher.push(&mut prtl, &local, 0.1);
        assert!(prtl.p[0] < 0.0 && v[0] < 0.0);
        // the laser raises gamma, so chi is smaller than -q^2 n / m
        assert!(dep.chi > -1.0 && dep.chi < 0.0);
    }

    #[test]
    fn bohmian_follows_guiding_current() {
        let pusher = BohmianPusher::new(1.0, 2.0);
        let mut prtl = Particle::default();
        let (v, ()) = pusher.push(
            &mut prtl,
            &GuideSample {
                rho: 2.0,
                j: [1.0, 0.0, -4.0],
            },
            0.1,
        );
        assert_eq!(v, [0.5, 0.0, -2.0]);
        assert_eq!(prtl.p, [1.0, 0.0, -4.0]);
        let (v, ()) = pusher.push(&mut prtl, &GuideSample::default(), 0.1);
        assert_eq!(v, [0.0; 3]);
    }
}
