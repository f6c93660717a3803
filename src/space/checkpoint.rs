use super::{Axes4, DiscreteSpace};
use crate::error::PicError;
use crate::{Float, Int};
use std::io::{Read, Write};
use std::mem::size_of;

/// Byte length of one `DiscreteSpace` record: three timestep scalars, six
/// 3-vectors and ten 4-slot index arrays.
pub const CHECKPOINT_LEN: usize = 21 * size_of::<Float>() + 40 * size_of::<Int>();

fn write_floats<W: Write>(w: &mut W, vals: &[Float]) -> std::io::Result<()> {
    for v in vals {
        w.write_all(&v.to_ne_bytes())?;
    }
    Ok(())
}

fn write_ints<W: Write>(w: &mut W, vals: &Axes4<Int>) -> std::io::Result<()> {
    for v in vals.0.iter() {
        w.write_all(&v.to_ne_bytes())?;
    }
    Ok(())
}

fn read_float<R: Read>(r: &mut R) -> std::io::Result<Float> {
    let mut buf = [0u8; size_of::<Float>()];
    r.read_exact(&mut buf)?;
    Ok(Float::from_ne_bytes(buf))
}

fn read_vec3<R: Read>(r: &mut R) -> std::io::Result<[Float; 3]> {
    Ok([read_float(r)?, read_float(r)?, read_float(r)?])
}

fn read_ints<R: Read>(r: &mut R) -> std::io::Result<Axes4<Int>> {
    let mut out = Axes4::default();
    for i in 0..4 {
        let mut buf = [0u8; size_of::<Int>()];
        r.read_exact(&mut buf)?;
        out[i] = Int::from_ne_bytes(buf);
    }
    Ok(out)
}

impl DiscreteSpace {
    /// Writes the raw record. Field order is fixed; there is no header.
    pub fn write_checkpoint<W: Write>(&self, w: &mut W) -> Result<(), PicError> {
        write_floats(w, &[self.dt, self.dth, self.dti])?;
        for v in &[
            self.corner,
            self.size,
            self.global_corner,
            self.global_size,
            self.spacing,
            self.freq,
        ] {
            write_floats(w, v)?;
        }
        let ignorable = Axes4([
            self.ignorable[0] as Int,
            self.ignorable[1] as Int,
            self.ignorable[2] as Int,
            self.ignorable[3] as Int,
        ]);
        for v in &[
            &self.num,
            &self.dim,
            &self.lfg,
            &self.ufg,
            &self.lng,
            &self.ung,
            &ignorable,
            &self.encoding_stride,
            &self.decoding_stride,
            &self.layers,
        ] {
            write_ints(w, v)?;
        }
        Ok(())
    }

    /// Overwrites the receiver with a raw record, in the order written by
    /// `write_checkpoint`.
    pub fn read_checkpoint<R: Read>(&mut self, r: &mut R) -> Result<(), PicError> {
        self.dt = read_float(r)?;
        self.dth = read_float(r)?;
        self.dti = read_float(r)?;
        self.corner = read_vec3(r)?;
        self.size = read_vec3(r)?;
        self.global_corner = read_vec3(r)?;
        self.global_size = read_vec3(r)?;
        self.spacing = read_vec3(r)?;
        self.freq = read_vec3(r)?;
        self.num = read_ints(r)?;
        self.dim = read_ints(r)?;
        self.lfg = read_ints(r)?;
        self.ufg = read_ints(r)?;
        self.lng = read_ints(r)?;
        self.ung = read_ints(r)?;
        let ignorable = read_ints(r)?;
        for i in 0..4 {
            self.ignorable[i] = ignorable[i] != 0;
        }
        self.encoding_stride = read_ints(r)?;
        self.decoding_stride = read_ints(r)?;
        self.layers = read_ints(r)?;
        Ok(())
    }

    /// Reads a record and accepts it only if its geometry matches the one
    /// this subdomain was configured with. Timestep scalars are taken from
    /// the record.
    pub fn restore_checkpoint<R: Read>(&mut self, r: &mut R) -> Result<(), PicError> {
        let mut stored = DiscreteSpace::default();
        stored.read_checkpoint(r)?;
        stored.check_consistent()?;

        let mismatch = |what: &str, ours: String, theirs: String| {
            Err(PicError::CheckpointMismatch(format!(
                "{} is {} in the run but {} in the checkpoint",
                what, ours, theirs
            )))
        };
        if stored.dim != self.dim {
            return mismatch("dim", format!("{:?}", self.dim.0), format!("{:?}", stored.dim.0));
        }
        if stored.layers.spatial() != self.layers.spatial() {
            return mismatch(
                "layers",
                format!("{:?}", self.layers.0),
                format!("{:?}", stored.layers.0),
            );
        }
        for &(what, ours, theirs) in &[
            ("corner", self.corner, stored.corner),
            ("global size", self.global_size, stored.global_size),
            ("spacing", self.spacing, stored.spacing),
        ] {
            if ours != theirs {
                return mismatch(what, format!("{:?}", ours), format!("{:?}", theirs));
            }
        }
        *self = stored;
        Ok(())
    }

    fn check_consistent(&self) -> Result<(), PicError> {
        for i in 1..=3 {
            if self.num[i] != self.ufg[i] - self.lfg[i] + 1 {
                return Err(PicError::CheckpointMismatch(format!(
                    "axis {}: num {} disagrees with bounds {}..{}",
                    i, self.num[i], self.lfg[i], self.ufg[i]
                )));
            }
            if self.ignorable[i] != (self.dim[i] == 1)
                || (self.ignorable[i] && self.encoding_stride[i] != 0)
                || self.decoding_stride[i] == 0
            {
                return Err(PicError::CheckpointMismatch(format!(
                    "axis {}: strides or ignorable flag are corrupt",
                    i
                )));
            }
        }
        Ok(())
    }
}
