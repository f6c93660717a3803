use crate::Float;
use std::sync::atomic::Ordering;

#[cfg(feature = "dprec")]
type Bits = std::sync::atomic::AtomicU64;

#[cfg(not(feature = "dprec"))]
type Bits = std::sync::atomic::AtomicU32;

/// A `Float` that several tasks can accumulate into at once.
///
/// Stored as its bit pattern in an atomic integer. `fetch_add` is a
/// compare-and-swap loop; `load` and `store` are plain relaxed accesses
/// and give no protection against a concurrent update.
#[derive(Debug, Default)]
pub struct AtomicFloat(Bits);

impl AtomicFloat {
    pub fn new(v: Float) -> AtomicFloat {
        AtomicFloat(Bits::new(v.to_bits()))
    }

    #[inline(always)]
    pub fn load(&self) -> Float {
        Float::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn store(&self, v: Float) {
        self.0.store(v.to_bits(), Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn fetch_add(&self, v: Float) -> Float {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let new = (Float::from_bits(current) + v).to_bits();
            match self
                .0
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(prev) => return Float::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}
