use std::ops::{Index, IndexMut};

/// Names the four slots of an `Axes4`. Slot 0 is the element (component)
/// axis, the others are the spatial axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Element = 0,
    X = 1,
    Y = 2,
    Z = 3,
}

impl Axis {
    pub const SPATIAL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// A 4-slot array laid out as `[element, x, y, z]`.
///
/// The layout mirrors field addressing, where the element axis sits next to
/// the three spatial axes, so stride arithmetic can loop over `1..=3` without
/// off-by-one shuffling. Use the named accessors wherever possible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Axes4<T>(pub [T; 4]);

impl<T: Copy> Axes4<T> {
    pub fn new(element: T, x: T, y: T, z: T) -> Axes4<T> {
        Axes4([element, x, y, z])
    }

    /// Builds from the spatial part, filling the element slot.
    pub fn from_spatial(element: T, s: [T; 3]) -> Axes4<T> {
        Axes4([element, s[0], s[1], s[2]])
    }

    #[inline(always)]
    pub fn element(&self) -> T {
        self.0[0]
    }
    #[inline(always)]
    pub fn x(&self) -> T {
        self.0[1]
    }
    #[inline(always)]
    pub fn y(&self) -> T {
        self.0[2]
    }
    #[inline(always)]
    pub fn z(&self) -> T {
        self.0[3]
    }

    #[inline(always)]
    pub fn spatial(&self) -> [T; 3] {
        [self.0[1], self.0[2], self.0[3]]
    }
}

impl<T> Index<usize> for Axes4<T> {
    type Output = T;
    #[inline(always)]
    fn index(&self, i: usize) -> &T {
        &self.0[i]
    }
}

impl<T> IndexMut<usize> for Axes4<T> {
    #[inline(always)]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.0[i]
    }
}

impl<T> Index<Axis> for Axes4<T> {
    type Output = T;
    #[inline(always)]
    fn index(&self, axis: Axis) -> &T {
        &self.0[axis as usize]
    }
}

impl<T> IndexMut<Axis> for Axes4<T> {
    #[inline(always)]
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.0[axis as usize]
    }
}
