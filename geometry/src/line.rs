use crate::{Lengthf32, Point, Vector};

/// Origin plus unit direction. The parameter of `point_at` is a distance.
#[derive(Clone, Copy, Debug)]
pub struct Line {
    pub origin: Point,
    pub direction: Vector,
}

impl Line {
    pub fn new(origin: Point, direction: Vector) -> Self {
        Self { origin, direction: direction.normalize() }
    }

    pub fn point_at(&self, t: Lengthf32) -> Point {
        self.origin + self.direction * t
    }

    /// Same line traversed in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self { origin: self.origin, direction: -self.direction }
    }
}
