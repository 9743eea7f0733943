use nalgebra::Matrix3;

use crate::{Lengthf32, Line, Point, Vector};

/// Rectangular patch: a corner plus two spanning edge vectors, valid over the
/// given parameter ranges.
#[derive(Clone, Copy, Debug)]
pub struct BoundedSurface {
    pub origin: Point,
    pub u: Vector,
    pub v: Vector,
    pub u_range: (Lengthf32, Lengthf32),
    pub v_range: (Lengthf32, Lengthf32),
}

/// Solution of a line/surface intersection: two surface parameters plus the
/// line parameter.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceHit {
    pub u: Lengthf32,
    pub v: Lengthf32,
    pub t: Lengthf32,
}

impl BoundedSurface {
    /// Unit patch: parameters in [0, 1] along both edges.
    pub fn unit(origin: Point, u: Vector, v: Vector) -> Self {
        Self { origin, u, v, u_range: (0.0, 1.0), v_range: (0.0, 1.0) }
    }

    pub fn point_at(&self, u: Lengthf32, v: Lengthf32) -> Point {
        self.origin + self.u * u + self.v * v
    }

    pub fn normal(&self) -> Vector {
        self.u.cross(&self.v).normalize()
    }

    /// Parameter-range test with a small tolerance: a solution landing
    /// numerically on an edge or corner still counts as inside.
    pub fn contains_params(&self, u: Lengthf32, v: Lengthf32) -> bool {
        const TOL: Lengthf32 = 1e-4;
        let (u0, u1) = self.u_range;
        let (v0, v1) = self.v_range;
        u0 - TOL <= u && u <= u1 + TOL && v0 - TOL <= v && v <= v1 + TOL
    }

    /// Solve `origin + u·eu + v·ev = line.origin + t·d` for `(u, v, t)`.
    /// A singular system (line parallel to the patch) yields `None`, which
    /// callers treat as a skip.
    pub fn intersect_line(&self, line: &Line) -> Option<SurfaceHit> {
        let m = Matrix3::from_columns(&[self.u, self.v, -line.direction]);
        let rhs = line.origin - self.origin;
        let solution = m.lu().solve(&rhs)?;
        Some(SurfaceHit { u: solution.x, v: solution.y, t: solution.z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn unit_square_in_xy() -> BoundedSurface {
        BoundedSurface::unit(Point::origin(), Vector::x(), Vector::y())
    }

    #[rstest]
    #[case([0.5, 0.5, -2.0], Some((0.5, 0.5, 2.0)))] // through the middle
    #[case([2.0, 0.5, -2.0], None)]                  // misses in u
    #[case([0.5, 9.0, -2.0], None)]                  // misses in v
    fn perpendicular_hits(#[case] from: [f32; 3], #[case] expected: Option<(f32, f32, f32)>) {
        let surface = unit_square_in_xy();
        let line = Line::new(Point::new(from[0], from[1], from[2]), Vector::z());
        let hit = surface.intersect_line(&line)
            .filter(|h| surface.contains_params(h.u, h.v));
        match (hit, expected) {
            (Some(h), Some((u, v, t))) => assert_float_eq!((h.u, h.v, h.t), (u, v, t), abs <= (1e-6, 1e-6, 1e-6)),
            (None, None) => (),
            (got, want) => panic!("expected {want:?}, got {got:?}"),
        }
    }

    #[test]
    fn corner_solutions_with_float_jitter_count_as_inside() {
        let surface = unit_square_in_xy();
        assert!(surface.contains_params(1.0 + 5e-5, -5e-5));
        assert!(!surface.contains_params(1.001, 0.5));
    }

    #[test]
    fn parallel_line_is_singular() {
        let surface = unit_square_in_xy();
        let line = Line::new(Point::new(0.0, 0.0, 1.0), Vector::x());
        assert!(surface.intersect_line(&line).is_none());
    }

    #[test]
    fn normal_is_unit_and_perpendicular() {
        let surface = BoundedSurface::unit(Point::origin(),
                                           Vector::new(2.0, 0.0, 0.0),
                                           Vector::new(0.0, 0.0, 3.0));
        let n = surface.normal();
        assert_float_eq!(n.norm(), 1.0, abs <= 1e-6);
        assert_float_eq!(n.dot(&surface.u), 0.0, abs <= 1e-6);
        assert_float_eq!(n.dot(&surface.v), 0.0, abs <= 1e-6);
    }
}
