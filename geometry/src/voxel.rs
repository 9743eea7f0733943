//! Axis-aligned voxel boxes and the entrance/exit computation for a ray
//! passing through one.

use crate::{BoundedSurface, Lengthf32, Line, Point, Vector};

/// The six faces of an axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Face { XMin, XMax, YMin, YMax, ZMin, ZMax }

/// Candidate faces are tried in this fixed order. When a ray grazes an edge
/// or vertex, whichever of the tied faces comes first here wins; that order
/// is incidental, not a contract.
pub const FACE_ORDER: [Face; 6] = [Face::XMin, Face::XMax, Face::YMin, Face::YMax, Face::ZMin, Face::ZMax];

impl Face {
    pub fn outward_normal(self) -> Vector {
        match self {
            Face::XMin => -Vector::x(),
            Face::XMax =>  Vector::x(),
            Face::YMin => -Vector::y(),
            Face::YMax =>  Vector::y(),
            Face::ZMin => -Vector::z(),
            Face::ZMax =>  Vector::z(),
        }
    }
}

/// Axis-aligned box given by its minimum corner and edge lengths.
#[derive(Clone, Copy, Debug)]
pub struct VoxelBox {
    pub corner: Point,
    pub size: Vector,
}

impl VoxelBox {
    pub fn new(corner: Point, size: Vector) -> Self { Self { corner, size } }

    pub fn diagonal(&self) -> Lengthf32 { self.size.norm() }

    pub fn contains(&self, p: Point) -> bool {
        const TOL: Lengthf32 = 1e-6;
        (0..3).all(|i| self.corner[i] - TOL <= p[i] && p[i] <= self.corner[i] + self.size[i] + TOL)
    }

    pub fn face_surface(&self, face: Face) -> BoundedSurface {
        let (sx, sy, sz) = (self.size.x, self.size.y, self.size.z);
        let (offset, u, v) = match face {
            Face::XMin => (Vector::zeros(),             Vector::new(0.0, sy, 0.0), Vector::new(0.0, 0.0, sz)),
            Face::XMax => (Vector::new(sx, 0.0, 0.0),   Vector::new(0.0, sy, 0.0), Vector::new(0.0, 0.0, sz)),
            Face::YMin => (Vector::zeros(),             Vector::new(sx, 0.0, 0.0), Vector::new(0.0, 0.0, sz)),
            Face::YMax => (Vector::new(0.0, sy, 0.0),   Vector::new(sx, 0.0, 0.0), Vector::new(0.0, 0.0, sz)),
            Face::ZMin => (Vector::zeros(),             Vector::new(sx, 0.0, 0.0), Vector::new(0.0, sy, 0.0)),
            Face::ZMax => (Vector::new(0.0, 0.0, sz),   Vector::new(sx, 0.0, 0.0), Vector::new(0.0, sy, 0.0)),
        };
        BoundedSurface::unit(self.corner + offset, u, v)
    }
}

/// One face crossing: which face, where, and how far along the line.
#[derive(Clone, Copy, Debug)]
pub struct FaceHit {
    pub face: Face,
    pub point: Point,
    pub t: Lengthf32,
}

#[derive(Clone, Copy, Debug)]
pub struct BoxIntersection {
    pub entry: FaceHit,
    pub exit: FaceHit,
}

/// First face (in `FACE_ORDER`) whose plane the line crosses within the face
/// bounds, at non-negative parameter, moving in the requested sense.
fn first_face_hit(line: &Line, voxel: &VoxelBox, entering: bool) -> Option<FaceHit> {
    for face in FACE_ORDER {
        let along = line.direction.dot(&face.outward_normal());
        // A face can only be an entrance if the ray moves toward it, and only
        // an exit if it moves away
        if entering { if along >= 0.0 { continue; } }
        else        { if along <= 0.0 { continue; } }

        let surface = voxel.face_surface(face);
        if let Some(hit) = surface.intersect_line(line) {
            if hit.t >= 0.0 && surface.contains_params(hit.u, hit.v) {
                return Some(FaceHit { face, point: line.point_at(hit.t), t: hit.t });
            }
        }
    }
    None
}

/// Entrance and exit of a ray through a voxel, or `None` when the ray misses
/// (or only grazes) the box. A ray whose origin lies inside the box enters at
/// parameter 0 through the face behind its origin.
pub fn ray_box_intersection(line: &Line, voxel: &VoxelBox) -> Option<BoxIntersection> {
    let entry = if voxel.contains(line.origin) {
        let behind = first_face_hit(&line.reversed(), voxel, false)?;
        FaceHit { face: behind.face, point: line.origin, t: 0.0 }
    } else {
        first_face_hit(line, voxel, true)?
    };

    let exit = first_face_hit(line, voxel, false)?;
    if exit.t <= entry.t { return None; }
    Some(BoxIntersection { entry, exit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn unit_box() -> VoxelBox {
        VoxelBox::new(Point::origin(), Vector::new(1.0, 1.0, 1.0))
    }

    #[rstest]
    #[case([-1.0, 0.5, 0.5], [ 1.0, 0.0, 0.0], Face::XMin, Face::XMax)]
    #[case([ 2.0, 0.5, 0.5], [-1.0, 0.0, 0.0], Face::XMax, Face::XMin)]
    #[case([ 0.5, -3.0, 0.5], [0.0, 1.0, 0.0], Face::YMin, Face::YMax)]
    #[case([ 0.5, 0.5, 9.0], [0.0, 0.0, -1.0], Face::ZMax, Face::ZMin)]
    fn axis_aligned_crossings(#[case] from: [f32; 3], #[case] dir: [f32; 3],
                              #[case] entry: Face, #[case] exit: Face) {
        let line = Line::new(Point::new(from[0], from[1], from[2]),
                             Vector::new(dir[0], dir[1], dir[2]));
        let hit = ray_box_intersection(&line, &unit_box()).unwrap();
        assert_eq!(hit.entry.face, entry);
        assert_eq!(hit.exit.face, exit);
        assert!(hit.entry.t < hit.exit.t);
        assert_float_eq!(hit.exit.t - hit.entry.t, 1.0, abs <= 1e-5);
    }

    #[test]
    fn origin_inside_enters_at_zero() {
        let line = Line::new(Point::new(0.5, 0.5, 0.5), Vector::x());
        let hit = ray_box_intersection(&line, &unit_box()).unwrap();
        assert_float_eq!(hit.entry.t, 0.0, abs <= 1e-6);
        assert_eq!(hit.entry.face, Face::XMin); // the face behind the origin
        assert_eq!(hit.exit.face, Face::XMax);
        assert_float_eq!(hit.exit.t, 0.5, abs <= 1e-6);
    }

    #[test]
    fn corner_to_corner_diagonal_is_a_valid_crossing() {
        // Entrance and exit both land exactly on box corners; the in-range
        // test must not reject them over float jitter in the face parameters
        let line = Line::new(Point::new(-1.0, -1.0, -1.0), Vector::new(1.0, 1.0, 1.0));
        let hit = ray_box_intersection(&line, &unit_box()).unwrap();
        assert!(hit.entry.t < hit.exit.t);
        assert_float_eq!(hit.exit.t - hit.entry.t, 3f32.sqrt(), abs <= 1e-4);
    }

    #[test]
    fn miss_reports_no_intersection() {
        let line = Line::new(Point::new(-1.0, 5.0, 0.5), Vector::x());
        assert!(ray_box_intersection(&line, &unit_box()).is_none());
    }

    #[test]
    fn ray_pointing_away_reports_no_intersection() {
        let line = Line::new(Point::new(-1.0, 0.5, 0.5), -Vector::x());
        assert!(ray_box_intersection(&line, &unit_box()).is_none());
    }

    proptest! {
        // Aim at a random point well inside the box from a random outside
        // origin: the chord length can never exceed the diagonal, and the
        // entrance always precedes the exit.
        #[test]
        fn chord_never_exceeds_diagonal(
            ox in -10.0f32..-2.0,
            oy in -10.0f32..10.0,
            oz in -10.0f32..10.0,
            tx in 0.1f32..0.9,
            ty in 0.1f32..0.9,
            tz in 0.1f32..0.9,
        ) {
            let voxel = unit_box();
            let origin = Point::new(ox, oy, oz);
            let target = Point::new(tx, ty, tz);
            let line = Line::new(origin, target - origin);
            let hit = ray_box_intersection(&line, &voxel).unwrap();
            prop_assert!(hit.entry.t < hit.exit.t);
            let chord = (hit.exit.point - hit.entry.point).norm();
            prop_assert!(chord <= voxel.diagonal() + 1e-4);
        }
    }
}
