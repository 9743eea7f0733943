//! Hierarchical right-handed coordinate frames, owned by a registry and
//! addressed by stable ids rather than pointers.

use nalgebra::{Matrix3, Rotation3, Unit};
use thiserror::Error;
use tracing::warn;

use crate::{Lengthf32, Point, Vector};

/// Stable handle into a `FrameRegistry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

/// The root frame. It has no parent and refuses rotation and translation.
pub const GLOBAL_FRAME: FrameId = FrameId(0);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame id {0} does not exist in this registry")]
    UnknownFrame(usize),

    #[error("the global frame cannot be rotated or translated")]
    GlobalFrameImmutable,

    #[error("frame conversion system is singular")]
    Singular,
}

/// Origin and three mutually orthogonal unit axes, expressed in the
/// coordinates of the parent frame.
#[derive(Clone, Debug)]
pub struct CoordinateFrame {
    pub origin: Point,
    pub ex: Vector,
    pub ey: Vector,
    pub ez: Vector,
    parent: Option<FrameId>,
}

impl CoordinateFrame {
    pub fn parent(&self) -> Option<FrameId> { self.parent }

    /// Axes as matrix columns: maps frame-local coordinates into the parent.
    fn axis_matrix(&self) -> Matrix3<Lengthf32> {
        Matrix3::from_columns(&[self.ex, self.ey, self.ez])
    }

    fn axes_are_identity(&self) -> bool {
        self.axis_matrix() == Matrix3::identity()
    }

    fn axes_orthonormal(ex: Vector, ey: Vector, ez: Vector) -> bool {
        const TOL: Lengthf32 = 1e-4;
        let unit = (ex.norm() - 1.0).abs() < TOL
                && (ey.norm() - 1.0).abs() < TOL
                && (ez.norm() - 1.0).abs() < TOL;
        let orthogonal = ex.dot(&ey).abs() < TOL
                      && ey.dot(&ez).abs() < TOL
                      && ez.dot(&ex).abs() < TOL;
        // Right-handedness is part of the frame invariant
        unit && orthogonal && ex.cross(&ey).dot(&ez) > 0.0
    }
}

/// Arena owning every frame. Created with the global frame at id 0.
pub struct FrameRegistry {
    frames: Vec<CoordinateFrame>,
}

impl Default for FrameRegistry {
    fn default() -> Self { Self::new() }
}

impl FrameRegistry {
    pub fn new() -> Self {
        let global = CoordinateFrame {
            origin: Point::origin(),
            ex: Vector::x(),
            ey: Vector::y(),
            ez: Vector::z(),
            parent: None,
        };
        Self { frames: vec![global] }
    }

    pub fn get(&self, id: FrameId) -> Result<&CoordinateFrame, FrameError> {
        self.frames.get(id.0).ok_or(FrameError::UnknownFrame(id.0))
    }

    /// Add a frame below `parent`. Non-orthonormal axes are an input error:
    /// they are reported and replaced with parent-aligned axes.
    pub fn add_frame(
        &mut self,
        parent: FrameId,
        origin: Point,
        ex: Vector,
        ey: Vector,
        ez: Vector,
    ) -> Result<FrameId, FrameError> {
        self.get(parent)?;
        let (ex, ey, ez) = if CoordinateFrame::axes_orthonormal(ex, ey, ez) {
            (ex, ey, ez)
        } else {
            warn!("frame axes not orthonormal; falling back to parent-aligned axes");
            (Vector::x(), Vector::y(), Vector::z())
        };
        self.frames.push(CoordinateFrame { origin, ex, ey, ez, parent: Some(parent) });
        Ok(FrameId(self.frames.len() - 1))
    }

    /// Rotate a frame's axes about `axis` (given in parent coordinates).
    pub fn rotate(&mut self, id: FrameId, axis: Vector, angle: Lengthf32) -> Result<(), FrameError> {
        if id == GLOBAL_FRAME { return Err(FrameError::GlobalFrameImmutable); }
        self.get(id)?;
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle);
        let frame = &mut self.frames[id.0];
        frame.ex = rotation * frame.ex;
        frame.ey = rotation * frame.ey;
        frame.ez = rotation * frame.ez;
        Ok(())
    }

    /// Translate a frame's origin by `offset` (given in parent coordinates).
    pub fn translate(&mut self, id: FrameId, offset: Vector) -> Result<(), FrameError> {
        if id == GLOBAL_FRAME { return Err(FrameError::GlobalFrameImmutable); }
        self.get(id)?;
        self.frames[id.0].origin += offset;
        Ok(())
    }

    /// Chain of frames from `id` up to (and excluding) the global frame.
    fn chain_to_global(&self, id: FrameId) -> Result<Vec<FrameId>, FrameError> {
        let mut chain = vec![];
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent() {
            chain.push(current);
            current = parent;
        }
        Ok(chain)
    }

    pub fn point_to_global(&self, p: Point, frame: FrameId) -> Result<Point, FrameError> {
        let mut p = p;
        for id in self.chain_to_global(frame)? {
            let f = self.get(id)?;
            p = f.origin + f.axis_matrix() * p.coords;
        }
        Ok(p)
    }

    pub fn vector_to_global(&self, v: Vector, frame: FrameId) -> Result<Vector, FrameError> {
        let mut v = v;
        for id in self.chain_to_global(frame)? {
            v = self.get(id)?.axis_matrix() * v;
        }
        Ok(v)
    }

    pub fn point_from_global(&self, p: Point, frame: FrameId) -> Result<Point, FrameError> {
        let mut p = p;
        for id in self.chain_to_global(frame)?.into_iter().rev() {
            let f = self.get(id)?;
            let rhs = p - f.origin;
            p = if f.axes_are_identity() {
                Point::from(rhs)
            } else {
                // Axes differ from the parent's: solve  A x = p - origin
                Point::from(f.axis_matrix().lu().solve(&rhs).ok_or(FrameError::Singular)?)
            };
        }
        Ok(p)
    }

    pub fn vector_from_global(&self, v: Vector, frame: FrameId) -> Result<Vector, FrameError> {
        let mut v = v;
        for id in self.chain_to_global(frame)?.into_iter().rev() {
            let f = self.get(id)?;
            if !f.axes_are_identity() {
                v = f.axis_matrix().lu().solve(&v).ok_or(FrameError::Singular)?;
            }
        }
        Ok(v)
    }

    pub fn convert_point(&self, p: Point, from: FrameId, to: FrameId) -> Result<Point, FrameError> {
        if from == to { return Ok(p); }
        self.point_from_global(self.point_to_global(p, from)?, to)
    }

    pub fn convert_vector(&self, v: Vector, from: FrameId, to: FrameId) -> Result<Vector, FrameError> {
        if from == to { return Ok(v); }
        self.vector_from_global(self.vector_to_global(v, from)?, to)
    }
}
