//! The rotating tube + detector assembly.
//!
//! All geometry is constructed once in the gantry's own frame (a child of the
//! global frame); rotating the gantry rotates that frame, and per-frame global
//! coordinates are obtained through the registry.

use geometry::BoundedSurface;

use crate::config::{PhysicalDetectorProperties, ProjectionsProperties, TubeProperties};
use crate::spectrum::EnergySpectrum;
use crate::{Anglef32, Error, FrameId, FrameRegistry, Lengthf32, Point, Vector, GLOBAL_FRAME};

/// Photon emitter: focus point (gantry frame) and the emitted spectrum.
#[derive(Clone, Debug)]
pub struct XRayTube {
    pub focus: Point,
    pub spectrum: EnergySpectrum,
    pub focal_spot_size: Lengthf32,
}

impl XRayTube {
    fn new(props: &TubeProperties, detector: &PhysicalDetectorProperties) -> Self {
        let focus = Point::new(0.0, detector.detector_focus_distance / 2.0, 0.0);
        let spectrum = EnergySpectrum::bremsstrahlung(
            props.min_energy, props.peak_energy, props.spectrum_bins, props.photons_per_ray);
        Self { focus, spectrum, focal_spot_size: props.focal_spot_size }
    }
}

/// One detector element: a bounded surface whose normal faces the tube focus.
#[derive(Clone, Debug)]
pub struct DetectorPixel {
    pub surface: BoundedSurface,
    pub normal: Vector,
}

impl DetectorPixel {
    pub fn centre(&self) -> Point { self.surface.point_at(0.5, 0.5) }
}

pub struct Gantry {
    pub frame: FrameId,
    pub angle: Anglef32,
    pub tube: XRayTube,
    /// Pixel geometry in the gantry frame; index = sinogram distance index.
    pub pixels: Vec<DetectorPixel>,
}

impl Gantry {
    pub fn new(
        registry: &mut FrameRegistry,
        tube: &TubeProperties,
        projections: &ProjectionsProperties,
        detector: &PhysicalDetectorProperties,
    ) -> Result<Self, Error> {
        let frame = registry.add_frame(GLOBAL_FRAME, Point::origin(),
                                       Vector::x(), Vector::y(), Vector::z())?;
        let tube = XRayTube::new(tube, detector);
        let pixels = build_pixel_arc(&tube, projections, detector);
        Ok(Self { frame, angle: 0.0, tube, pixels })
    }

    /// Rotate the assembly to an absolute angle about the global z axis.
    pub fn rotate_to(&mut self, registry: &mut FrameRegistry, angle: Anglef32) -> Result<(), Error> {
        registry.rotate(self.frame, Vector::z(), angle - self.angle)?;
        self.angle = angle;
        Ok(())
    }

    pub fn focus_in(&self, registry: &FrameRegistry, target: FrameId) -> Result<Point, Error> {
        Ok(registry.convert_point(self.tube.focus, self.frame, target)?)
    }

    pub fn focus_in_global(&self, registry: &FrameRegistry) -> Result<Point, Error> {
        self.focus_in(registry, GLOBAL_FRAME)
    }

    /// Pixel surfaces converted to the target frame for the current angle.
    pub fn pixels_in(&self, registry: &FrameRegistry, target: FrameId) -> Result<Vec<DetectorPixel>, Error> {
        self.pixels.iter()
            .map(|pixel| {
                let origin = registry.convert_point(pixel.surface.origin, self.frame, target)?;
                let u = registry.convert_vector(pixel.surface.u, self.frame, target)?;
                let v = registry.convert_vector(pixel.surface.v, self.frame, target)?;
                let normal = registry.convert_vector(pixel.normal, self.frame, target)?;
                Ok(DetectorPixel { surface: BoundedSurface::unit(origin, u, v), normal })
            })
            .collect()
    }

    pub fn pixels_in_global(&self, registry: &FrameRegistry) -> Result<Vec<DetectorPixel>, Error> {
        self.pixels_in(registry, GLOBAL_FRAME)
    }
}

/// Place one pixel per sinogram distance on an arc centred on the tube focus.
/// Pixel `i` covers the fan of rays crossing the central plane between the
/// distance edges `i` and `i + 1`, so the arc tiles the measuring field
/// without gaps.
fn build_pixel_arc(
    tube: &XRayTube,
    projections: &ProjectionsProperties,
    detector: &PhysicalDetectorProperties,
) -> Vec<DetectorPixel> {
    let n = projections.number_of_distances;
    let dd = projections.distance_resolution();
    let radius = detector.detector_focus_distance;
    let focus = tube.focus;

    let arc_point = |edge: usize| -> Point {
        let t = (edge as f32 - n as f32 / 2.0) * dd;
        // Direction of the ray from the focus that crosses y = 0 at x = t
        let direction = (Point::new(t, 0.0, 0.0) - focus).normalize();
        focus + direction * radius
    };

    (0..n).map(|i| {
        let a = arc_point(i);
        let b = arc_point(i + 1);
        let u = b - a;
        let v = Vector::new(0.0, 0.0, detector.pixel_depth);
        let origin = a - v / 2.0;
        let surface = BoundedSurface::unit(origin, u, v);
        let mut normal = surface.normal();
        if normal.dot(&(focus - surface.point_at(0.5, 0.5))) < 0.0 { normal = -normal; }
        DetectorPixel { surface, normal }
    }).collect()
}
