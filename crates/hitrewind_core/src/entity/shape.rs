//! Hit-volume shapes: world bounds and exact ray tests.

use hitrewind_shared::{Aabb, Ray, Transform, Vec3};
use serde::{Deserialize, Serialize};

/// Local axis a capsule is aligned with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeAxis {
    /// Local X
    X,
    /// Local Y
    #[default]
    Y,
    /// Local Z
    Z,
}

impl ShapeAxis {
    /// Unit vector along the axis.
    #[must_use]
    pub const fn unit(self) -> Vec3 {
        match self {
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
        }
    }
}

/// Collision shape of one hit volume, centered on the volume's pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitShape {
    /// Sphere of `radius`.
    Sphere {
        /// Radius before pose scale.
        radius: f32,
    },
    /// Oriented box.
    Box {
        /// Half size along each local axis.
        half_extents: Vec3,
    },
    /// Segment swept by a sphere.
    Capsule {
        /// Radius before pose scale.
        radius: f32,
        /// Half the distance between the two cap centers.
        half_height: f32,
        /// Local axis of the segment.
        axis: ShapeAxis,
    },
}

impl HitShape {
    /// Bounds in the volume's own space.
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        match *self {
            Self::Sphere { radius } => Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(radius)),
            Self::Box { half_extents } => Aabb::from_center_half_extents(Vec3::ZERO, half_extents),
            Self::Capsule { radius, half_height, axis } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::splat(radius) + axis.unit() * half_height,
            ),
        }
    }

    /// World-space bounds at `pose`.
    #[must_use]
    pub fn world_bounds(&self, pose: &Transform) -> Aabb {
        match *self {
            Self::Sphere { radius } => Aabb::from_center_half_extents(
                pose.position,
                Vec3::splat(radius * pose.scale.abs()),
            ),
            Self::Box { .. } => self.local_bounds().transformed(pose),
            Self::Capsule { radius, half_height, axis } => {
                let (a, b) = segment(pose, half_height, axis);
                Aabb::new(a, b).expanded(radius * pose.scale.abs())
            }
        }
    }

    /// Distance along `ray` to the shape at `pose`, 0 when the origin is inside.
    #[must_use]
    pub fn ray_distance(&self, pose: &Transform, ray: &Ray) -> Option<f32> {
        match *self {
            Self::Sphere { radius } => ray_sphere(ray, pose.position, radius * pose.scale.abs()),
            Self::Box { half_extents } => {
                // Local-space ray keeps world distances: direction carries 1/scale
                let inverse = pose.inverse();
                let local = Ray {
                    origin: inverse.transform_point(ray.origin),
                    direction: inverse.transform_vector(ray.direction),
                };
                Aabb::from_center_half_extents(Vec3::ZERO, half_extents).ray_distance(&local)
            }
            Self::Capsule { radius, half_height, axis } => {
                let (a, b) = segment(pose, half_height, axis);
                ray_capsule(ray, a, b, radius * pose.scale.abs())
            }
        }
    }
}

fn segment(pose: &Transform, half_height: f32, axis: ShapeAxis) -> (Vec3, Vec3) {
    let offset = pose.transform_vector(axis.unit() * half_height);
    (pose.position - offset, pose.position + offset)
}

fn closer(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (hit, None) | (None, hit) => hit,
    }
}

fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    (t >= 0.0).then_some(t)
}

fn ray_capsule(ray: &Ray, a: Vec3, b: Vec3, radius: f32) -> Option<f32> {
    let ab = b - a;
    let ab_dot_ab = ab.length_squared();
    if ab_dot_ab <= f32::EPSILON {
        return ray_sphere(ray, a, radius);
    }

    let ao = ray.origin - a;
    let ao_perp = ao - ab * (ab.dot(ao) / ab_dot_ab);
    let along = ab.dot(ao) / ab_dot_ab;
    if ao_perp.length_squared() <= radius * radius && (0.0..=1.0).contains(&along) {
        return Some(0.0);
    }

    let caps = closer(ray_sphere(ray, a, radius), ray_sphere(ray, b, radius));

    let d_perp = ray.direction - ab * (ab.dot(ray.direction) / ab_dot_ab);
    let qa = d_perp.length_squared();
    if qa <= f32::EPSILON {
        return caps;
    }
    let qb = 2.0 * d_perp.dot(ao_perp);
    let qc = ao_perp.length_squared() - radius * radius;
    let discriminant = qb * qb - 4.0 * qa * qc;
    if discriminant < 0.0 {
        return caps;
    }

    let t = (-qb - discriminant.sqrt()) / (2.0 * qa);
    if t < 0.0 {
        return caps;
    }
    let projected = (ray.at(t) - a).dot(ab) / ab_dot_ab;
    if (0.0..=1.0).contains(&projected) {
        closer(Some(t), caps)
    } else {
        caps
    }
}
