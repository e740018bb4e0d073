//! Mathematical types shared by the rewind engine and its callers.
//!
//! Everything here is pure: no hidden state, deterministic for given inputs.
//! The same interpolation runs for pose application and for broad-phase
//! tests, so both must reproduce bit-identical results.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Dot product above which slerp falls back to nlerp.
const SLERP_DOT_THRESHOLD: f32 = 0.9995;

/// Direction component below which a ray is treated as parallel to a slab.
const RAY_PARALLEL_EPSILON: f32 = 1e-8;

/// Linear interpolation of two scalars.
#[inline]
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 3D Vector - position, extent, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Creates a vector with all components set to `v`
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// One vector
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Component by axis index (0 = x, 1 = y, anything else = z)
    #[must_use]
    pub const fn axis(self, index: usize) -> f32 {
        match index {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self / len
        } else {
            Self::ZERO
        }
    }

    /// Component-wise product
    #[must_use]
    pub fn mul_elem(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    /// Component-wise minimum
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Component-wise absolute value
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Linear interpolation towards `other`
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self::new(
            lerp(self.x, other.x, t),
            lerp(self.y, other.y, t),
            lerp(self.z, other.z, t),
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Div<f32> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians around `axis`.
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize_or_zero();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Extracts a rotation from orthonormal basis columns.
    ///
    /// Uses Shepperd's method, branching on the largest diagonal term
    /// to stay numerically stable.
    #[must_use]
    pub fn from_basis(x_axis: Vec3, y_axis: Vec3, z_axis: Vec3) -> Self {
        let (m00, m10, m20) = (x_axis.x, x_axis.y, x_axis.z);
        let (m01, m11, m21) = (y_axis.x, y_axis.y, y_axis.z);
        let (m02, m12, m22) = (z_axis.x, z_axis.y, z_axis.z);
        let trace = m00 + m11 + m22;

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };
        q.normalize()
    }

    /// 4D dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit quaternion, identity for a degenerate input
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
        } else {
            Self::IDENTITY
        }
    }

    /// Conjugate (inverse for unit quaternions)
    #[must_use]
    pub const fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotates a vector.
    #[must_use]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Rotated basis axes (columns of the rotation matrix).
    #[must_use]
    pub fn basis(self) -> [Vec3; 3] {
        [self.rotate(Vec3::X), self.rotate(Vec3::Y), self.rotate(Vec3::Z)]
    }

    /// Normalized linear interpolation along the shortest path.
    #[must_use]
    pub fn nlerp(self, other: Self, t: f32) -> Self {
        let other = if self.dot(other) < 0.0 { -other } else { other };
        Self::new(
            lerp(self.x, other.x, t),
            lerp(self.y, other.y, t),
            lerp(self.z, other.z, t),
            lerp(self.w, other.w, t),
        )
        .normalize()
    }

    /// Spherical linear interpolation along the shortest path.
    #[must_use]
    pub fn slerp(self, other: Self, t: f32) -> Self {
        let mut dot = self.dot(other);
        let mut other = other;
        if dot < 0.0 {
            other = -other;
            dot = -dot;
        }
        if dot > SLERP_DOT_THRESHOLD {
            return self.nlerp(other, t);
        }

        let theta_0 = dot.clamp(-1.0, 1.0).acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s0 = (theta_0 - theta).sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;
        Self::new(
            self.x * s0 + other.x * s1,
            self.y * s0 + other.y * s1,
            self.z * s0 + other.z * s1,
            self.w * s0 + other.w * s1,
        )
        .normalize()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

impl std::ops::Neg for Quaternion {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }
}

/// Transform - position + rotation + uniform scale
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// Position
    pub position: Vec3,
    /// Scale (uniform)
    pub scale: f32,
    /// Rotation
    pub rotation: Quaternion,
}

impl Transform {
    /// Creates a new transform
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion, scale: f32) -> Self {
        Self { position, scale, rotation }
    }

    /// Rigid transform with unit scale
    #[must_use]
    pub const fn from_position_rotation(position: Vec3, rotation: Quaternion) -> Self {
        Self::new(position, rotation, 1.0)
    }

    /// Pure translation
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self::new(position, Quaternion::IDENTITY, 1.0)
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec3::ZERO, Quaternion::IDENTITY, 1.0);

    /// Maps a local point into this transform's space.
    #[must_use]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation.rotate(point * self.scale)
    }

    /// Maps a local direction (no translation) into this transform's space.
    #[must_use]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.rotate(vector * self.scale)
    }

    /// Inverse transform. Assumes a unit rotation and non-zero scale.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.conjugate();
        let scale = 1.0 / self.scale;
        let position = rotation.rotate(-self.position) * scale;
        Self::new(position, rotation, scale)
    }

    /// `self * child`: applies `child` first, then `self`.
    #[must_use]
    pub fn compose(&self, child: &Self) -> Self {
        Self::new(
            self.transform_point(child.position),
            (self.rotation * child.rotation).normalize(),
            self.scale * child.scale,
        )
    }

    /// Interpolates position and scale linearly and rotation spherically.
    #[must_use]
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        Self::new(
            self.position.lerp(other.position, t),
            self.rotation.slerp(other.rotation, t),
            lerp(self.scale, other.scale, t),
        )
    }

    /// Composes the equivalent affine matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_trs(self.position, self.rotation, Vec3::splat(self.scale))
    }

    /// Decomposes a matrix into a transform.
    ///
    /// Non-uniform scale is collapsed to the mean of the three axis scales.
    #[must_use]
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (position, rotation, scale) = matrix.decompose();
        Self::new(position, rotation, (scale.x + scale.y + scale.z) / 3.0)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Column-major 4x4 affine matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Mat4 {
    /// Columns; `cols[3]` holds the translation.
    pub cols: [[f32; 4]; 4],
}

impl Mat4 {
    /// Identity matrix
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Composes translation * rotation * scale.
    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quaternion, scale: Vec3) -> Self {
        let [x, y, z] = rotation.basis();
        let (x, y, z) = (x * scale.x, y * scale.y, z * scale.z);
        Self {
            cols: [
                [x.x, x.y, x.z, 0.0],
                [y.x, y.y, y.z, 0.0],
                [z.x, z.y, z.z, 0.0],
                [translation.x, translation.y, translation.z, 1.0],
            ],
        }
    }

    /// Translation column.
    #[must_use]
    pub const fn translation(&self) -> Vec3 {
        Vec3::new(self.cols[3][0], self.cols[3][1], self.cols[3][2])
    }

    const fn axis(&self, col: usize) -> Vec3 {
        Vec3::new(self.cols[col][0], self.cols[col][1], self.cols[col][2])
    }

    /// Splits the matrix into translation, rotation and per-axis scale.
    ///
    /// A mirrored basis (negative determinant) is reported as a negative
    /// x scale so the rotation stays proper.
    #[must_use]
    pub fn decompose(&self) -> (Vec3, Quaternion, Vec3) {
        let (x, y, z) = (self.axis(0), self.axis(1), self.axis(2));
        let mut scale = Vec3::new(x.length(), y.length(), z.length());
        if x.cross(y).dot(z) < 0.0 {
            scale.x = -scale.x;
        }
        if scale.x == 0.0 || scale.y == 0.0 || scale.z == 0.0 {
            return (self.translation(), Quaternion::IDENTITY, scale);
        }
        let rotation = Quaternion::from_basis(x / scale.x, y / scale.y, z / scale.z);
        (self.translation(), rotation, scale)
    }

    /// Maps a point through the matrix.
    #[must_use]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.axis(0) * p.x + self.axis(1) * p.y + self.axis(2) * p.z + self.translation()
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box in world space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from two corners in any order.
    #[must_use]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    /// Creates a box from its center and full size.
    #[must_use]
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self { min: center - half, max: center + half }
    }

    /// Creates a box from its center and half extents.
    #[must_use]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self { min: center - half, max: center + half }
    }

    /// Center point
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full size
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half size
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Inclusive overlap test.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Inclusive point containment.
    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Grows this box to enclose `other` (min/max union).
    pub fn encapsulate(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Union of two boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.encapsulate(other);
        out
    }

    /// Box grown by `amount` on every side.
    #[must_use]
    pub fn expanded(&self, amount: f32) -> Self {
        let pad = Vec3::splat(amount);
        Self { min: self.min - pad, max: self.max + pad }
    }

    /// Interpolates center and size independently.
    ///
    /// This is not a swept hull: a fast-rotating volume can poke outside the
    /// interpolated box, so broad-phase tests built on it may under-report.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self::from_center_size(
            self.center().lerp(other.center(), t),
            self.size().lerp(other.size(), t),
        )
    }

    /// World-space box enclosing this local box after `transform`.
    ///
    /// Arvo's method: each rotated-and-scaled axis contributes its min/max
    /// independently, starting from the translation.
    #[must_use]
    pub fn transformed(&self, transform: &Transform) -> Self {
        let basis = transform.rotation.basis();
        let mut min = transform.position.to_array();
        let mut max = min;
        let (lo, hi) = (self.min.to_array(), self.max.to_array());

        for i in 0..3 {
            for (j, axis) in basis.iter().enumerate() {
                let m = axis.axis(i) * transform.scale;
                let a = m * lo[j];
                let b = m * hi[j];
                min[i] += a.min(b);
                max[i] += a.max(b);
            }
        }
        Self { min: Vec3::from_array(min), max: Vec3::from_array(max) }
    }

    /// Distance along `ray` to the box surface, or 0 when the origin is inside.
    #[must_use]
    pub fn ray_distance(&self, ray: &Ray) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        let (origin, dir) = (ray.origin.to_array(), ray.direction.to_array());
        let (lo, hi) = (self.min.to_array(), self.max.to_array());

        for i in 0..3 {
            if dir[i].abs() < RAY_PARALLEL_EPSILON {
                if origin[i] < lo[i] || origin[i] > hi[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let t0 = (lo[i] - origin[i]) * inv;
            let t1 = (hi[i] - origin[i]) * inv;
            t_min = t_min.max(t0.min(t1));
            t_max = t_max.min(t0.max(t1));
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            None
        } else {
            Some(t_min.max(0.0))
        }
    }
}

/// A half-line with a unit direction.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Ray {
    /// Origin point
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray, normalizing `direction` (zero falls back to +Z).
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = direction.normalize_or_zero();
        let direction = if direction == Vec3::ZERO { Vec3::Z } else { direction };
        Self { origin, direction }
    }

    /// Point at distance `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn approx_vec(a: Vec3, b: Vec3) -> bool {
        approx(a.x, b.x) && approx(a.y, b.y) && approx(a.z, b.z)
    }

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0); // 1*4 + 2*5 + 3*6
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
    }

    #[test]
    fn test_vec3_bytemuck() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 12); // 3 * 4 bytes
        assert_eq!(std::mem::size_of::<Transform>(), 32);
    }

    #[test]
    fn test_quaternion_rotate() {
        let q = Quaternion::from_axis_angle(Vec3::Y, FRAC_PI_2);
        // +X rotated 90 degrees about +Y lands on -Z
        assert!(approx_vec(q.rotate(Vec3::X), Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = Quaternion::IDENTITY;
        let b = Quaternion::from_axis_angle(Vec3::Y, FRAC_PI_2);

        assert!(approx(a.slerp(b, 0.0).dot(a).abs(), 1.0));
        assert!(approx(a.slerp(b, 1.0).dot(b).abs(), 1.0));

        let mid = a.slerp(b, 0.5);
        let expected = Quaternion::from_axis_angle(Vec3::Y, FRAC_PI_2 * 0.5);
        assert!(approx(mid.dot(expected).abs(), 1.0));
    }

    #[test]
    fn test_nlerp_takes_shortest_path() {
        let a = Quaternion::IDENTITY;
        let b = -Quaternion::IDENTITY;
        let q = a.nlerp(b, 0.5);
        assert!(approx(q.dot(a).abs(), 1.0));
    }

    #[test]
    fn test_matrix_decompose_roundtrip() {
        let rotation = Quaternion::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 0.7);
        let m = Mat4::from_trs(Vec3::new(1.0, -2.0, 3.0), rotation, Vec3::new(2.0, 2.0, 2.0));
        let (t, r, s) = m.decompose();

        assert!(approx_vec(t, Vec3::new(1.0, -2.0, 3.0)));
        assert!(approx_vec(s, Vec3::splat(2.0)));
        assert!(approx(r.dot(rotation).abs(), 1.0));
    }

    #[test]
    fn test_transform_inverse() {
        let t = Transform::new(
            Vec3::new(3.0, 0.0, -1.0),
            Quaternion::from_axis_angle(Vec3::Z, 0.3),
            2.0,
        );
        let p = Vec3::new(0.5, 1.5, -2.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert!(approx_vec(back, p));

        let identity = t.compose(&t.inverse());
        assert!(approx_vec(identity.position, Vec3::ZERO));
        assert!(approx(identity.scale, 1.0));
    }

    #[test]
    fn test_aabb_lerp_center_and_size() {
        let a = Aabb::from_center_size(Vec3::ZERO, Vec3::splat(2.0));
        let b = Aabb::from_center_size(Vec3::new(10.0, 0.0, 0.0), Vec3::splat(4.0));
        let mid = a.lerp(&b, 0.5);
        assert!(approx_vec(mid.center(), Vec3::new(5.0, 0.0, 0.0)));
        assert!(approx_vec(mid.size(), Vec3::splat(3.0)));
    }

    #[test]
    fn test_aabb_encapsulate() {
        let mut a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        a.encapsulate(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(0.5)));
        assert_eq!(a.min, Vec3::splat(-1.0));
        assert_eq!(a.max, Vec3::ONE);
    }

    #[test]
    fn test_aabb_transformed_rotated() {
        let local = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let t = Transform::from_position_rotation(
            Vec3::new(0.0, 5.0, 0.0),
            Quaternion::from_axis_angle(Vec3::Z, FRAC_PI_2),
        );
        let world = local.transformed(&t);
        // Long x-axis becomes the y-axis after a quarter turn around z
        assert!(approx_vec(world.half_extents(), Vec3::new(1.0, 2.0, 1.0)));
        assert!(approx_vec(world.center(), Vec3::new(0.0, 5.0, 0.0)));
    }

    #[test]
    fn test_aabb_ray_distance() {
        let b = Aabb::from_center_half_extents(Vec3::new(10.0, 0.0, 0.0), Vec3::ONE);
        let hit = b.ray_distance(&Ray::new(Vec3::ZERO, Vec3::X));
        assert!(approx(hit.unwrap(), 9.0));

        assert!(b.ray_distance(&Ray::new(Vec3::ZERO, -Vec3::X)).is_none());
        assert_eq!(b.ray_distance(&Ray::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Y)), Some(0.0));
    }
}
