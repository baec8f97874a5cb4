//! Geometry primitives: `Vec3`, `Quat`, `Mat3`, `Aabb`.
//!
//! Hand-rolled rather than pulled from a math crate: the simulation only
//! needs a handful of operations and keeping them here means the rest of the
//! crate never has to reconcile a third-party convention (row vs column
//! major, handedness) with the original's.

use std::ops::{Add, Div, Mul, Neg, Sub};

pub const EPSILON: f32 = 0.0001;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    #[inline]
    pub fn dot(self, rhs: Vec3) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline]
    pub fn cross(self, rhs: Vec3) -> Vec3 {
        Vec3::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        if len > EPSILON {
            self * (1.0 / len)
        } else {
            self
        }
    }

    #[inline]
    pub fn abs(self) -> Vec3 {
        Vec3::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    #[inline]
    pub fn min(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[inline]
    pub fn max_component(self) -> f32 {
        self.x.max(self.y).max(self.z)
    }

    #[inline]
    pub fn clamp_length(self, max_len: f32) -> Vec3 {
        let len = self.length();
        if len > max_len && len > EPSILON {
            self * (max_len / len)
        } else {
            self
        }
    }

    /// Clamps each component to `[0, 1]`, for color values.
    #[inline]
    pub fn clamp01(self) -> Vec3 {
        Vec3::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0), self.z.clamp(0.0, 1.0))
    }

    /// Component indexed by axis (0=x, 1=y, 2=z). Out-of-range axis returns 0.
    #[inline]
    pub fn component(self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            _ => 0.0,
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn div(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Unit quaternion, (x, y, z, w) with w the scalar part.
#[derive(Clone, Copy, Debug)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    #[inline]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Quat {
        let axis = axis.normalize();
        let (s, c) = (angle * 0.5).sin_cos();
        Quat { x: axis.x * s, y: axis.y * s, z: axis.z * s, w: c }
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    #[inline]
    pub fn normalize(self) -> Quat {
        let len = self.length_squared().sqrt();
        if len > EPSILON {
            Quat { x: self.x / len, y: self.y / len, z: self.z / len, w: self.w / len }
        } else {
            Quat::IDENTITY
        }
    }

    /// Inverse rotation of a unit quaternion: negate the vector part.
    #[inline]
    pub fn conjugate(self) -> Quat {
        Quat { x: -self.x, y: -self.y, z: -self.z, w: self.w }
    }

    /// Hamilton product `self * rhs`.
    #[inline]
    pub fn mul(self, rhs: Quat) -> Quat {
        Quat {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }

    #[inline]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    pub fn to_mat3(self) -> Mat3 {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);
        Mat3 {
            cols: [
                Vec3::new(1.0 - (yy + zz), xy + wz, xz - wy),
                Vec3::new(xy - wz, 1.0 - (xx + zz), yz + wx),
                Vec3::new(xz + wy, yz - wx, 1.0 - (xx + yy)),
            ],
        }
    }

    /// Integrate orientation by angular velocity `omega` over `dt` using the
    /// standard `q += 0.5 * omega_quat * q * dt` approximation, then
    /// renormalize.
    pub fn integrate(self, omega: Vec3, dt: f32) -> Quat {
        let omega_quat = Quat { x: omega.x, y: omega.y, z: omega.z, w: 0.0 };
        let delta = omega_quat.mul(self);
        Quat {
            x: self.x + delta.x * 0.5 * dt,
            y: self.y + delta.y * 0.5 * dt,
            z: self.z + delta.z * 0.5 * dt,
            w: self.w + delta.w * 0.5 * dt,
        }
        .normalize()
    }
}

/// Column-major 3x3 matrix.
#[derive(Clone, Copy, Debug)]
pub struct Mat3 {
    pub cols: [Vec3; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        cols: [Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)],
    };

    pub fn diagonal(d: Vec3) -> Mat3 {
        Mat3 {
            cols: [Vec3::new(d.x, 0.0, 0.0), Vec3::new(0.0, d.y, 0.0), Vec3::new(0.0, 0.0, d.z)],
        }
    }

    #[inline]
    pub fn mul_vec3(self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }

    pub fn transpose(self) -> Mat3 {
        Mat3 {
            cols: [
                Vec3::new(self.cols[0].x, self.cols[1].x, self.cols[2].x),
                Vec3::new(self.cols[0].y, self.cols[1].y, self.cols[2].y),
                Vec3::new(self.cols[0].z, self.cols[1].z, self.cols[2].z),
            ],
        }
    }

    pub fn mul_mat3(self, rhs: Mat3) -> Mat3 {
        Mat3 {
            cols: [
                self.mul_vec3(rhs.cols[0]),
                self.mul_vec3(rhs.cols[1]),
                self.mul_vec3(rhs.cols[2]),
            ],
        }
    }
}

/// Axis-aligned bounding box, empty when `min > max` on any axis.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3 { x: f32::MAX, y: f32::MAX, z: f32::MAX },
        max: Vec3 { x: f32::MIN, y: f32::MIN, z: f32::MIN },
    };

    pub fn from_min_max(min: Vec3, max: Vec3) -> Aabb {
        Aabb { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Slab-test intersection of a ray against this box.
    /// Returns `(t_enter, t_exit)` when the ray intersects within `[0, max_dist]`.
    pub fn ray_intersect(&self, origin: Vec3, dir: Vec3, max_dist: f32) -> Option<(f32, f32)> {
        let mut t_min = 0.0f32;
        let mut t_max = max_dist;

        for axis in 0..3 {
            let o = origin.component(axis);
            let d = dir.component(axis);
            let lo = self.min.component(axis);
            let hi = self.max.component(axis);

            if d.abs() < EPSILON {
                if o < lo || o > hi {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d;
                let mut t1 = (lo - o) * inv_d;
                let mut t2 = (hi - o) * inv_d;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        Some((t_min, t_max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_normalize_of_zero_is_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }

    #[test]
    fn quat_identity_rotates_nothing() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let r = Quat::IDENTITY.rotate(v);
        assert!((r - v).length() < 1e-5);
    }

    #[test]
    fn quat_from_axis_angle_rotates_90_degrees() {
        let q = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!((r.x).abs() < 1e-4);
        assert!((r.z - (-1.0)).abs() < 1e-3);
    }

    #[test]
    fn aabb_ray_intersect_hits_box() {
        let b = Aabb::from_min_max(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let hit = b.ray_intersect(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 100.0);
        assert!(hit.is_some());
        let (t_enter, _) = hit.unwrap();
        assert!((t_enter - 4.0).abs() < 1e-4);
    }

    #[test]
    fn aabb_ray_parallel_miss_returns_none() {
        let b = Aabb::from_min_max(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let hit = b.ray_intersect(Vec3::new(-5.0, 5.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 100.0);
        assert!(hit.is_none());
    }
}
