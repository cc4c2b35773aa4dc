use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// A ray with an origin and a direction. The direction is not required to
/// be normalized, so distances are parametric: the point at distance `t` is
/// `origin + t * direction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::NEG_Z)
    }
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Transforms the ray by a matrix. Parametric distances are preserved.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// One of the six faces of a [`Bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    Left,
    Right,
    Bottom,
    Top,
    Back,
    Front,
}

impl Face {
    fn from_axis(axis: usize, is_max: bool) -> Self {
        match (axis, is_max) {
            (0, false) => Face::Left,
            (0, true) => Face::Right,
            (1, false) => Face::Bottom,
            (1, true) => Face::Top,
            (2, false) => Face::Back,
            _ => Face::Front,
        }
    }

    /// Outward unit normal of the face.
    pub fn normal(self) -> Vec3 {
        match self {
            Face::Left => Vec3::NEG_X,
            Face::Right => Vec3::X,
            Face::Bottom => Vec3::NEG_Y,
            Face::Top => Vec3::Y,
            Face::Back => Vec3::NEG_Z,
            Face::Front => Vec3::Z,
        }
    }
}

/// Result of intersecting a ray with a [`Bounds`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsHit {
    pub distance: f32,
    pub face: Face,
    /// False when the ray starts inside the bounds and the hit is on exit.
    pub is_entry: bool,
}

/// Axis-aligned bounding box. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self::new(center - half, center + half)
    }

    /// Smallest bounds containing every point.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points
            .into_iter()
            .fold(Self::empty(), |bounds, point| bounds.extended(point))
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn extended(&self, point: Vec3) -> Self {
        Self::new(self.min.min(point), self.max.max(point))
    }

    pub fn union(&self, other: &Bounds) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Axis-aligned bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(
            self.corners()
                .into_iter()
                .map(|corner| matrix.transform_point3(corner)),
        )
    }

    /// Bounds scaled about the origin.
    pub fn scaled(&self, scale: Vec3) -> Self {
        if self.is_empty() {
            return *self;
        }
        let a = self.min * scale;
        let b = self.max * scale;
        Self::new(a.min(b), a.max(b))
    }

    /// Slab test. Returns the entry hit, or the exit hit when the ray
    /// starts inside. Hits behind the origin are ignored.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<BoundsHit> {
        if self.is_empty() {
            return None;
        }
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        let mut near_face = Face::Left;
        let mut far_face = Face::Right;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if direction.abs() <= f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / direction;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            let mut face0 = Face::from_axis(axis, false);
            let mut face1 = Face::from_axis(axis, true);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
                std::mem::swap(&mut face0, &mut face1);
            }
            if t0 > t_near {
                t_near = t0;
                near_face = face0;
            }
            if t1 < t_far {
                t_far = t1;
                far_face = face1;
            }
            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 {
            None
        } else if t_near >= 0.0 {
            Some(BoundsHit {
                distance: t_near,
                face: near_face,
                is_entry: true,
            })
        } else {
            Some(BoundsHit {
                distance: t_far,
                face: far_face,
                is_entry: false,
            })
        }
    }
}

/// Möller-Trumbore ray/triangle test. Returns the distance to a hit in
/// front of the ray origin.
pub fn intersect_triangle(ray: &Ray, p0: Vec3, p1: Vec3, p2: Vec3) -> Option<f32> {
    let edge1 = p1 - p0;
    let edge2 = p2 - p0;
    let h = ray.direction.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() <= f32::EPSILON * edge1.length() * edge2.length() {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - p0;
    let u = inv_det * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = inv_det * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = inv_det * edge2.dot(q);
    (t >= 0.0).then_some(t)
}

/// Distance at which a ray crosses a plane through `point` with `normal`.
pub fn intersect_plane(ray: &Ray, point: Vec3, normal: Vec3) -> Option<f32> {
    let denom = normal.dot(ray.direction);
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let t = normal.dot(point - ray.origin) / denom;
    (t >= 0.0).then_some(t)
}
