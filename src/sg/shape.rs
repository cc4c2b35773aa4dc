use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::math::{intersect_plane, intersect_triangle, Bounds, Ray};
use crate::error::ParseError;
use crate::parser::{
    quote, Change, Field, FieldValue, Object, ObjectBase, ObjectCast, ObjectExt, ObjectPtr,
    Scanner, TField, VField,
};

/// Surface hit in the shape's object coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHit {
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Geometry owned by a [`Node`](super::node::Node).
pub trait Shape: Object {
    /// Object-space bounds.
    fn bounds(&self) -> Bounds;

    /// Intersects an object-space ray, returning the closest hit in front
    /// of the ray origin.
    fn intersect_ray(&self, ray: &Ray) -> Option<ShapeHit>;

    fn as_object(&self) -> &dyn Object;

    fn into_object(self: Arc<Self>) -> ObjectPtr;
}

impl fmt::Debug for dyn Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.type_name(), self.name())
    }
}

impl ObjectExt for dyn Shape {
    fn as_dyn(&self) -> &dyn Object {
        self.as_object()
    }
}

/// Answers [`Object::query_interface`] for a shape type.
pub fn shape_interface<T: Shape>(
    shape: Arc<T>,
    interface: TypeId,
) -> Option<Box<dyn Any + Send + Sync>> {
    if interface == TypeId::of::<Arc<dyn Shape>>() {
        let shape: Arc<dyn Shape> = shape;
        Some(Box::new(shape))
    } else {
        None
    }
}

impl ObjectCast for dyn Shape {
    fn cast(obj: ObjectPtr) -> Option<Arc<Self>> {
        let handle = obj.query_interface(TypeId::of::<Arc<dyn Shape>>())?;
        handle.downcast::<Arc<dyn Shape>>().ok().map(|shape| *shape)
    }

    fn upcast(this: Arc<Self>) -> ObjectPtr {
        this.into_object()
    }
}

/// Axis-aligned box centered on the origin.
pub struct BoxShape {
    base: ObjectBase,
    size: TField<Vec3>,
}

impl Default for BoxShape {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            size: TField::new("size", Vec3::ONE),
        }
    }
}

impl BoxShape {
    pub fn size(&self) -> Vec3 {
        self.size.get()
    }

    pub fn set_size(&self, size: Vec3) {
        self.size.set(size);
        self.process_change(Change::Geometry, self);
    }
}

impl Object for BoxShape {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.size);
    }

    fn query_interface(
        self: Arc<Self>,
        interface: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        shape_interface(self, interface)
    }
}

impl Shape for BoxShape {
    fn bounds(&self) -> Bounds {
        Bounds::from_center_size(Vec3::ZERO, self.size())
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<ShapeHit> {
        let hit = self.bounds().intersect_ray(ray)?;
        Some(ShapeHit {
            distance: hit.distance,
            point: ray.point_at(hit.distance),
            normal: hit.face.normal(),
        })
    }

    fn as_object(&self) -> &dyn Object {
        self
    }

    fn into_object(self: Arc<Self>) -> ObjectPtr {
        self
    }
}

/// Ellipsoid centered on the origin; `size` is the full extent per axis.
pub struct Ellipsoid {
    base: ObjectBase,
    size: TField<Vec3>,
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            size: TField::new("size", Vec3::splat(2.0)),
        }
    }
}

impl Ellipsoid {
    pub fn size(&self) -> Vec3 {
        self.size.get()
    }

    pub fn set_size(&self, size: Vec3) {
        self.size.set(size);
        self.process_change(Change::Geometry, self);
    }
}

impl Object for Ellipsoid {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.size);
    }

    fn query_interface(
        self: Arc<Self>,
        interface: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        shape_interface(self, interface)
    }
}

impl Shape for Ellipsoid {
    fn bounds(&self) -> Bounds {
        Bounds::from_center_size(Vec3::ZERO, self.size())
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<ShapeHit> {
        let radii = self.size().abs() * 0.5;
        if radii.min_element() <= f32::EPSILON {
            return None;
        }
        // Solve against the unit sphere in radius-scaled space.
        let origin = ray.origin / radii;
        let direction = ray.direction / radii;
        let a = direction.length_squared();
        let b = 2.0 * origin.dot(direction);
        let c = origin.length_squared() - 1.0;
        let discriminant = b * b - 4.0 * a * c;
        if a <= f32::EPSILON || discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let near = (-b - root) / (2.0 * a);
        let far = (-b + root) / (2.0 * a);
        let distance = if near >= 0.0 {
            near
        } else if far >= 0.0 {
            far
        } else {
            return None;
        };
        let point = ray.point_at(distance);
        Some(ShapeHit {
            distance,
            point,
            normal: (point / (radii * radii)).normalize_or_zero(),
        })
    }

    fn as_object(&self) -> &dyn Object {
        self
    }

    fn into_object(self: Arc<Self>) -> ObjectPtr {
        self
    }
}

/// Direction a [`Rectangle`] faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaneNormal {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    #[default]
    PositiveZ,
    NegativeZ,
}

impl PlaneNormal {
    const ALL: [PlaneNormal; 6] = [
        PlaneNormal::PositiveX,
        PlaneNormal::NegativeX,
        PlaneNormal::PositiveY,
        PlaneNormal::NegativeY,
        PlaneNormal::PositiveZ,
        PlaneNormal::NegativeZ,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PlaneNormal::PositiveX => "PositiveX",
            PlaneNormal::NegativeX => "NegativeX",
            PlaneNormal::PositiveY => "PositiveY",
            PlaneNormal::NegativeY => "NegativeY",
            PlaneNormal::PositiveZ => "PositiveZ",
            PlaneNormal::NegativeZ => "NegativeZ",
        }
    }

    pub fn normal(self) -> Vec3 {
        match self {
            PlaneNormal::PositiveX => Vec3::X,
            PlaneNormal::NegativeX => Vec3::NEG_X,
            PlaneNormal::PositiveY => Vec3::Y,
            PlaneNormal::NegativeY => Vec3::NEG_Y,
            PlaneNormal::PositiveZ => Vec3::Z,
            PlaneNormal::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Maps an in-plane size to a 3D extent with zero depth along the
    /// normal axis.
    fn extent(self, size: Vec2) -> Vec3 {
        match self {
            PlaneNormal::PositiveX | PlaneNormal::NegativeX => Vec3::new(0.0, size.x, size.y),
            PlaneNormal::PositiveY | PlaneNormal::NegativeY => Vec3::new(size.x, 0.0, size.y),
            PlaneNormal::PositiveZ | PlaneNormal::NegativeZ => Vec3::new(size.x, size.y, 0.0),
        }
    }
}

impl FieldValue for PlaneNormal {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        let text = scanner.scan_quoted_string()?;
        PlaneNormal::ALL
            .into_iter()
            .find(|value| value.name() == text)
            .ok_or_else(|| scanner.error(format!("Invalid PlaneNormal value '{text}'")))
    }

    fn to_text(&self) -> String {
        quote(self.name())
    }
}

const RECTANGLE_THICKNESS: f32 = 0.001;

/// Flat rectangle centered on the origin.
pub struct Rectangle {
    base: ObjectBase,
    size: TField<Vec2>,
    plane_normal: TField<PlaneNormal>,
}

impl Default for Rectangle {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            size: TField::new("size", Vec2::ONE),
            plane_normal: TField::new("plane_normal", PlaneNormal::PositiveZ),
        }
    }
}

impl Rectangle {
    pub fn size(&self) -> Vec2 {
        self.size.get()
    }

    pub fn plane_normal(&self) -> PlaneNormal {
        self.plane_normal.get()
    }

    pub fn set_size(&self, size: Vec2) {
        self.size.set(size);
        self.process_change(Change::Geometry, self);
    }

    pub fn set_plane_normal(&self, plane_normal: PlaneNormal) {
        self.plane_normal.set(plane_normal);
        self.process_change(Change::Geometry, self);
    }
}

impl Object for Rectangle {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.size);
        fields.push(&self.plane_normal);
    }

    fn query_interface(
        self: Arc<Self>,
        interface: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        shape_interface(self, interface)
    }
}

impl Shape for Rectangle {
    fn bounds(&self) -> Bounds {
        let plane_normal = self.plane_normal();
        let thickness = plane_normal.normal().abs() * RECTANGLE_THICKNESS;
        Bounds::from_center_size(Vec3::ZERO, plane_normal.extent(self.size()) + thickness)
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<ShapeHit> {
        let plane_normal = self.plane_normal();
        let normal = plane_normal.normal();
        let distance = intersect_plane(ray, Vec3::ZERO, normal)?;
        let point = ray.point_at(distance);
        let half = plane_normal.extent(self.size()).abs() * 0.5;
        if point.abs().cmpgt(half + Vec3::splat(f32::EPSILON)).any() {
            return None;
        }
        Some(ShapeHit {
            distance,
            point,
            normal,
        })
    }

    fn as_object(&self) -> &dyn Object {
        self
    }

    fn into_object(self: Arc<Self>) -> ObjectPtr {
        self
    }
}

/// Explicit triangle list: every three indices name one triangle.
pub struct Triangles {
    base: ObjectBase,
    points: VField<Vec3>,
    indices: VField<u32>,
}

impl Default for Triangles {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            points: VField::new("points"),
            indices: VField::new("indices"),
        }
    }
}

impl Triangles {
    pub fn points(&self) -> Vec<Vec3> {
        self.points.get()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.indices.get()
    }

    pub fn set_points(&self, points: Vec<Vec3>) {
        self.points.set(points);
        self.process_change(Change::Geometry, self);
    }

    pub fn set_indices(&self, indices: Vec<u32>) {
        self.indices.set(indices);
        self.process_change(Change::Geometry, self);
    }
}

impl Object for Triangles {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.points);
        fields.push(&self.indices);
    }

    fn is_valid(&self) -> Result<(), String> {
        let indices = self.indices();
        if indices.len() % 3 != 0 {
            return Err(format!(
                "Index count {} is not a multiple of 3",
                indices.len()
            ));
        }
        let point_count = self.points.len();
        match indices.iter().find(|&&index| index as usize >= point_count) {
            Some(index) => Err(format!("Index {index} out of range for {point_count} points")),
            None => Ok(()),
        }
    }

    fn query_interface(
        self: Arc<Self>,
        interface: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        shape_interface(self, interface)
    }
}

impl Shape for Triangles {
    fn bounds(&self) -> Bounds {
        Bounds::from_points(self.points())
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<ShapeHit> {
        let points = self.points();
        let indices = self.indices();
        let mut closest: Option<ShapeHit> = None;
        for triangle in indices.chunks_exact(3) {
            let corner = |i: usize| points.get(triangle[i] as usize).copied();
            let (Some(p0), Some(p1), Some(p2)) = (corner(0), corner(1), corner(2)) else {
                continue;
            };
            let Some(distance) = intersect_triangle(ray, p0, p1, p2) else {
                continue;
            };
            if closest.map_or(true, |hit| distance < hit.distance) {
                closest = Some(ShapeHit {
                    distance,
                    point: ray.point_at(distance),
                    normal: (p1 - p0).cross(p2 - p0).normalize_or_zero(),
                });
            }
        }
        closest
    }

    fn as_object(&self) -> &dyn Object {
        self
    }

    fn into_object(self: Arc<Self>) -> ObjectPtr {
        self
    }
}
