//! Closest-hit ray queries over a node graph.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use log::trace;

use super::math::Ray;
use super::node::{Node, NodeFlag};
use super::scene::Scene;
use super::shape::{Shape, ShapeHit};
use crate::parser::ObjectExt;

/// Result of a ray query. A miss has an empty path.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Nodes from the queried root down to the node that was hit.
    pub path: Vec<Arc<Node>>,
    pub world_ray: Ray,
    /// Parametric distance along `world_ray`.
    pub distance: f32,
    /// Hit point in the hit node's object space.
    pub point: Vec3,
    /// Surface normal in the hit node's object space.
    pub normal: Vec3,
    /// Shape that was hit; `None` for bounds hits.
    pub shape: Option<Arc<dyn Shape>>,
    /// Object-to-world matrix of the hit node.
    pub world_matrix: Mat4,
}

impl Hit {
    pub fn miss(world_ray: Ray) -> Self {
        Self {
            path: Vec::new(),
            world_ray,
            distance: f32::INFINITY,
            point: Vec3::ZERO,
            normal: Vec3::ZERO,
            shape: None,
            world_matrix: Mat4::IDENTITY,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn node(&self) -> Option<&Arc<Node>> {
        self.path.last()
    }

    pub fn world_point(&self) -> Vec3 {
        self.world_matrix.transform_point3(self.point)
    }

    pub fn world_normal(&self) -> Vec3 {
        self.world_matrix
            .inverse()
            .transpose()
            .transform_vector3(self.normal)
            .normalize_or_zero()
    }

    /// Names of the nodes on the path, root first.
    pub fn path_names(&self) -> Vec<String> {
        self.path.iter().map(|node| node.name()).collect()
    }
}

/// Depth-first closest-hit search. Subtrees whose bounds are missed, or
/// entered beyond the closest hit found so far, are skipped.
pub struct Intersector {
    bounds_only: bool,
    path: Vec<Arc<Node>>,
    best: Hit,
}

impl Intersector {
    pub fn intersect_scene(scene: &Scene, ray: &Ray) -> Hit {
        match scene.root_node() {
            Some(root) => Self::intersect_graph(&root, ray, false),
            None => Hit::miss(*ray),
        }
    }

    /// Intersects the graph rooted at `root`. With `bounds_only`, every node
    /// acts as its own bounds proxy.
    pub fn intersect_graph(root: &Arc<Node>, ray: &Ray, bounds_only: bool) -> Hit {
        let mut search = Self {
            bounds_only,
            path: Vec::new(),
            best: Hit::miss(*ray),
        };
        search.visit(root, &Mat4::IDENTITY);
        trace!(
            "Ray query from {} hit {:?} at {}",
            ray.origin,
            search.best.path_names(),
            search.best.distance
        );
        search.best
    }

    fn visit(&mut self, node: &Arc<Node>, parent_matrix: &Mat4) {
        if !node.is_enabled(NodeFlag::Traversal) || !node.is_enabled(NodeFlag::Intersect) {
            return;
        }
        let matrix = *parent_matrix * node.model_matrix();
        let determinant = matrix.determinant();
        if determinant == 0.0 || !determinant.is_finite() {
            return;
        }
        let local_ray = self.best.world_ray.transformed(&matrix.inverse());

        let Some(bounds_hit) = node.bounds().intersect_ray(&local_ray) else {
            return;
        };
        let entry = if bounds_hit.is_entry {
            bounds_hit.distance
        } else {
            0.0
        };
        if entry > self.best.distance {
            return;
        }

        self.path.push(Arc::clone(node));
        if self.bounds_only || node.use_bounds_proxy() {
            if bounds_hit.distance < self.best.distance {
                // Placeholder normal; proxy hits only identify the node.
                let hit = ShapeHit {
                    distance: bounds_hit.distance,
                    point: local_ray.point_at(bounds_hit.distance),
                    normal: Vec3::Z,
                };
                self.record(hit, None, matrix);
            }
        } else {
            let mut closest: Option<(ShapeHit, Arc<dyn Shape>)> = None;
            for shape in node.shapes() {
                if let Some(hit) = shape.intersect_ray(&local_ray) {
                    if closest.as_ref().map_or(true, |(best, _)| hit.distance < best.distance) {
                        closest = Some((hit, shape));
                    }
                }
            }
            if let Some((hit, shape)) = closest {
                if hit.distance < self.best.distance {
                    self.record(hit, Some(shape), matrix);
                }
            }
            for child in node.children() {
                self.visit(&child, &matrix);
            }
        }
        self.path.pop();
    }

    fn record(&mut self, hit: ShapeHit, shape: Option<Arc<dyn Shape>>, world_matrix: Mat4) {
        self.best = Hit {
            path: self.path.clone(),
            world_ray: self.best.world_ray,
            distance: hit.distance,
            point: hit.point,
            normal: hit.normal,
            shape,
            world_matrix,
        };
    }
}
