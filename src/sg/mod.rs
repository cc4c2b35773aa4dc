//! Scene graph built on top of the parser's object model.
//!
//! A [`Scene`] owns a tree of [`Node`]s. Nodes carry a transform, shapes and
//! uniform blocks, and cache their model matrix and bounds. Changes travel
//! upward through observer links so ancestors drop stale caches. The
//! [`Intersector`] answers closest-hit ray queries and the [`Reader`] loads
//! scene files, reusing them while nothing on disk has changed.

pub mod file_map;
pub mod intersector;
pub mod math;
pub mod node;
pub mod reader;
pub mod registration;
pub mod scene;
pub mod search;
pub mod shape;
pub mod uniform_block;

pub use crate::parser::Change;
pub use file_map::{FileMap, Image};
pub use intersector::{Hit, Intersector};
pub use math::{Bounds, BoundsHit, Face, Ray};
pub use node::{Node, NodeFlag, NodeFlags};
pub use reader::Reader;
pub use registration::register_scene_types;
pub use scene::Scene;
pub use search::{
    find_node_in_scene, find_node_path, find_node_path_by_name, find_node_path_in_scene,
    find_node_paths, find_node_under_node, find_nodes, find_shape_in_node, find_unique_nodes,
};
pub use shape::{
    shape_interface, BoxShape, Ellipsoid, PlaneNormal, Rectangle, Shape, ShapeHit, Triangles,
};
pub use uniform_block::UniformBlock;
