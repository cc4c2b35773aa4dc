//! Scene-description parser and scene-graph runtime.
//!
//! The crate reads a declarative text format into a graph of typed objects
//! and builds an observable scene graph on top of it: nodes with cached
//! transforms and bounds, primitive shapes, and closest-hit ray queries.
//! Rendering and windowing are kept outside of the crate so that the code
//! stays testable and easy to embed in headless tools.

pub mod error;
pub mod parser;
pub mod sg;

pub use error::{ParseError, RegistryError, SourceLocation};
pub use parser::{Object, ObjectExt, ObjectPtr, Parser, Registry, Writer};
pub use sg::{register_scene_types, Hit, Intersector, Node, Ray, Reader, Scene};
