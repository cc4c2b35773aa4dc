use super::node::Node;
use super::scene::Scene;
use super::shape::{BoxShape, Ellipsoid, Rectangle, Triangles};
use super::uniform_block::UniformBlock;
use crate::error::RegistryError;
use crate::parser::Registry;

/// Registers every scene-graph type under the name used in scene files.
pub fn register_scene_types(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.add_type::<Scene>("Scene")?;
    registry.add_type::<Node>("Node")?;
    registry.add_type::<UniformBlock>("UniformBlock")?;
    registry.add_type::<BoxShape>("Box")?;
    registry.add_type::<Ellipsoid>("Ellipsoid")?;
    registry.add_type::<Rectangle>("Rectangle")?;
    registry.add_type::<Triangles>("Triangles")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_types_once() {
        let mut registry = Registry::new();
        register_scene_types(&mut registry).unwrap();
        assert_eq!(
            registry.type_names(),
            vec!["Box", "Ellipsoid", "Node", "Rectangle", "Scene", "Triangles", "UniformBlock"]
        );
        assert_eq!(
            register_scene_types(&mut registry),
            Err(RegistryError::DuplicateType("Scene".to_string()))
        );
    }
}
