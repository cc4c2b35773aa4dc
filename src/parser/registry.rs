use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use super::object::{downcast, Object, ObjectPtr};
use crate::error::RegistryError;

/// Name and factory of one registered object type.
pub struct TypeInfo {
    type_name: String,
    factory: fn() -> ObjectPtr,
}

impl TypeInfo {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Creates a new, incomplete instance with type information and name
    /// filled in.
    pub(crate) fn instantiate(info: &Arc<Self>, name: &str) -> ObjectPtr {
        let obj = (info.factory)();
        obj.base().init(Arc::clone(info), Arc::downgrade(&obj), name);
        obj
    }
}

fn make<T: Object + Default>() -> ObjectPtr {
    Arc::new(T::default())
}

/// Maps object type names to factories.
#[derive(Default)]
pub struct Registry {
    types: HashMap<String, Arc<TypeInfo>>,
    by_type_id: HashMap<TypeId, Arc<TypeInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a concrete object type under the given name.
    pub fn add_type<T: Object + Default>(&mut self, type_name: &str) -> Result<(), RegistryError> {
        if self.types.contains_key(type_name) || self.by_type_id.contains_key(&TypeId::of::<T>()) {
            return Err(RegistryError::DuplicateType(type_name.to_string()));
        }
        let info = Arc::new(TypeInfo {
            type_name: type_name.to_string(),
            factory: make::<T>,
        });
        self.types.insert(type_name.to_string(), Arc::clone(&info));
        self.by_type_id.insert(TypeId::of::<T>(), info);
        Ok(())
    }

    /// Creates a complete object of the named type.
    pub fn create_object_of_type(
        &self,
        type_name: &str,
        name: &str,
    ) -> Result<ObjectPtr, RegistryError> {
        let obj = self.create_for_parsing(type_name, name)?;
        obj.base().set_complete();
        obj.creation_done();
        Ok(obj)
    }

    /// Creates a complete object of a registered concrete type.
    pub fn create_object<T: Object>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        let info = self
            .by_type_id
            .get(&TypeId::of::<T>())
            .ok_or_else(|| RegistryError::UnknownType(std::any::type_name::<T>().to_string()))?;
        let obj = TypeInfo::instantiate(info, name);
        obj.base().set_complete();
        obj.creation_done();
        downcast::<T>(&obj).ok_or_else(|| RegistryError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            actual: info.type_name().to_string(),
        })
    }

    /// Creates an object whose construction the parser will complete.
    pub(crate) fn create_for_parsing(
        &self,
        type_name: &str,
        name: &str,
    ) -> Result<ObjectPtr, RegistryError> {
        self.types
            .get(type_name)
            .map(|info| TypeInfo::instantiate(info, name))
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))
    }

    /// Returns the registered type names in sorted order.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::object::{ObjectBase, ObjectExt};
    use crate::parser::Field;

    #[derive(Default)]
    struct Empty {
        base: ObjectBase,
    }

    impl Object for Empty {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        fn add_fields<'a>(&'a self, _fields: &mut Vec<&'a dyn Field>) {}
    }

    #[derive(Default)]
    struct Other {
        base: ObjectBase,
    }

    impl Object for Other {
        fn base(&self) -> &ObjectBase {
            &self.base
        }

        fn add_fields<'a>(&'a self, _fields: &mut Vec<&'a dyn Field>) {}
    }

    #[test]
    fn creates_registered_types() {
        let mut registry = Registry::new();
        registry.add_type::<Empty>("Empty").unwrap();
        let obj = registry.create_object_of_type("Empty", "E").unwrap();
        assert_eq!(obj.type_name(), "Empty");
        assert_eq!(obj.name(), "E");
        assert!(obj.base().is_complete());
        assert!(downcast::<Empty>(&obj).is_some());
        assert!(downcast::<Other>(&obj).is_none());
    }

    #[test]
    fn rejects_unknown_and_duplicate_types() {
        let mut registry = Registry::new();
        registry.add_type::<Empty>("Empty").unwrap();
        assert_eq!(
            registry.add_type::<Empty>("Empty"),
            Err(RegistryError::DuplicateType("Empty".into()))
        );
        assert!(registry.add_type::<Empty>("Alias").is_err());
        assert!(matches!(
            registry.create_object_of_type("Missing", ""),
            Err(RegistryError::UnknownType(name)) if name == "Missing"
        ));
        assert!(registry.create_object::<Other>("x").is_err());
    }

    #[test]
    fn lists_type_names() {
        let mut registry = Registry::new();
        registry.add_type::<Other>("Zeta").unwrap();
        registry.add_type::<Empty>("Alpha").unwrap();
        assert_eq!(registry.type_names(), vec!["Alpha", "Zeta"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
