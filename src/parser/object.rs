use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use log::warn;
use parking_lot::{Mutex, RwLock};

use super::change::Change;
use super::field::Field;
use super::registry::TypeInfo;

/// Shared handle to any parsed object.
pub type ObjectPtr = Arc<dyn Object>;

/// Lifecycle role of an object. The three roles are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Regular,
    Template,
    Clone,
}

/// Upcasting helpers used for downcasting trait objects to concrete types.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A typed, optionally named record with an ordered list of fields.
///
/// Concrete types embed an [`ObjectBase`] and declare their fields in
/// [`Object::add_fields`]. Instances are created through a
/// [`Registry`](super::Registry), which fills in the type information.
pub trait Object: AsAny {
    fn base(&self) -> &ObjectBase;

    /// Appends every field of the object, in declaration order.
    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>);

    /// Checks type-specific invariants after parsing. Templates are never
    /// validated.
    fn is_valid(&self) -> Result<(), String> {
        Ok(())
    }

    /// Called once the object is fully constructed.
    fn creation_done(&self) {}

    /// Handles a change originating at `origin` (possibly this object) and
    /// forwards it to observers. Returns false if notification is disabled.
    fn process_change(&self, change: Change, origin: &dyn Object) -> bool {
        self.base().propagate_change(change, origin)
    }

    /// Returns the object as another trait-object handle if it implements
    /// that interface. `interface` is the `TypeId` of the requested handle
    /// type, for example `Arc<dyn Shape>`, and the box holds that handle.
    fn query_interface(
        self: Arc<Self>,
        _interface: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        None
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.type_name(), self.name())
    }
}

/// State shared by every object: identity, lifecycle and observers.
pub struct ObjectBase {
    type_info: OnceLock<Arc<TypeInfo>>,
    self_ref: OnceLock<Weak<dyn Object>>,
    name: RwLock<String>,
    lifecycle: RwLock<Lifecycle>,
    complete: AtomicBool,
    notify_enabled: AtomicBool,
    observers: Mutex<Vec<Weak<dyn Object>>>,
}

impl Default for ObjectBase {
    fn default() -> Self {
        Self {
            type_info: OnceLock::new(),
            self_ref: OnceLock::new(),
            name: RwLock::new(String::new()),
            lifecycle: RwLock::new(Lifecycle::Regular),
            complete: AtomicBool::new(false),
            notify_enabled: AtomicBool::new(true),
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl ObjectBase {
    pub(crate) fn init(&self, info: Arc<TypeInfo>, self_ref: Weak<dyn Object>, name: &str) {
        let first = self.type_info.set(info).is_ok() && self.self_ref.set(self_ref).is_ok();
        debug_assert!(first, "object initialized twice");
        *self.name.write() = name.to_string();
    }

    pub(crate) fn type_info(&self) -> Option<&Arc<TypeInfo>> {
        self.type_info.get()
    }

    /// Returns a strong handle to the object owning this base, if it was
    /// created by a registry and is still alive.
    pub fn self_ptr(&self) -> Option<ObjectPtr> {
        self.self_ref.get().and_then(Weak::upgrade)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.write() = lifecycle;
    }

    pub fn is_template(&self) -> bool {
        self.lifecycle() == Lifecycle::Template
    }

    pub fn is_clone(&self) -> bool {
        self.lifecycle() == Lifecycle::Clone
    }

    /// Returns true once construction (parsing or cloning) has finished.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn set_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_notify_enabled(&self) -> bool {
        self.notify_enabled.load(Ordering::Acquire)
    }

    /// Enables or disables forwarding of changes to observers.
    pub fn set_notify_enabled(&self, enabled: bool) {
        self.notify_enabled.store(enabled, Ordering::Release);
    }

    /// Forwards a change to every live observer. Returns false without
    /// notifying anyone if notification is disabled.
    pub fn propagate_change(&self, change: Change, origin: &dyn Object) -> bool {
        if !self.is_notify_enabled() {
            return false;
        }
        let observers: Vec<ObjectPtr> = {
            let mut list = self.observers.lock();
            list.retain(|observer| observer.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.process_change(change, origin);
        }
        true
    }

    /// Returns the number of registered observers that are still alive.
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .iter()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }

    fn add_observer(&self, observer: Weak<dyn Object>) {
        let mut list = self.observers.lock();
        let addr = observer.as_ptr() as *const ();
        if !list.iter().any(|existing| existing.as_ptr() as *const () == addr) {
            list.push(observer);
        }
    }

    pub(crate) fn remove_observer_at(&self, addr: *const ()) {
        self.observers
            .lock()
            .retain(|existing| existing.as_ptr() as *const () != addr);
    }

    fn has_observer_at(&self, addr: *const ()) -> bool {
        self.observers
            .lock()
            .iter()
            .any(|existing| existing.as_ptr() as *const () == addr)
    }
}

/// Returns the data address of an object, ignoring vtable metadata.
pub fn object_addr(obj: &dyn Object) -> *const () {
    obj as *const _ as *const ()
}

/// Operations available on every object.
pub trait ObjectExt: Object {
    /// Returns the registered type name.
    fn type_name(&self) -> &str {
        self.base()
            .type_info()
            .map(|info| info.type_name())
            .unwrap_or("<unregistered>")
    }

    /// Returns the instance name, which may be empty.
    fn name(&self) -> String {
        self.base().name.read().clone()
    }

    fn set_name(&self, name: &str) {
        *self.base().name.write() = name.to_string();
    }

    fn fields(&self) -> Vec<&dyn Field> {
        let mut fields = Vec::new();
        self.add_fields(&mut fields);
        fields
    }

    fn find_field(&self, name: &str) -> Option<&dyn Field> {
        self.fields().into_iter().find(|field| field.name() == name)
    }

    fn was_any_field_set(&self) -> bool {
        self.fields().iter().any(|field| field.was_set())
    }

    /// Creates a new object of the same type with copied field values. Deep
    /// clones recursively clone nested objects; shallow clones share them.
    /// A complete clone has `creation_done` invoked on it.
    fn clone_object(&self, name: &str, is_deep: bool, is_complete: bool) -> ObjectPtr {
        let mut clones = CloneMap::default();
        self.clone_object_with(name, is_deep.then_some(&mut clones), is_complete)
    }

    /// Same as [`clone_object`](ObjectExt::clone_object). A deep clone
    /// records nested clones in `deep`, so an object reached more than once
    /// is cloned once and stays shared in the copy.
    fn clone_object_with(
        &self,
        name: &str,
        deep: Option<&mut CloneMap>,
        is_complete: bool,
    ) -> ObjectPtr {
        let info = self
            .base()
            .type_info()
            .cloned()
            .unwrap_or_else(|| panic!("cannot clone unregistered object '{}'", self.name()));
        let clone = TypeInfo::instantiate(&info, name);
        clone.copy_contents_with(self.as_dyn(), deep);
        clone.base().set_lifecycle(Lifecycle::Clone);
        if is_complete {
            clone.base().set_complete();
            clone.creation_done();
        }
        clone
    }

    /// Copies every field value from an object of the same type.
    fn copy_contents_from(&self, other: &dyn Object, is_deep: bool) {
        let mut clones = CloneMap::default();
        self.copy_contents_with(other, is_deep.then_some(&mut clones));
    }

    fn copy_contents_with(&self, other: &dyn Object, mut deep: Option<&mut CloneMap>) {
        assert_eq!(
            self.type_name(),
            other.type_name(),
            "copying contents between different object types"
        );
        let dst = self.fields();
        let src = other.fields();
        assert_eq!(dst.len(), src.len(), "field lists differ in shape");
        for (dst, src) in dst.iter().zip(src.iter()) {
            dst.copy_from(*src, deep.as_deref_mut());
        }
    }

    /// Registers this object to receive changes from `other`.
    fn observe(&self, other: &dyn Object) {
        match self.base().self_ref.get() {
            Some(weak) => other.base().add_observer(weak.clone()),
            None => warn!(
                "Unregistered {} object cannot observe {} '{}'",
                self.type_name(),
                other.type_name(),
                other.name()
            ),
        }
    }

    fn unobserve(&self, other: &dyn Object) {
        other.base().remove_observer_at(object_addr(self.as_dyn()));
    }

    fn is_observing(&self, other: &dyn Object) -> bool {
        other.base().has_observer_at(object_addr(self.as_dyn()))
    }

    #[doc(hidden)]
    fn as_dyn(&self) -> &dyn Object;
}

impl<T: Object> ObjectExt for T {
    fn as_dyn(&self) -> &dyn Object {
        self
    }
}

impl ObjectExt for dyn Object {
    fn as_dyn(&self) -> &dyn Object {
        self
    }
}

/// Clones made during one deep copy, keyed by source object.
#[derive(Default)]
pub struct CloneMap {
    clones: HashMap<usize, ObjectPtr>,
}

impl CloneMap {
    /// Returns the deep clone of `obj`, creating it on first request. The
    /// clone keeps the source's name and is complete.
    pub fn clone_of(&mut self, obj: &ObjectPtr) -> ObjectPtr {
        let addr = object_addr(&**obj) as usize;
        if let Some(existing) = self.clones.get(&addr) {
            return Arc::clone(existing);
        }
        let clone = obj.clone_object_with(&obj.name(), Some(&mut *self), true);
        self.clones.insert(addr, Arc::clone(&clone));
        clone
    }
}

/// Downcasts a shared object handle to a concrete type.
pub fn downcast<T: Object>(obj: &ObjectPtr) -> Option<Arc<T>> {
    Arc::clone(obj).into_any().downcast::<T>().ok()
}

/// Conversion between generic object handles and the handle type stored in
/// an object-valued field.
pub trait ObjectCast: Send + Sync {
    fn cast(obj: ObjectPtr) -> Option<Arc<Self>>;
    fn upcast(this: Arc<Self>) -> ObjectPtr;
}

impl ObjectCast for dyn Object {
    fn cast(obj: ObjectPtr) -> Option<Arc<Self>> {
        Some(obj)
    }

    fn upcast(this: Arc<Self>) -> ObjectPtr {
        this
    }
}
