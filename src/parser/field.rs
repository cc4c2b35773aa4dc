use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::object::{CloneMap, ObjectCast, ObjectExt, ObjectPtr};
use super::scanner::Scanner;
use super::value::FieldValue;
use super::writer::Writer;
use crate::error::ParseError;

/// Parsing services a field needs to read its value. Implemented by the
/// [`Parser`](super::Parser) so that object-valued fields can recurse into
/// the full object grammar.
pub trait ValueScanner {
    fn scanner(&mut self) -> &mut Scanner;
    fn scan_object(&mut self) -> Result<ObjectPtr, ParseError>;
    fn scan_object_list(&mut self) -> Result<Vec<ObjectPtr>, ParseError>;
}

/// A named, typed slot on an object.
pub trait Field: Send + Sync {
    fn name(&self) -> &str;

    /// Returns true if the value was parsed or assigned explicitly.
    fn was_set(&self) -> bool;

    /// Reads the value following `name:` and marks the field as set.
    fn parse_value(&self, scanner: &mut dyn ValueScanner) -> Result<(), ParseError>;

    fn write_value(&self, writer: &mut Writer);

    /// Nested objects held by the field, in order.
    fn objects(&self) -> Vec<ObjectPtr> {
        Vec::new()
    }

    /// Copies the value and set state from a field of the same type. With
    /// `deep`, nested objects are cloned through the map instead of shared.
    fn copy_from(&self, other: &dyn Field, deep: Option<&mut CloneMap>);

    fn as_any(&self) -> &dyn Any;
}

/// Single value of a scalar, vector, color, rotation or enum type.
pub struct TField<T: FieldValue> {
    name: &'static str,
    value: RwLock<T>,
    was_set: AtomicBool,
}

impl<T: FieldValue> TField<T> {
    pub fn new(name: &'static str, default: T) -> Self {
        Self {
            name,
            value: RwLock::new(default),
            was_set: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.was_set.store(true, Ordering::Release);
    }
}

impl<T: FieldValue> Field for TField<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn was_set(&self) -> bool {
        self.was_set.load(Ordering::Acquire)
    }

    fn parse_value(&self, scanner: &mut dyn ValueScanner) -> Result<(), ParseError> {
        let value = T::parse(scanner.scanner())?;
        self.set(value);
        Ok(())
    }

    fn write_value(&self, writer: &mut Writer) {
        writer.write_raw(&self.get().to_text());
    }

    fn copy_from(&self, other: &dyn Field, _deep: Option<&mut CloneMap>) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            *self.value.write() = other.get();
            self.was_set.store(other.was_set(), Ordering::Release);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Bracketed list of values: `[a, b, c]`. Parsing replaces the contents.
pub struct VField<T: FieldValue> {
    name: &'static str,
    values: RwLock<Vec<T>>,
    was_set: AtomicBool,
}

impl<T: FieldValue> VField<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: RwLock::new(Vec::new()),
            was_set: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Vec<T> {
        self.values.read().clone()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn set(&self, values: Vec<T>) {
        *self.values.write() = values;
        self.was_set.store(true, Ordering::Release);
    }
}

impl<T: FieldValue> Field for VField<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn was_set(&self) -> bool {
        self.was_set.load(Ordering::Acquire)
    }

    fn parse_value(&self, scanner: &mut dyn ValueScanner) -> Result<(), ParseError> {
        let scanner = scanner.scanner();
        scanner.scan_expected_char('[')?;
        let mut values = Vec::new();
        while scanner.peek_char()? != Some(']') {
            values.push(T::parse(scanner)?);
            if scanner.peek_char()? == Some(',') {
                scanner.scan_expected_char(',')?;
            }
        }
        scanner.scan_expected_char(']')?;
        self.set(values);
        Ok(())
    }

    fn write_value(&self, writer: &mut Writer) {
        let items: Vec<String> = self.values.read().iter().map(FieldValue::to_text).collect();
        writer.write_raw(&format!("[{}]", items.join(", ")));
    }

    fn copy_from(&self, other: &dyn Field, _deep: Option<&mut CloneMap>) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            *self.values.write() = other.get();
            self.was_set.store(other.was_set(), Ordering::Release);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn clone_nested<T: ?Sized + ObjectCast>(value: Arc<T>, deep: Option<&mut CloneMap>) -> Arc<T> {
    match deep {
        Some(clones) => {
            let clone = clones.clone_of(&T::upcast(Arc::clone(&value)));
            T::cast(clone).unwrap_or(value)
        }
        None => value,
    }
}

fn cast_or_error<T: ?Sized + ObjectCast>(
    scanner: &mut dyn ValueScanner,
    obj: ObjectPtr,
    field_name: &str,
) -> Result<Arc<T>, ParseError> {
    let type_name = obj.type_name().to_string();
    T::cast(obj).ok_or_else(|| {
        scanner
            .scanner()
            .error(format!("Incorrect object type '{type_name}' for field '{field_name}'"))
    })
}

/// A single nested object.
pub struct ObjectField<T: ?Sized + ObjectCast> {
    name: &'static str,
    value: RwLock<Option<Arc<T>>>,
    was_set: AtomicBool,
}

impl<T: ?Sized + ObjectCast> ObjectField<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: RwLock::new(None),
            was_set: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.read().clone()
    }

    pub fn set(&self, value: Option<Arc<T>>) {
        let is_set = value.is_some();
        *self.value.write() = value;
        self.was_set.store(is_set, Ordering::Release);
    }
}

impl<T: ?Sized + ObjectCast + 'static> Field for ObjectField<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn was_set(&self) -> bool {
        self.was_set.load(Ordering::Acquire)
    }

    fn parse_value(&self, scanner: &mut dyn ValueScanner) -> Result<(), ParseError> {
        let obj = scanner.scan_object()?;
        let value = cast_or_error::<T>(scanner, obj, self.name)?;
        self.set(Some(value));
        Ok(())
    }

    fn write_value(&self, writer: &mut Writer) {
        if let Some(value) = self.get() {
            writer.write_object(&*T::upcast(value));
        }
    }

    fn objects(&self) -> Vec<ObjectPtr> {
        self.get().into_iter().map(T::upcast).collect()
    }

    fn copy_from(&self, other: &dyn Field, deep: Option<&mut CloneMap>) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let value = other.get().map(|v| clone_nested(v, deep));
            *self.value.write() = value;
            self.was_set.store(other.was_set(), Ordering::Release);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An ordered list of nested objects.
pub struct ObjectListField<T: ?Sized + ObjectCast> {
    name: &'static str,
    values: RwLock<Vec<Arc<T>>>,
    was_set: AtomicBool,
}

impl<T: ?Sized + ObjectCast> ObjectListField<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: RwLock::new(Vec::new()),
            was_set: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Vec<Arc<T>> {
        self.values.read().clone()
    }

    pub fn get_at(&self, index: usize) -> Option<Arc<T>> {
        self.values.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Returns the index of the first element that is `value`.
    pub fn position(&self, value: &Arc<T>) -> Option<usize> {
        self.values
            .read()
            .iter()
            .position(|existing| Arc::ptr_eq(existing, value))
    }

    /// Returns how many times `value` appears in the list.
    pub fn count_of(&self, value: &Arc<T>) -> usize {
        self.values
            .read()
            .iter()
            .filter(|existing| Arc::ptr_eq(existing, value))
            .count()
    }

    pub fn set(&self, values: Vec<Arc<T>>) {
        *self.values.write() = values;
        self.was_set.store(true, Ordering::Release);
    }

    pub fn add(&self, value: Arc<T>) {
        self.values.write().push(value);
        self.was_set.store(true, Ordering::Release);
    }

    /// Inserts at `index`, appending if the index is past the end.
    pub fn insert(&self, index: usize, value: Arc<T>) {
        let mut values = self.values.write();
        let index = index.min(values.len());
        values.insert(index, value);
        self.was_set.store(true, Ordering::Release);
    }

    pub fn remove_at(&self, index: usize) -> Option<Arc<T>> {
        let mut values = self.values.write();
        (index < values.len()).then(|| values.remove(index))
    }

    /// Replaces the element at `index`, returning the old one.
    pub fn replace(&self, index: usize, value: Arc<T>) -> Option<Arc<T>> {
        let mut values = self.values.write();
        let slot = values.get_mut(index)?;
        Some(std::mem::replace(slot, value))
    }

    /// Removes every element, returning the old contents.
    pub fn clear(&self) -> Vec<Arc<T>> {
        std::mem::take(&mut *self.values.write())
    }
}

impl<T: ?Sized + ObjectCast + 'static> Field for ObjectListField<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn was_set(&self) -> bool {
        self.was_set.load(Ordering::Acquire)
    }

    fn parse_value(&self, scanner: &mut dyn ValueScanner) -> Result<(), ParseError> {
        let objects = scanner.scan_object_list()?;
        let values = objects
            .into_iter()
            .map(|obj| cast_or_error::<T>(scanner, obj, self.name))
            .collect::<Result<Vec<_>, _>>()?;
        self.set(values);
        Ok(())
    }

    fn write_value(&self, writer: &mut Writer) {
        let objects: Vec<ObjectPtr> = self.get().into_iter().map(T::upcast).collect();
        writer.write_object_list(&objects);
    }

    fn objects(&self) -> Vec<ObjectPtr> {
        self.get().into_iter().map(T::upcast).collect()
    }

    fn copy_from(&self, other: &dyn Field, mut deep: Option<&mut CloneMap>) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let values = other
                .get()
                .into_iter()
                .map(|v| clone_nested(v, deep.as_deref_mut()))
                .collect();
            *self.values.write() = values;
            self.was_set.store(other.was_set(), Ordering::Release);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TextOnly {
        scanner: Scanner,
    }

    impl TextOnly {
        fn new(text: &str) -> Self {
            let mut scanner = Scanner::new(Box::new(|_| None));
            scanner.push_string_input(text);
            Self { scanner }
        }
    }

    impl ValueScanner for TextOnly {
        fn scanner(&mut self) -> &mut Scanner {
            &mut self.scanner
        }

        fn scan_object(&mut self) -> Result<ObjectPtr, ParseError> {
            Err(self.scanner.error("objects not supported"))
        }

        fn scan_object_list(&mut self) -> Result<Vec<ObjectPtr>, ParseError> {
            Err(self.scanner.error("objects not supported"))
        }
    }

    #[test]
    fn scalar_field_tracks_set_state() {
        let field = TField::new("size", 2.0_f32);
        assert!(!field.was_set());
        assert_eq!(field.get(), 2.0);
        field.parse_value(&mut TextOnly::new("4.5")).unwrap();
        assert!(field.was_set());
        assert_eq!(field.get(), 4.5);
    }

    #[test]
    fn vector_field_parses_brackets_and_trailing_comma() {
        let field: VField<u32> = VField::new("indices");
        field.parse_value(&mut TextOnly::new("[0, 1 2, 0x3,]")).unwrap();
        assert_eq!(field.get(), vec![0, 1, 2, 3]);
        field.parse_value(&mut TextOnly::new("[]")).unwrap();
        assert!(field.is_empty());
        assert!(field.was_set());
    }

    #[test]
    fn copy_from_matches_type_and_set_state() {
        let src = TField::new("name", String::from("a"));
        src.set("b".into());
        let dst = TField::new("name", String::new());
        dst.copy_from(&src, None);
        assert_eq!(dst.get(), "b");
        assert!(dst.was_set());

        let mismatched = TField::new("name", 3_i32);
        mismatched.copy_from(&src, None);
        assert_eq!(mismatched.get(), 3);
        assert!(!mismatched.was_set());
    }
}
