use std::collections::HashMap;

use super::field::Field;
use super::object::{object_addr, Object, ObjectExt, ObjectPtr};
use super::value::quote;

const INDENT: &str = "  ";

/// Serializes an object graph back to the text format.
///
/// Only fields that were explicitly set are written. A named object reached
/// more than once is written in full once and as `USE "name"` wherever that
/// name resolves to it under the parser's scoping rules, so shared instances
/// stay shared when the output is parsed again. Object-valued fields holding
/// shared objects are written ahead of other object-valued fields, which
/// keeps definitions in scope for later references. A reference that still
/// falls outside its definition's scope is written as a full copy.
#[derive(Default)]
pub struct Writer {
    out: String,
    depth: usize,
    /// Names visible at each open object body, outermost first.
    scopes: Vec<HashMap<String, usize>>,
    /// How often each named object is reached from the root.
    references: HashMap<usize, usize>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a complete graph rooted at `obj` and returns the text.
    pub fn write_to_string(obj: &dyn Object) -> String {
        let mut writer = Self::new();
        writer.count_references(obj);
        writer.scopes.push(HashMap::new());
        writer.write_object(obj);
        writer.out.push('\n');
        writer.finish()
    }

    pub fn finish(self) -> String {
        self.out
    }

    pub fn write_raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn write_object(&mut self, obj: &dyn Object) {
        let name = obj.name();
        let addr = object_addr(obj) as usize;
        if !name.is_empty() && self.resolve(&name) == Some(addr) {
            self.out.push_str("USE ");
            self.out.push_str(&quote(&name));
            return;
        }

        self.out.push_str(obj.type_name());
        if !name.is_empty() {
            self.out.push(' ');
            self.out.push_str(&quote(&name));
        }
        self.out.push_str(" {\n");
        self.depth += 1;
        self.scopes.push(HashMap::new());
        for field in self.ordered_fields(obj) {
            self.write_indent();
            self.out.push_str(field.name());
            self.out.push_str(": ");
            field.write_value(self);
            self.out.push_str(",\n");
        }
        self.scopes.pop();
        self.depth -= 1;
        self.write_indent();
        self.out.push('}');

        // Visible to the rest of the enclosing body, not to its own.
        if !name.is_empty() {
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(name, addr);
            }
        }
    }

    pub fn write_object_list(&mut self, objects: &[ObjectPtr]) {
        if objects.is_empty() {
            self.out.push_str("[]");
            return;
        }
        self.out.push_str("[\n");
        self.depth += 1;
        for obj in objects {
            self.write_indent();
            self.write_object(&**obj);
            self.out.push_str(",\n");
        }
        self.depth -= 1;
        self.write_indent();
        self.out.push(']');
    }

    /// Returns the object a `USE` of `name` would find at this point.
    fn resolve(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn count_references(&mut self, obj: &dyn Object) {
        if !obj.name().is_empty() {
            let count = self.references.entry(object_addr(obj) as usize).or_insert(0);
            *count += 1;
            if *count > 1 {
                return;
            }
        }
        for field in obj.fields().into_iter().filter(|field| field.was_set()) {
            for child in field.objects() {
                self.count_references(&*child);
            }
        }
    }

    /// Set fields in declaration order, except that object-valued fields
    /// directly holding shared objects move ahead of the other object-valued
    /// fields. Value fields keep their positions.
    fn ordered_fields<'a>(&self, obj: &'a dyn Object) -> Vec<&'a dyn Field> {
        let mut fields: Vec<&dyn Field> = obj
            .fields()
            .into_iter()
            .filter(|field| field.was_set())
            .collect();
        let slots: Vec<usize> = (0..fields.len())
            .filter(|&index| !fields[index].objects().is_empty())
            .collect();
        let mut object_fields: Vec<&dyn Field> = slots.iter().map(|&index| fields[index]).collect();
        object_fields.sort_by_key(|field| !self.holds_shared(*field));
        for (slot, field) in slots.into_iter().zip(object_fields) {
            fields[slot] = field;
        }
        fields
    }

    fn holds_shared(&self, field: &dyn Field) -> bool {
        field.objects().iter().any(|obj| {
            !obj.name().is_empty()
                && self
                    .references
                    .get(&(object_addr(&**obj) as usize))
                    .is_some_and(|&count| count > 1)
        })
    }

    fn write_indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }
}
