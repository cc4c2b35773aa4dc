//! Recursive-descent parser for the scene-description text format.

mod change;
mod field;
mod object;
mod registry;
mod scanner;
mod value;
mod writer;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use log::debug;

pub use change::Change;
pub use field::{Field, ObjectField, ObjectListField, TField, VField, ValueScanner};
pub use object::{
    downcast, object_addr, AsAny, CloneMap, Lifecycle, Object, ObjectBase, ObjectCast, ObjectExt,
    ObjectPtr,
};
pub use registry::{Registry, TypeInfo};
pub use scanner::{ConstantLookup, Scanner};
pub use value::{quote, Color, FieldValue};
pub use writer::Writer;

use crate::error::{ParseError, SourceLocation};

/// One file inclusion found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// File containing the `< "path" >`; empty for string input.
    pub including_path: PathBuf,
    /// Resolved path of the included file.
    pub included_path: PathBuf,
}

#[derive(Default)]
struct Scope {
    constants: HashMap<String, String>,
    templates: HashMap<String, ObjectPtr>,
    objects: HashMap<String, ObjectPtr>,
}

/// Builds object graphs from text using the types known to a [`Registry`].
pub struct Parser {
    registry: Arc<Registry>,
    scanner: Scanner,
    scopes: Rc<RefCell<Vec<Scope>>>,
    dependencies: Vec<Dependency>,
    template_depth: usize,
}

impl Parser {
    pub fn new(registry: Arc<Registry>) -> Self {
        let scopes: Rc<RefCell<Vec<Scope>>> = Rc::new(RefCell::new(Vec::new()));
        let lookup_scopes = Rc::clone(&scopes);
        let scanner = Scanner::new(Box::new(move |name| {
            lookup_scopes
                .borrow()
                .iter()
                .rev()
                .find_map(|scope| scope.constants.get(name).cloned())
        }));
        Self {
            registry,
            scanner,
            scopes,
            dependencies: Vec::new(),
            template_depth: 0,
        }
    }

    /// Parses the single object stored in a file.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<ObjectPtr, ParseError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            ParseError::new(
                SourceLocation::new(path.display().to_string(), 0),
                format!("Failed to open file '{}': {err}", path.display()),
            )
        })?;
        self.parse_source(path, &text)
    }

    /// Parses the single object in `text`.
    pub fn parse_from_string(&mut self, text: &str) -> Result<ObjectPtr, ParseError> {
        self.reset();
        self.scanner.push_string_input(text);
        self.parse_root()
    }

    /// Parses `text` that was already read from `path`. Relative includes
    /// are resolved against the directory of `path`.
    pub fn parse_source(&mut self, path: &Path, text: &str) -> Result<ObjectPtr, ParseError> {
        self.reset();
        self.scanner.push_input_file(path, text);
        self.parse_root()
    }

    /// Returns every inclusion seen by the last parse, in encounter order.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    fn reset(&mut self) {
        self.scanner.clear();
        self.scopes.borrow_mut().clear();
        self.dependencies.clear();
        self.template_depth = 0;
    }

    fn parse_root(&mut self) -> Result<ObjectPtr, ParseError> {
        debug!("Parsing {}", self.scanner.location().path);
        self.scopes.borrow_mut().push(Scope::default());
        let obj = self.parse_object_as(false)?;
        self.expect_end_of_input()?;
        self.scanner.pop_input_stream();
        self.scopes.borrow_mut().pop();
        debug!(
            "Parsed {} '{}' with {} include(s)",
            obj.type_name(),
            obj.name(),
            self.dependencies.len()
        );
        Ok(obj)
    }

    fn expect_end_of_input(&mut self) -> Result<(), ParseError> {
        match self.scanner.peek_char()? {
            None => Ok(()),
            Some(c) => Err(self
                .scanner
                .error(format!("Unexpected '{c}' after end of object"))),
        }
    }

    fn parse_object_as(&mut self, is_template: bool) -> Result<ObjectPtr, ParseError> {
        if self.scanner.peek_char()? == Some('<') {
            return self.parse_included_file(is_template);
        }
        let type_name = self.scanner.scan_name("object type")?;
        match type_name.as_str() {
            "USE" if is_template => {
                let name = self.scanner.scan_quoted_string()?;
                Err(self
                    .scanner
                    .error(format!("USE \"{name}\" cannot be a template")))
            }
            "USE" => self.parse_use(),
            "CLONE" => self.parse_clone(is_template),
            _ => self.parse_new_object(&type_name, is_template),
        }
    }

    fn parse_new_object(
        &mut self,
        type_name: &str,
        is_template: bool,
    ) -> Result<ObjectPtr, ParseError> {
        let name = self.scan_optional_name()?;
        let obj = self
            .registry
            .create_for_parsing(type_name, &name)
            .map_err(|err| self.scanner.error(err.to_string()))?;
        self.parse_object_body(&obj, is_template)?;
        Ok(obj)
    }

    fn parse_use(&mut self) -> Result<ObjectPtr, ParseError> {
        let name = self.scanner.scan_quoted_string()?;
        self.find_named_object(&name)
            .ok_or_else(|| self.scanner.error(format!("Object '{name}' not found for USE")))
    }

    fn parse_clone(&mut self, is_template: bool) -> Result<ObjectPtr, ParseError> {
        let source_name = self.scanner.scan_quoted_string()?;
        let new_name = self.scan_optional_name()?;
        let source = self.find_clone_source(&source_name).ok_or_else(|| {
            self.scanner
                .error(format!("Object '{source_name}' not found for CLONE"))
        })?;
        let obj = source.clone_object(&new_name, true, false);
        self.parse_object_body(&obj, is_template)?;
        Ok(obj)
    }

    fn parse_included_file(&mut self, is_template: bool) -> Result<ObjectPtr, ParseError> {
        self.scanner.scan_expected_char('<')?;
        let raw_path = self.scanner.scan_quoted_string()?;
        self.scanner.scan_expected_char('>')?;
        if raw_path.is_empty() {
            return Err(self.scanner.error("Invalid empty path for included file"));
        }

        let including_path = self.scanner.current_path().unwrap_or_default();
        let included_path = match including_path.parent() {
            Some(dir) => dir.join(&raw_path),
            None => PathBuf::from(&raw_path),
        };
        debug!(
            "Including {} from {}",
            included_path.display(),
            including_path.display()
        );
        self.dependencies.push(Dependency {
            including_path,
            included_path: included_path.clone(),
        });

        let text = fs::read_to_string(&included_path).map_err(|err| {
            self.scanner.error(format!(
                "Failed to open file '{}': {err}",
                included_path.display()
            ))
        })?;
        self.scanner.push_input_file(&included_path, &text);
        let obj = self.parse_object_as(is_template)?;
        self.expect_end_of_input()?;
        self.scanner.pop_input_stream();
        Ok(obj)
    }

    fn scan_optional_name(&mut self) -> Result<String, ParseError> {
        if self.scanner.peek_char()? == Some('"') {
            self.scanner.scan_quoted_string()
        } else {
            Ok(String::new())
        }
    }

    fn parse_object_body(&mut self, obj: &ObjectPtr, is_template: bool) -> Result<(), ParseError> {
        self.scanner.scan_expected_char('{')?;
        self.scopes.borrow_mut().push(Scope::default());
        self.parse_fields(obj)?;
        self.scanner.scan_expected_char('}')?;
        self.scopes.borrow_mut().pop();
        self.finish_object(obj, is_template)
    }

    fn finish_object(&mut self, obj: &ObjectPtr, is_template: bool) -> Result<(), ParseError> {
        let name = obj.name();
        if is_template {
            if name.is_empty() {
                return Err(self.scanner.error(format!(
                    "Template object of type '{}' must have a name",
                    obj.type_name()
                )));
            }
            obj.base().set_lifecycle(Lifecycle::Template);
            if let Some(scope) = self.scopes.borrow_mut().last_mut() {
                scope.templates.insert(name, Arc::clone(obj));
            }
            return Ok(());
        }

        if self.template_depth == 0 {
            obj.is_valid().map_err(|detail| {
                self.scanner.error(format!(
                    "Invalid {} object '{}': {detail}",
                    obj.type_name(),
                    name
                ))
            })?;
        }
        if !name.is_empty() {
            if let Some(scope) = self.scopes.borrow_mut().last_mut() {
                scope.objects.insert(name, Arc::clone(obj));
            }
        }
        if self.template_depth == 0 {
            obj.base().set_complete();
            obj.creation_done();
        }
        Ok(())
    }

    fn parse_fields(&mut self, obj: &ObjectPtr) -> Result<(), ParseError> {
        let fields = obj.fields();
        let mut seen_regular_field = false;
        while self.scanner.peek_char()? != Some('}') {
            let field_name = self.scanner.scan_name("field")?;
            self.scanner.scan_expected_char(':')?;
            match field_name.as_str() {
                "CONSTANTS" | "TEMPLATES" if seen_regular_field => {
                    return Err(self.scanner.error(format!(
                        "{field_name} appears after fields in object of type '{}'",
                        obj.type_name()
                    )));
                }
                "CONSTANTS" => self.parse_constants()?,
                "TEMPLATES" => self.parse_templates()?,
                _ => {
                    let field = fields
                        .iter()
                        .find(|field| field.name() == field_name)
                        .ok_or_else(|| {
                            self.scanner.error(format!(
                                "Unknown field '{field_name}' in object of type '{}'",
                                obj.type_name()
                            ))
                        })?;
                    field.parse_value(self)?;
                    seen_regular_field = true;
                }
            }

            match self.scanner.peek_char()? {
                Some(',') => self.scanner.scan_expected_char(',')?,
                Some('}') => {}
                Some(c) => {
                    return Err(self.scanner.error(format!("Expected ',' or '}}', got '{c}'")));
                }
                None => return Err(self.scanner.error("Expected ',' or '}', got EOF")),
            }
        }
        Ok(())
    }

    fn parse_constants(&mut self) -> Result<(), ParseError> {
        self.scanner.scan_expected_char('[')?;
        while self.scanner.peek_char()? != Some(']') {
            let name = self.scanner.scan_name("constant")?;
            self.scanner.scan_expected_char(':')?;
            let value = self.scanner.scan_quoted_string()?;
            if let Some(scope) = self.scopes.borrow_mut().last_mut() {
                scope.constants.insert(name, value);
            }
            if self.scanner.peek_char()? == Some(',') {
                self.scanner.scan_expected_char(',')?;
            }
        }
        self.scanner.scan_expected_char(']')
    }

    fn parse_templates(&mut self) -> Result<(), ParseError> {
        self.template_depth += 1;
        let result = self.parse_list(true);
        self.template_depth -= 1;
        result.map(|_| ())
    }

    fn parse_list(&mut self, is_template: bool) -> Result<Vec<ObjectPtr>, ParseError> {
        self.scanner.scan_expected_char('[')?;
        let mut objects = Vec::new();
        while self.scanner.peek_char()? != Some(']') {
            objects.push(self.parse_object_as(is_template)?);
            if self.scanner.peek_char()? == Some(',') {
                self.scanner.scan_expected_char(',')?;
            }
        }
        self.scanner.scan_expected_char(']')?;
        Ok(objects)
    }

    fn find_named_object(&self, name: &str) -> Option<ObjectPtr> {
        self.scopes
            .borrow()
            .iter()
            .rev()
            .find_map(|scope| scope.objects.get(name).cloned())
    }

    fn find_clone_source(&self, name: &str) -> Option<ObjectPtr> {
        self.scopes.borrow().iter().rev().find_map(|scope| {
            scope
                .templates
                .get(name)
                .or_else(|| scope.objects.get(name))
                .cloned()
        })
    }
}

impl ValueScanner for Parser {
    fn scanner(&mut self) -> &mut Scanner {
        &mut self.scanner
    }

    fn scan_object(&mut self) -> Result<ObjectPtr, ParseError> {
        self.parse_object_as(false)
    }

    fn scan_object_list(&mut self) -> Result<Vec<ObjectPtr>, ParseError> {
        self.parse_list(false)
    }
}
