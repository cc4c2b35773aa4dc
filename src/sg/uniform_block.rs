use std::sync::Arc;

use crate::parser::{
    downcast, Change, Color, Field, Object, ObjectBase, ObjectCast, ObjectPtr, TField,
};

/// Material values for one render pass. Changing them never affects bounds.
pub struct UniformBlock {
    base: ObjectBase,
    pass_name: TField<String>,
    base_color: TField<Color>,
    smoothness: TField<f32>,
    metalness: TField<f32>,
}

impl Default for UniformBlock {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            pass_name: TField::new("pass_name", String::new()),
            base_color: TField::new("base_color", Color::default()),
            smoothness: TField::new("smoothness", 0.0),
            metalness: TField::new("metalness", 0.0),
        }
    }
}

impl UniformBlock {
    pub fn pass_name(&self) -> String {
        self.pass_name.get()
    }

    pub fn base_color(&self) -> Color {
        self.base_color.get()
    }

    pub fn smoothness(&self) -> f32 {
        self.smoothness.get()
    }

    pub fn metalness(&self) -> f32 {
        self.metalness.get()
    }

    pub fn set_pass_name(&self, pass_name: &str) {
        self.pass_name.set(pass_name.to_string());
        self.process_change(Change::Appearance, self);
    }

    pub fn set_base_color(&self, color: Color) {
        self.base_color.set(color);
        self.process_change(Change::Appearance, self);
    }

    pub fn set_smoothness(&self, smoothness: f32) {
        self.smoothness.set(smoothness);
        self.process_change(Change::Appearance, self);
    }

    pub fn set_metalness(&self, metalness: f32) {
        self.metalness.set(metalness);
        self.process_change(Change::Appearance, self);
    }
}

impl Object for UniformBlock {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.pass_name);
        fields.push(&self.base_color);
        fields.push(&self.smoothness);
        fields.push(&self.metalness);
    }
}

impl ObjectCast for UniformBlock {
    fn cast(obj: ObjectPtr) -> Option<Arc<Self>> {
        downcast(&obj)
    }

    fn upcast(this: Arc<Self>) -> ObjectPtr {
        this
    }
}
