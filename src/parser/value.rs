use glam::{Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::scanner::Scanner;
use crate::error::ParseError;

/// A value type that can be stored in a [`TField`](super::TField) and read
/// from or written to the text format.
pub trait FieldValue: Clone + Send + Sync + 'static {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError>;

    /// Formats the value so that [`FieldValue::parse`] reads it back.
    fn to_text(&self) -> String;
}

/// RGBA color with components in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color(pub Vec4);

impl Default for Color {
    fn default() -> Self {
        Self(Vec4::ONE)
    }
}

impl Color {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self(Vec4::new(r, g, b, a))
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return None;
        }
        let mut channels = [1.0_f32; 4];
        for (i, channel) in channels.iter_mut().enumerate().take(digits.len() / 2) {
            let byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16).ok()?;
            *channel = f32::from(byte) / 255.0;
        }
        Some(Self(Vec4::from_array(channels)))
    }

    pub fn r(&self) -> f32 {
        self.0.x
    }

    pub fn g(&self) -> f32 {
        self.0.y
    }

    pub fn b(&self) -> f32 {
        self.0.z
    }

    pub fn a(&self) -> f32 {
        self.0.w
    }
}

/// Quotes a string for the text format, escaping as needed.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn scan_floats<const N: usize>(scanner: &mut Scanner) -> Result<[f32; N], ParseError> {
    let mut values = [0.0; N];
    for value in values.iter_mut() {
        *value = scanner.scan_float()?;
    }
    Ok(values)
}

fn floats_to_text(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl FieldValue for bool {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scanner.scan_bool()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for i32 {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scanner.scan_integer()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for u32 {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scanner.scan_uinteger()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for f32 {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scanner.scan_float()
    }

    fn to_text(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for String {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scanner.scan_quoted_string()
    }

    fn to_text(&self) -> String {
        quote(self)
    }
}

impl FieldValue for Vec2 {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scan_floats::<2>(scanner).map(Vec2::from_array)
    }

    fn to_text(&self) -> String {
        floats_to_text(&self.to_array())
    }
}

impl FieldValue for Vec3 {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scan_floats::<3>(scanner).map(Vec3::from_array)
    }

    fn to_text(&self) -> String {
        floats_to_text(&self.to_array())
    }
}

impl FieldValue for Vec4 {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        scan_floats::<4>(scanner).map(Vec4::from_array)
    }

    fn to_text(&self) -> String {
        floats_to_text(&self.to_array())
    }
}

/// Rotations are written as an axis followed by an angle in degrees.
impl FieldValue for Quat {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        let [x, y, z, degrees] = scan_floats::<4>(scanner)?;
        let axis = Vec3::new(x, y, z);
        if axis.length_squared() <= f32::EPSILON {
            return Ok(Quat::IDENTITY);
        }
        Ok(Quat::from_axis_angle(axis.normalize(), degrees.to_radians()))
    }

    fn to_text(&self) -> String {
        let (axis, angle) = self.to_axis_angle();
        floats_to_text(&[axis.x, axis.y, axis.z, angle.to_degrees()])
    }
}

/// Colors are either a quoted `#RRGGBB[AA]` string or four numbers. Numbers
/// are taken as 0-255 values when any of them exceeds 1.
impl FieldValue for Color {
    fn parse(scanner: &mut Scanner) -> Result<Self, ParseError> {
        if scanner.peek_char()? == Some('"') {
            let text = scanner.scan_quoted_string()?;
            return Color::from_hex(&text)
                .ok_or_else(|| scanner.error(format!("Invalid color string '{text}'")));
        }
        let values = Vec4::from_array(scan_floats::<4>(scanner)?);
        if values.max_element() > 1.0 {
            Ok(Color(values / 255.0))
        } else {
            Ok(Color(values))
        }
    }

    fn to_text(&self) -> String {
        floats_to_text(&self.0.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner_for(text: &str) -> Scanner {
        let mut scanner = Scanner::new(Box::new(|_| None));
        scanner.push_string_input(text);
        scanner
    }

    fn parse<T: FieldValue>(text: &str) -> Result<T, ParseError> {
        T::parse(&mut scanner_for(text))
    }

    #[test]
    fn parses_vectors() {
        assert_eq!(parse::<Vec2>("1 2").unwrap(), Vec2::new(1.0, 2.0));
        assert_eq!(parse::<Vec3>("1 -2 3.5").unwrap(), Vec3::new(1.0, -2.0, 3.5));
        assert!(parse::<Vec3>("1 2").is_err());
    }

    #[test]
    fn parses_colors_in_all_forms() {
        assert_eq!(parse::<Color>("\"#ff0000\"").unwrap(), Color::new(1.0, 0.0, 0.0, 1.0));
        let with_alpha = parse::<Color>("\"#00ff0080\"").unwrap();
        assert_eq!(with_alpha.g(), 1.0);
        assert!((with_alpha.a() - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(parse::<Color>(".5 .5 .5 1").unwrap(), Color::new(0.5, 0.5, 0.5, 1.0));
        assert_eq!(parse::<Color>("255 0 0 255").unwrap(), Color::new(1.0, 0.0, 0.0, 1.0));
        assert!(parse::<Color>("\"#12\"").unwrap_err().mentions("Invalid color string"));
    }

    #[test]
    fn rotation_uses_degrees() {
        let rotation = parse::<Quat>("0 1 0 90").unwrap();
        let rotated = rotation * Vec3::X;
        assert!((rotated - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
        assert_eq!(parse::<Quat>("0 0 0 45").unwrap(), Quat::IDENTITY);

        let text = rotation.to_text();
        let reparsed = parse::<Quat>(&text).unwrap();
        assert!(reparsed.abs_diff_eq(rotation, 1e-5));
    }

    #[test]
    fn strings_are_quoted_with_escapes() {
        let text = String::from("say \"hi\"\n").to_text();
        assert_eq!(text, r#""say \"hi\"\n""#);
        assert_eq!(parse::<String>(&text).unwrap(), "say \"hi\"\n");
    }

    #[test]
    fn scalars_write_parseable_text() {
        assert_eq!(parse::<f32>(&2.5_f32.to_text()).unwrap(), 2.5);
        assert_eq!(parse::<u32>(&42_u32.to_text()).unwrap(), 42);
        assert_eq!(parse::<i32>(&(-7_i32).to_text()).unwrap(), -7);
        assert!(parse::<bool>(&true.to_text()).unwrap());
    }
}
