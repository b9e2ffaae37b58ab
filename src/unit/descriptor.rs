//! JVM type descriptor and signature scanning.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed descriptor `{descriptor}` at offset {offset}")]
pub struct DescriptorError {
    pub descriptor: String,
    pub offset: usize,
}

/// A single field type from a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(char),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// The class this type mentions, looking through arrays
    pub fn class_name(&self) -> Option<&str> {
        match self {
            FieldType::Primitive(_) => None,
            FieldType::Object(name) => Some(name),
            FieldType::Array(inner) => inner.class_name(),
        }
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn error(&self) -> DescriptorError {
        DescriptorError {
            descriptor: self.text.to_string(),
            offset: self.pos,
        }
    }

    fn field_type(&mut self) -> Result<FieldType, DescriptorError> {
        let c = self.peek().ok_or_else(|| self.error())?;
        match c {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => {
                self.pos += 1;
                Ok(FieldType::Primitive(c))
            }
            'L' => {
                let rest = &self.text[self.pos + 1..];
                let end = rest.find(';').ok_or_else(|| self.error())?;
                let name = &rest[..end];
                if name.is_empty() || name.contains(['.', '[', '(', ')']) {
                    return Err(self.error());
                }
                self.pos += end + 2;
                Ok(FieldType::Object(name.to_string()))
            }
            '[' => {
                self.pos += 1;
                Ok(FieldType::Array(Box::new(self.field_type()?)))
            }
            _ => Err(self.error()),
        }
    }
}

/// Parse a field descriptor such as `Ljava/lang/String;` or `[I`.
pub fn parse_field(descriptor: &str) -> Result<FieldType, DescriptorError> {
    let mut cursor = Cursor {
        text: descriptor,
        pos: 0,
    };
    let ty = cursor.field_type()?;
    if cursor.pos != descriptor.len() {
        return Err(cursor.error());
    }
    Ok(ty)
}

/// Parse a method descriptor into parameter types and return type (`None` for void).
pub fn parse_method(descriptor: &str) -> Result<(Vec<FieldType>, Option<FieldType>), DescriptorError> {
    let mut cursor = Cursor {
        text: descriptor,
        pos: 0,
    };
    if cursor.peek() != Some('(') {
        return Err(cursor.error());
    }
    cursor.pos += 1;

    let mut params = Vec::new();
    loop {
        match cursor.peek() {
            Some(')') => {
                cursor.pos += 1;
                break;
            }
            Some(_) => params.push(cursor.field_type()?),
            None => return Err(cursor.error()),
        }
    }

    let ret = if cursor.peek() == Some('V') {
        cursor.pos += 1;
        None
    } else {
        Some(cursor.field_type()?)
    };

    if cursor.pos != descriptor.len() {
        return Err(cursor.error());
    }
    Ok((params, ret))
}

/// Classes mentioned by a field or method descriptor, in order of appearance.
pub fn referenced_classes(descriptor: &str) -> Result<Vec<String>, DescriptorError> {
    let types = if descriptor.starts_with('(') {
        let (params, ret) = parse_method(descriptor)?;
        params.into_iter().chain(ret).collect()
    } else {
        vec![parse_field(descriptor)?]
    };

    Ok(types
        .iter()
        .filter_map(|t| t.class_name().map(str::to_string))
        .collect())
}

/// Normalize a class operand that may be an array descriptor (`[Lpkg/A;`).
///
/// Returns `None` for primitive arrays.
pub fn element_class(name: &str) -> Option<String> {
    if name.starts_with('[') {
        parse_field(name)
            .ok()
            .and_then(|t| t.class_name().map(str::to_string))
    } else if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Class names mentioned in a generic signature.
///
/// Signatures are opaque text; this only pulls out `L...;` class types,
/// ignoring type arguments' nesting and inner-class suffixes.
pub fn signature_classes(signature: &str) -> Vec<String> {
    let mut classes = Vec::new();
    let bytes = signature.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let starts_class = bytes[i] == b'L'
            && (i == 0 || matches!(bytes[i - 1], b'(' | b')' | b'<' | b';' | b'[' | b':' | b'+' | b'-' | b'^' | b'>'));
        if !starts_class {
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && !matches!(bytes[end], b';' | b'<' | b'.') {
            end += 1;
        }
        if end > start {
            let name = &signature[start..end];
            if !classes.iter().any(|c| c == name) {
                classes.push(name.to_string());
            }
        }

        // Resume after the class name; type arguments are scanned as they come
        i = end;
        while i < bytes.len() && !matches!(bytes[i], b'<' | b';') {
            i += 1;
        }
        i += 1;
    }

    classes
}
