//! Parsed compiled-unit view.
//!
//! A unit is one class with its members and symbolic method bodies, already
//! decoded by an external reader. Everything downstream of the reader works
//! on these values only.

pub mod descriptor;
mod reader;

pub use reader::{UnitReader, UnitSource};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The universal root type. It is a sentinel and never becomes a graph node.
pub const OBJECT_CLASS: &str = "java/lang/Object";

pub const CONSTRUCTOR_NAME: &str = "<init>";
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// Errors raised while reading or checking a unit
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("failed to read unit file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse unit file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported unit file extension: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("unit {unit}: malformed descriptor `{descriptor}`")]
    Descriptor { unit: String, descriptor: String },

    #[error("unit {unit}: duplicate member {member}")]
    DuplicateMember { unit: String, member: String },

    #[error("unit {0} has no superclass")]
    MissingSuperclass(String),

    #[error("unit {0} names itself as a supertype")]
    SelfSupertype(String),

    #[error("unit has an empty class name")]
    EmptyName,
}

/// JVM access flags of a class or member
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(pub u32);

impl Modifiers {
    pub const PUBLIC: u32 = 0x0001;
    pub const PRIVATE: u32 = 0x0002;
    pub const PROTECTED: u32 = 0x0004;
    pub const STATIC: u32 = 0x0008;
    pub const FINAL: u32 = 0x0010;
    pub const NATIVE: u32 = 0x0100;
    pub const INTERFACE: u32 = 0x0200;
    pub const ABSTRACT: u32 = 0x0400;
    pub const SYNTHETIC: u32 = 0x1000;
    pub const ANNOTATION: u32 = 0x2000;
    pub const ENUM: u32 = 0x4000;

    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_annotation(self) -> bool {
        self.contains(Self::ANNOTATION)
    }

    /// Source-level keywords for the set flags, used by keep-rule matching
    pub fn keywords(self) -> Vec<&'static str> {
        const NAMES: [(u32, &str); 10] = [
            (Modifiers::PUBLIC, "public"),
            (Modifiers::PRIVATE, "private"),
            (Modifiers::PROTECTED, "protected"),
            (Modifiers::STATIC, "static"),
            (Modifiers::FINAL, "final"),
            (Modifiers::NATIVE, "native"),
            (Modifiers::INTERFACE, "interface"),
            (Modifiers::ABSTRACT, "abstract"),
            (Modifiers::ANNOTATION, "annotation"),
            (Modifiers::ENUM, "enum"),
        ];
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl From<u32> for Modifiers {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

/// An annotation applied to a class or member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationUse {
    /// Annotation type, internal name
    #[serde(rename = "type")]
    pub type_name: String,

    /// Classes referenced from the annotation's element values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// Invisible (class-retention) annotations add no dependency on their type
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

impl AnnotationUse {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            references: Vec::new(),
            visible: true,
        }
    }

    pub fn with_reference(mut self, class: impl Into<String>) -> Self {
        self.references.push(class.into());
        self
    }

    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// One nested-type record from the unit's inner-class table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InnerClassRecord {
    pub inner: String,
    #[serde(default)]
    pub outer: Option<String>,
    #[serde(default)]
    pub simple_name: Option<String>,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl InnerClassRecord {
    pub fn new(inner: impl Into<String>, outer: Option<&str>) -> Self {
        let inner = inner.into();
        let simple_name = inner.rsplit('$').next().map(str::to_string);
        Self {
            inner,
            outer: outer.map(str::to_string),
            simple_name,
            modifiers: Modifiers::default(),
        }
    }
}

/// How an invoke instruction dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    Static,
    Special,
    Virtual,
    Interface,
}

/// A symbolic reference appearing in a method body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Invoke {
        dispatch: Dispatch,
        owner: String,
        name: String,
        descriptor: String,
    },
    Field {
        owner: String,
        name: String,
        descriptor: String,
    },
    New {
        class: String,
    },
    /// checkcast, instanceof, array creation, exception handler type
    Type {
        class: String,
    },
    ClassLiteral {
        class: String,
    },
    /// A reflective lookup resolved from constants
    Reflect {
        class: String,
        #[serde(default)]
        member: Option<String>,
        #[serde(default)]
        descriptor: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMethod {
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationUse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Classes referenced by an annotation element's default value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotation_default: Vec<String>,
    #[serde(default)]
    pub body: Vec<Instruction>,
}

impl ParsedMethod {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            modifiers: Modifiers::new(Modifiers::PUBLIC),
            annotations: Vec::new(),
            exceptions: Vec::new(),
            signature: None,
            annotation_default: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A no-argument constructor delegating to `superclass.<init>()V`
    pub fn default_constructor(superclass: &str) -> Self {
        Self::new(CONSTRUCTOR_NAME, "()V").calls(Dispatch::Special, superclass, CONSTRUCTOR_NAME, "()V")
    }

    pub fn with_modifiers(mut self, bits: u32) -> Self {
        self.modifiers = Modifiers::new(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationUse) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_exception(mut self, class: impl Into<String>) -> Self {
        self.exceptions.push(class.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_annotation_default(mut self, class: impl Into<String>) -> Self {
        self.annotation_default.push(class.into());
        self
    }

    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.body.push(instruction);
        self
    }

    pub fn calls(self, dispatch: Dispatch, owner: &str, name: &str, descriptor: &str) -> Self {
        self.with_instruction(Instruction::Invoke {
            dispatch,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    pub fn accesses(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.with_instruction(Instruction::Field {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// `new C` followed by `C.<init>()V`
    pub fn instantiates(self, class: &str) -> Self {
        self.with_instruction(Instruction::New {
            class: class.to_string(),
        })
        .calls(Dispatch::Special, class, CONSTRUCTOR_NAME, "()V")
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(&self.name, &self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedField {
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationUse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ParsedField {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            modifiers: Modifiers::new(Modifiers::PUBLIC),
            annotations: Vec::new(),
            signature: None,
        }
    }

    pub fn with_modifiers(mut self, bits: u32) -> Self {
        self.modifiers = Modifiers::new(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationUse) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(&self.name, &self.descriptor)
    }
}

/// Name and descriptor of a member, unique within its owner per member kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberKey {
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.descriptor)
    }
}

/// One compiled unit: a class and everything it declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUnit {
    pub name: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationUse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_classes: Vec<InnerClassRecord>,
    /// Library units contribute structure only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub library: bool,
    #[serde(default)]
    pub methods: Vec<ParsedMethod>,
    #[serde(default)]
    pub fields: Vec<ParsedField>,
}

impl ParsedUnit {
    /// A public class extending `java/lang/Object`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiers: Modifiers::new(Modifiers::PUBLIC),
            superclass: Some(OBJECT_CLASS.to_string()),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            signature: None,
            inner_classes: Vec::new(),
            library: false,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_modifiers(mut self, bits: u32) -> Self {
        self.modifiers = Modifiers::new(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationUse) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_inner_class(mut self, record: InnerClassRecord) -> Self {
        self.inner_classes.push(record);
        self
    }

    pub fn with_method(mut self, method: ParsedMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_field(mut self, field: ParsedField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn as_library(mut self) -> Self {
        self.library = true;
        self
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&ParsedMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn field(&self, name: &str, descriptor: &str) -> Option<&ParsedField> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Check the unit is structurally well formed.
    pub fn validate(&self) -> Result<(), UnitError> {
        if self.name.is_empty() {
            return Err(UnitError::EmptyName);
        }

        match &self.superclass {
            None if self.name != OBJECT_CLASS => {
                return Err(UnitError::MissingSuperclass(self.name.clone()));
            }
            Some(s) if *s == self.name => {
                return Err(UnitError::SelfSupertype(self.name.clone()));
            }
            _ => {}
        }
        if self.interfaces.iter().any(|i| *i == self.name) {
            return Err(UnitError::SelfSupertype(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for method in &self.methods {
            descriptor::parse_method(&method.descriptor).map_err(|_| UnitError::Descriptor {
                unit: self.name.clone(),
                descriptor: method.descriptor.clone(),
            })?;
            if !seen.insert(("m", method.key())) {
                return Err(UnitError::DuplicateMember {
                    unit: self.name.clone(),
                    member: method.key().to_string(),
                });
            }
        }
        for field in &self.fields {
            descriptor::parse_field(&field.descriptor).map_err(|_| UnitError::Descriptor {
                unit: self.name.clone(),
                descriptor: field.descriptor.clone(),
            })?;
            if !seen.insert(("f", field.key())) {
                return Err(UnitError::DuplicateMember {
                    unit: self.name.clone(),
                    member: field.key().to_string(),
                });
            }
        }

        Ok(())
    }
}
