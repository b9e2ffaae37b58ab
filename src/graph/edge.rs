use serde::{Deserialize, Serialize};
use std::fmt;

/// What a body reference does with its target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "use", rename_all = "snake_case")]
pub enum UseKind {
    /// Exactly-bound call: static, constructor, private or super call
    Call,
    /// Virtual or interface call; `receiver` is the static receiver type
    VirtualCall { receiver: String },
    FieldAccess,
    Instantiate,
    TypeReference,
    Reflection,
}

/// Typed edge between two graph nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeKind {
    Contains,
    Super,
    Implements,
    TypeRef,
    Uses(UseKind),
    Overrides,
    AnnotatedBy,
    AnnotationDefault,
    /// Inner class to its outer class
    NestedIn,
    /// Class to a member that exists whenever the class does
    Implicit,
    /// Generic-signature mention; never propagates retention
    Signature,
}

/// How much retention an edge passes to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    None,
    Shell,
    Full,
}

impl EdgeKind {
    pub fn propagation(&self) -> Propagation {
        match self {
            EdgeKind::Super
            | EdgeKind::Implements
            | EdgeKind::TypeRef
            | EdgeKind::AnnotatedBy
            | EdgeKind::AnnotationDefault
            | EdgeKind::NestedIn => Propagation::Shell,
            EdgeKind::Uses(_) | EdgeKind::Implicit => Propagation::Full,
            EdgeKind::Contains | EdgeKind::Overrides | EdgeKind::Signature => Propagation::None,
        }
    }

    /// Edges recomputed from method bodies on an incremental run
    pub fn is_body(&self) -> bool {
        matches!(self, EdgeKind::Uses(_) | EdgeKind::Signature)
    }

    pub fn is_hierarchy(&self) -> bool {
        matches!(self, EdgeKind::Super | EdgeKind::Implements)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Contains => write!(f, "CONTAINS"),
            EdgeKind::Super => write!(f, "SUPER"),
            EdgeKind::Implements => write!(f, "IMPLEMENTS"),
            EdgeKind::TypeRef => write!(f, "TYPE_REF"),
            EdgeKind::Uses(UseKind::VirtualCall { receiver }) => write!(f, "USES(virtual on {})", receiver),
            EdgeKind::Uses(kind) => write!(f, "USES({:?})", kind),
            EdgeKind::Overrides => write!(f, "OVERRIDES"),
            EdgeKind::AnnotatedBy => write!(f, "ANNOTATED_BY"),
            EdgeKind::AnnotationDefault => write!(f, "ANNOTATION_DEFAULT"),
            EdgeKind::NestedIn => write!(f, "NESTED_IN"),
            EdgeKind::Implicit => write!(f, "IMPLICIT"),
            EdgeKind::Signature => write!(f, "SIGNATURE"),
        }
    }
}
