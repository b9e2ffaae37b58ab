use crate::unit::{InnerClassRecord, MemberKey, Modifiers};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A member's owner plus name and descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(&self.name, &self.descriptor)
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

/// Stable node identity across runs.
///
/// Serialized as a tagged string (`class:a/B`, `method:a/B.m:()V`,
/// `field:a/B.f:I`) so it can key maps in the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NodeId {
    Class(String),
    Method(MemberRef),
    Field(MemberRef),
}

impl NodeId {
    pub fn class(name: &str) -> Self {
        NodeId::Class(name.to_string())
    }

    pub fn method(owner: &str, name: &str, descriptor: &str) -> Self {
        NodeId::Method(MemberRef::new(owner, name, descriptor))
    }

    pub fn field(owner: &str, name: &str, descriptor: &str) -> Self {
        NodeId::Field(MemberRef::new(owner, name, descriptor))
    }

    /// The class this node is, or belongs to
    pub fn class_name(&self) -> &str {
        match self {
            NodeId::Class(name) => name,
            NodeId::Method(m) | NodeId::Field(m) => &m.owner,
        }
    }

    pub fn member(&self) -> Option<&MemberRef> {
        match self {
            NodeId::Class(_) => None,
            NodeId::Method(m) | NodeId::Field(m) => Some(m),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, NodeId::Class(_))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeId::Class(_) => NodeKind::Class,
            NodeId::Method(_) => NodeKind::Method,
            NodeId::Field(_) => NodeKind::Field,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Class(name) => write!(f, "{}", name),
            NodeId::Method(m) | NodeId::Field(m) => write!(f, "{}", m),
        }
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> String {
        match &id {
            NodeId::Class(name) => format!("class:{}", name),
            NodeId::Method(m) => format!("method:{}", m),
            NodeId::Field(m) => format!("field:{}", m),
        }
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("node id without kind tag: {}", s))?;

        let member = |rest: &str| -> Result<MemberRef, String> {
            let (owner, tail) = rest
                .split_once('.')
                .ok_or_else(|| format!("member id without owner: {}", s))?;
            let (name, descriptor) = tail
                .split_once(':')
                .ok_or_else(|| format!("member id without descriptor: {}", s))?;
            Ok(MemberRef::new(owner, name, descriptor))
        };

        match tag {
            "class" => Ok(NodeId::Class(rest.to_string())),
            "method" => Ok(NodeId::Method(member(rest)?)),
            "field" => Ok(NodeId::Field(member(rest)?)),
            other => Err(format!("unknown node kind `{}`", other)),
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Class,
    Method,
    Field,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Class => write!(f, "Class"),
            NodeKind::Method => write!(f, "Method"),
            NodeKind::Field => write!(f, "Field"),
        }
    }
}

/// Where a class node came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Supplied as program input; emitted and pruned
    Program { source: PathBuf },
    /// Library unit or recognized platform type; never emitted
    Library,
    /// Referenced but outside the known universe
    Unresolved,
}

impl Origin {
    pub fn is_program(&self) -> bool {
        matches!(self, Origin::Program { .. })
    }

    pub fn source(&self) -> Option<&PathBuf> {
        match self {
            Origin::Program { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    pub name: String,
    pub modifiers: Modifiers,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    /// Annotation types applied to the class
    pub annotations: BTreeSet<String>,
    /// Classes referenced from the class's annotation values
    #[serde(default)]
    pub annotation_refs: BTreeSet<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub inner_classes: Vec<InnerClassRecord>,
    /// Declared members
    pub members: BTreeSet<NodeId>,
    pub origin: Origin,
}

impl ClassNode {
    /// A member-less placeholder for a class known only by name
    pub fn placeholder(name: &str, origin: Origin) -> Self {
        Self {
            name: name.to_string(),
            modifiers: Modifiers::default(),
            superclass: None,
            interfaces: Vec::new(),
            annotations: BTreeSet::new(),
            annotation_refs: BTreeSet::new(),
            signature: None,
            inner_classes: Vec::new(),
            members: BTreeSet::new(),
            origin,
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId::Class(self.name.clone())
    }

    pub fn is_program(&self) -> bool {
        self.origin.is_program()
    }

    /// Placeholders carry no member table
    pub fn is_placeholder(&self) -> bool {
        !self.is_program() && self.members.is_empty() && self.superclass.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNode {
    pub id: NodeId,
    pub modifiers: Modifiers,
    pub annotations: BTreeSet<String>,
    #[serde(default)]
    pub annotation_refs: BTreeSet<String>,
    #[serde(default)]
    pub exceptions: Vec<String>,
    #[serde(default)]
    pub annotation_default: BTreeSet<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl MemberNode {
    pub fn member_ref(&self) -> Option<&MemberRef> {
        self.id.member()
    }

    pub fn name(&self) -> &str {
        self.id.member().map(|m| m.name.as_str()).unwrap_or("")
    }

    pub fn descriptor(&self) -> &str {
        self.id.member().map(|m| m.descriptor.as_str()).unwrap_or("")
    }

    pub fn is_method(&self) -> bool {
        matches!(self.id, NodeId::Method(_))
    }
}

/// Details stored for a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Class(ClassNode),
    Member(MemberNode),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Class(c) => c.id(),
            Node::Member(m) => m.id.clone(),
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            Node::Class(c) => c.modifiers,
            Node::Member(m) => m.modifiers,
        }
    }

    pub fn annotations(&self) -> &BTreeSet<String> {
        match self {
            Node::Class(c) => &c.annotations,
            Node::Member(m) => &m.annotations,
        }
    }

    pub fn as_class(&self) -> Option<&ClassNode> {
        match self {
            Node::Class(c) => Some(c),
            Node::Member(_) => None,
        }
    }

    pub fn as_member(&self) -> Option<&MemberNode> {
        match self {
            Node::Member(m) => Some(m),
            Node::Class(_) => None,
        }
    }
}
