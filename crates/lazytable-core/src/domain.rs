//! Table schema: ordered attributes grouped by role.
//!
//! A [`Domain`] is immutable once built. Attributes are stored in one ordered
//! list, features first, then labels, then metadata; an attribute's position
//! in that list is the column index used everywhere else in the crate.
//!
//! Callers may name attributes by name, by position, or by descriptor (see
//! [`AttributeRef`]); every such reference is resolved to a position at the
//! API boundary.

use std::{collections::HashMap, fmt};

use snafu::prelude::*;

pub mod compat;

pub use compat::ensure_compatible;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    /// Real-valued.
    Continuous,
    /// Categorical. `values` maps codes to labels; an empty list means the
    /// categories are open and codes are assigned by the source.
    Discrete {
        /// Category labels indexed by code.
        values: Vec<String>,
    },
    /// Free text.
    String,
}

impl AttributeKind {
    /// Discrete kind with the given category labels.
    pub fn discrete<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributeKind::Discrete {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Continuous => f.write_str("continuous"),
            AttributeKind::Discrete { values } if values.is_empty() => f.write_str("discrete"),
            AttributeKind::Discrete { values } => write!(f, "discrete{{{}}}", values.join(",")),
            AttributeKind::String => f.write_str("string"),
        }
    }
}

/// Role an attribute plays in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Regular feature column.
    Feature,
    /// Class / target column.
    Label,
    /// Metadata column, not used for modelling.
    Meta,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Feature => f.write_str("feature"),
            Role::Label => f.write_str("label"),
            Role::Meta => f.write_str("meta"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
}

impl Attribute {
    /// Attribute with an explicit kind.
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Continuous attribute.
    pub fn continuous(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Continuous)
    }

    /// Discrete attribute with known category labels.
    pub fn discrete<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, AttributeKind::discrete(values))
    }

    /// Text attribute.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::String)
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute kind.
    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    /// Human-readable rendering of `value` under this attribute, using the
    /// category label for discrete codes when one is known.
    pub fn format_value(&self, value: &crate::value::Value) -> String {
        use crate::value::Value;

        match (&self.kind, value) {
            (AttributeKind::Discrete { values }, Value::Discrete(code)) => values
                .get(*code as usize)
                .cloned()
                .unwrap_or_else(|| value.to_string()),
            _ => value.to_string(),
        }
    }
}

/// A caller-side way of naming an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRef {
    /// By name.
    Name(String),
    /// By position in the domain's ordered attribute list.
    Position(usize),
    /// By full descriptor; must match name and kind.
    Descriptor(Attribute),
}

impl From<&str> for AttributeRef {
    fn from(name: &str) -> Self {
        AttributeRef::Name(name.to_string())
    }
}

impl From<String> for AttributeRef {
    fn from(name: String) -> Self {
        AttributeRef::Name(name)
    }
}

impl From<usize> for AttributeRef {
    fn from(position: usize) -> Self {
        AttributeRef::Position(position)
    }
}

impl From<&Attribute> for AttributeRef {
    fn from(attribute: &Attribute) -> Self {
        AttributeRef::Descriptor(attribute.clone())
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeRef::Name(name) => write!(f, "{name:?}"),
            AttributeRef::Position(pos) => write!(f, "#{pos}"),
            AttributeRef::Descriptor(attr) => write!(f, "{:?} ({})", attr.name, attr.kind),
        }
    }
}

/// Errors from building, resolving against, or comparing domains.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DomainError {
    /// Two attributes share a name.
    #[snafu(display("Attribute name {name:?} appears more than once"))]
    DuplicateAttribute {
        /// The repeated name.
        name: String,
    },

    /// A reference names no attribute of the domain.
    #[snafu(display("Unknown attribute {reference}"))]
    UnknownAttribute {
        /// Rendering of the unresolved reference.
        reference: String,
    },

    /// The two domains have a different number of attributes.
    #[snafu(display("Domains differ in width: {left} attributes vs {right}"))]
    WidthMismatch {
        /// Width of the receiving domain.
        left: usize,
        /// Width of the other domain.
        right: usize,
    },

    /// Attributes at the same position differ.
    #[snafu(display(
        "Attribute #{position} differs: {left_name:?} ({left_role} {left_kind}) vs \
         {right_name:?} ({right_role} {right_kind})"
    ))]
    AttributeMismatch {
        /// Position in the ordered attribute list.
        position: usize,
        /// Name in the receiving domain.
        left_name: String,
        /// Role in the receiving domain.
        left_role: Role,
        /// Kind in the receiving domain.
        left_kind: AttributeKind,
        /// Name in the other domain.
        right_name: String,
        /// Role in the other domain.
        right_role: Role,
        /// Kind in the other domain.
        right_kind: AttributeKind,
    },
}

/// Convenience alias for domain results.
pub type DomainResult<T> = Result<T, DomainError>;

/// Ordered attributes: features, then labels, then metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    attributes: Vec<Attribute>,
    n_features: usize,
    n_labels: usize,
    by_name: HashMap<String, usize>,
}

impl Domain {
    /// Build a domain from its three role groups.
    pub fn new(
        features: Vec<Attribute>,
        labels: Vec<Attribute>,
        metas: Vec<Attribute>,
    ) -> DomainResult<Self> {
        let n_features = features.len();
        let n_labels = labels.len();
        let attributes: Vec<Attribute> = features.into_iter().chain(labels).chain(metas).collect();

        let mut by_name = HashMap::with_capacity(attributes.len());
        for (pos, attr) in attributes.iter().enumerate() {
            if by_name.insert(attr.name.clone(), pos).is_some() {
                return DuplicateAttributeSnafu {
                    name: attr.name.clone(),
                }
                .fail();
            }
        }

        Ok(Self {
            attributes,
            n_features,
            n_labels,
            by_name,
        })
    }

    /// Domain with feature attributes only.
    pub fn from_features(features: Vec<Attribute>) -> DomainResult<Self> {
        Self::new(features, Vec::new(), Vec::new())
    }

    /// Number of attributes across all roles.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the domain has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// All attributes in position order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Feature attributes.
    pub fn features(&self) -> &[Attribute] {
        &self.attributes[..self.n_features]
    }

    /// Label attributes.
    pub fn labels(&self) -> &[Attribute] {
        &self.attributes[self.n_features..self.n_features + self.n_labels]
    }

    /// Metadata attributes.
    pub fn metas(&self) -> &[Attribute] {
        &self.attributes[self.n_features + self.n_labels..]
    }

    /// Attribute at `position`.
    pub fn attribute(&self, position: usize) -> Option<&Attribute> {
        self.attributes.get(position)
    }

    /// Role of the attribute at `position`.
    pub fn role(&self, position: usize) -> Option<Role> {
        if position < self.n_features {
            Some(Role::Feature)
        } else if position < self.n_features + self.n_labels {
            Some(Role::Label)
        } else if position < self.attributes.len() {
            Some(Role::Meta)
        } else {
            None
        }
    }

    /// Position of the attribute called `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Resolve a caller reference to a position.
    pub fn resolve(&self, reference: &AttributeRef) -> DomainResult<usize> {
        let found = match reference {
            AttributeRef::Name(name) => self.position_of(name),
            AttributeRef::Position(pos) => (*pos < self.len()).then_some(*pos),
            AttributeRef::Descriptor(attr) => self
                .position_of(&attr.name)
                .filter(|pos| self.attributes[*pos].kind == attr.kind),
        };
        found.context(UnknownAttributeSnafu {
            reference: reference.to_string(),
        })
    }
}
