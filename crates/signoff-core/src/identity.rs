//! # Identity Newtypes
//!
//! Newtype wrappers for every identifier the engine handles. Engine-minted
//! identifiers (`WorkflowId`, `StageId`, `ActionId`, `InstanceId`) are UUID v4.
//! Identifiers owned by the surrounding application (`UserId`, `RoleCode`,
//! `DocumentTypeId`, document entity ids) are validated non-empty strings.
//!
//! String newtypes validate on deserialization as well (`try_from = "String"`),
//! so a blank user id can never enter the engine through a config file or an
//! HTTP body.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SignoffError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = SignoffError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, ":")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self).map_err(|e| {
                    SignoffError::validation(format!(
                        concat!("invalid ", $prefix, " id {:?}: {}"),
                        s, e
                    ))
                })
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Construct from a string, rejecting blank values. Surrounding
            /// whitespace is trimmed.
            pub fn new(value: impl AsRef<str>) -> Result<Self, SignoffError> {
                let trimmed = value.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(SignoffError::validation(concat!($what, " must not be empty")));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = SignoffError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = SignoffError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a workflow definition.
    WorkflowId,
    "workflow"
);

uuid_id!(
    /// Unique identifier for a workflow stage.
    StageId,
    "stage"
);

uuid_id!(
    /// Unique identifier for an audit-log action record.
    ActionId,
    "action"
);

uuid_id!(
    /// Unique identifier for one routing of a document through a workflow.
    InstanceId,
    "instance"
);

string_id!(
    /// Identifier of a user in the surrounding application.
    UserId,
    "user id"
);

string_id!(
    /// Role code granted to users by the surrounding application
    /// (e.g. `finance_manager`).
    RoleCode,
    "role code"
);

string_id!(
    /// Document-type identifier a workflow's applicability filter matches on
    /// (e.g. `purchase_invoice`, `vendor_payment`).
    DocumentTypeId,
    "document type"
);

/// The kind of financial document routed through approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A purchase or sales invoice.
    Invoice,
    /// An outgoing payment.
    Payment,
}

impl EntityType {
    /// The wire name of this entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Payment => "payment",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SignoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(Self::Invoice),
            "payment" => Ok(Self::Payment),
            other => Err(SignoffError::validation(format!(
                "unknown entity type {other:?}; expected \"invoice\" or \"payment\""
            ))),
        }
    }
}

/// Reference to one document record: `(entity_type, entity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Invoice or payment.
    pub entity_type: EntityType,
    /// The document's id in the surrounding application.
    pub entity_id: String,
}

impl DocumentRef {
    /// Construct a document reference, rejecting a blank entity id.
    pub fn new(entity_type: EntityType, entity_id: impl AsRef<str>) -> Result<Self, SignoffError> {
        let entity_id = entity_id.as_ref().trim();
        if entity_id.is_empty() {
            return Err(SignoffError::validation("entity id must not be empty"));
        }
        Ok(Self {
            entity_type,
            entity_id: entity_id.to_string(),
        })
    }

    /// Shorthand for an invoice reference.
    pub fn invoice(entity_id: impl AsRef<str>) -> Result<Self, SignoffError> {
        Self::new(EntityType::Invoice, entity_id)
    }

    /// Shorthand for a payment reference.
    pub fn payment(entity_id: impl AsRef<str>) -> Result<Self, SignoffError> {
        Self::new(EntityType::Payment, entity_id)
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// The principal requesting an operation: a user and the role codes the
/// surrounding application granted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// Role codes held by the user.
    #[serde(default)]
    pub roles: BTreeSet<RoleCode>,
}

impl Actor {
    /// An actor with no roles.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            roles: BTreeSet::new(),
        }
    }

    /// Add a role to this actor.
    pub fn with_role(mut self, role: RoleCode) -> Self {
        self.roles.insert(role);
        self
    }

    /// Whether the actor holds `role`.
    pub fn has_role(&self, role: &RoleCode) -> bool {
        self.roles.contains(role)
    }
}
