//! Error types for the object model.

use thiserror::Error;

/// Result type for object model operations.
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Errors that can occur while building or decoding objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The `type` discriminator names no known object type.
    #[error("unknown object type: {type_name}")]
    UnknownType {
        /// The rejected type tag.
        type_name: String,
    },

    /// The `type` discriminator is missing from a hash.
    #[error("object hash has no type")]
    MissingType,

    /// The class name names no known object class.
    #[error("unknown object class: {class_name}")]
    UnknownClass {
        /// The rejected class name.
        class_name: String,
    },

    /// A required (ident) attribute is missing or null.
    #[error("missing required attribute '{attribute}' for {type_name}")]
    MissingAttribute {
        /// The concrete type being built.
        type_name: String,
        /// The missing attribute.
        attribute: String,
    },

    /// An ident string or tuple does not fit the class's ident attributes.
    #[error("bad ident '{ident}' for object class {class_name}")]
    BadIdent {
        /// The offending ident.
        ident: String,
        /// The class it was parsed against.
        class_name: String,
    },

    /// Two types of different classes were mixed up.
    #[error("cannot convert {from} into {to}: different object classes")]
    ClassMismatch {
        /// Source type.
        from: String,
        /// Target type.
        to: String,
    },
}

impl ObjectError {
    /// Creates an unknown-type error.
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Creates a missing-attribute error.
    pub fn missing_attribute(type_name: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            type_name: type_name.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a bad-ident error.
    pub fn bad_ident(ident: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self::BadIdent {
            ident: ident.into(),
            class_name: class_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ObjectError::unknown_type("Toaster");
        assert_eq!(err.to_string(), "unknown object type: Toaster");

        let err = ObjectError::bad_ident("a;b", "ProductOnClient");
        assert!(err.to_string().contains("ProductOnClient"));
    }
}
