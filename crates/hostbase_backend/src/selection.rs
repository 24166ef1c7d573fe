//! Tri-state id selection.

use crate::filter::Constraint;
use serde_json::Value;

/// Which ids of one kind an operation covers.
///
/// Replaces the overloaded list convention where an empty list meant
/// "all", a list holding only a null meant "none" and anything else meant
/// "exactly these".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdSelection {
    /// Every known id.
    #[default]
    All,
    /// No id at all.
    None,
    /// Exactly the listed ids.
    Exactly(Vec<String>),
}

impl IdSelection {
    /// Builds a selection from explicit ids. An empty list selects nothing.
    pub fn exactly<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            Self::None
        } else {
            Self::Exactly(ids)
        }
    }

    /// Decodes the sentinel list convention: `[]` is all, `[None]` is none,
    /// any other list is exactly its non-null members.
    pub fn from_sentinel_list(list: &[Option<String>]) -> Self {
        if list.is_empty() {
            return Self::All;
        }
        let ids: Vec<String> = list.iter().flatten().cloned().collect();
        Self::exactly(ids)
    }

    /// Returns true for [`IdSelection::All`].
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Returns true if the selection can match no id.
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Exactly(ids) => ids.is_empty(),
            Self::All => false,
        }
    }

    /// Returns the explicit ids, if any.
    pub fn ids(&self) -> Option<&[String]> {
        match self {
            Self::Exactly(ids) => Some(ids),
            _ => None,
        }
    }

    /// Returns true if the selection covers `id`.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Exactly(ids) => ids.iter().any(|candidate| candidate == id),
        }
    }

    /// Converts into a filter constraint.
    pub fn to_constraint(&self) -> Constraint {
        match self {
            Self::All => Constraint::Any(Vec::new()),
            Self::None => Constraint::Nothing,
            Self::Exactly(ids) if ids.is_empty() => Constraint::Nothing,
            Self::Exactly(ids) => {
                Constraint::Any(ids.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_decoding() {
        assert_eq!(IdSelection::from_sentinel_list(&[]), IdSelection::All);
        assert_eq!(IdSelection::from_sentinel_list(&[None]), IdSelection::None);
        assert_eq!(
            IdSelection::from_sentinel_list(&[Some("a".into()), None]),
            IdSelection::Exactly(vec!["a".into()])
        );
    }

    #[test]
    fn all_and_none_stay_apart() {
        assert!(IdSelection::All.contains("x"));
        assert!(!IdSelection::None.contains("x"));
        assert_eq!(IdSelection::All.to_constraint(), Constraint::Any(vec![]));
        assert_eq!(IdSelection::None.to_constraint(), Constraint::Nothing);
        assert_eq!(IdSelection::exactly(Vec::<String>::new()), IdSelection::None);
    }
}
