//! Code for handling IDs
use crate::error::ModelError;
use anyhow::Result;
use indexmap::IndexMap;

/// A trait alias for ID types
pub trait IDLike:
    Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}
impl<T> IDLike for T where
    T: Eq + std::hash::Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display + From<String>
{
}

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `ZoneID`, `DestinationID`, etc.)
        ///
        /// IDs are shared between threads answering queries, so they are reference counted
        /// atomically.
        pub struct $name(pub std::sync::Arc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::sync::Arc::from(id))
            }
        }
    };
}
pub(crate) use define_id_type;

#[cfg(test)]
define_id_type!(GenericID);

/// A data structure mapping IDs to dense indices
pub trait IDIndex<ID: IDLike> {
    /// Get the dense index of an ID from its string representation.
    ///
    /// # Returns
    ///
    /// The position of the ID, or [`ModelError::UnresolvedCode`] if it is not present.
    fn index_of(&self, id: &str) -> Result<usize>;
}

impl<ID: IDLike, V> IDIndex<ID> for IndexMap<ID, V> {
    fn index_of(&self, id: &str) -> Result<usize> {
        let index = self
            .get_index_of(id)
            .ok_or_else(|| ModelError::UnresolvedCode {
                code: id.to_string(),
            })?;

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        let ids: IndexMap<GenericID, u32> =
            [("a".into(), 10), ("b".into(), 20)].into_iter().collect();
        assert_eq!(ids.index_of("a").unwrap(), 0);
        assert_eq!(ids.index_of("b").unwrap(), 1);

        let err = ids.index_of("c").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ModelError>(),
            Some(&ModelError::UnresolvedCode {
                code: "c".to_string()
            })
        );
    }

    #[test]
    fn test_id_display() {
        let id = GenericID::new("E02000001");
        assert_eq!(id.to_string(), "E02000001");
        assert_eq!(id, GenericID::from("E02000001".to_string()));
    }
}
