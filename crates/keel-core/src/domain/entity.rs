//! Entities: objects defined by identity rather than by attributes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;

/// Something with a stable identity.
///
/// Two entities are the same entity when their ids are equal, whatever
/// their other attributes say. Use [`impl_entity_identity!`] to derive
/// `PartialEq`/`Eq`/`Hash` on that basis.
///
/// [`impl_entity_identity!`]: crate::impl_entity_identity
pub trait Entity {
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display;

    fn id(&self) -> &Self::Id;

    fn same_identity_as(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// Implement identity-only `PartialEq`, `Eq` and `Hash` for an [`Entity`].
#[macro_export]
macro_rules! impl_entity_identity {
    ($ty:ty) => {
        impl ::core::cmp::PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::domain::Entity::id(self) == $crate::domain::Entity::id(other)
            }
        }

        impl ::core::cmp::Eq for $ty {}

        impl ::core::hash::Hash for $ty {
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                ::core::hash::Hash::hash($crate::domain::Entity::id(self), state)
            }
        }
    };
}

/// UUID identifier tagged with the entity type it identifies.
///
/// `EntityId<User>` and `EntityId<Order>` do not mix.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId<T> {
    value: Uuid,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityId<T> {
    /// Fresh random (v4) id.
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub const fn from_uuid(value: Uuid) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.value
    }
}

impl<T> Default for EntityId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EntityId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityId<T> {}

impl<T> PartialEq for EntityId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for EntityId<T> {}

impl<T> Hash for EntityId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.value)
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl<T> FromStr for EntityId<T> {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self::from_uuid)
            .map_err(|_| DomainError::InvalidIdentifier(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Order;

    #[test]
    fn ids_are_unique() {
        let a = EntityId::<Order>::new();
        let b = EntityId::<Order>::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_parse_and_display_as_uuid() {
        let raw = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let id: EntityId<Order> = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("not-a-uuid".parse::<EntityId<Order>>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = EntityId::<Order>::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));

        let back: EntityId<Order> = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
