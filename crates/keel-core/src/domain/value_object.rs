//! Value objects: equality by value, no identity, immutable once built.

use std::fmt;

use crate::domain::error::DomainError;

/// A value compared by all of its attributes.
///
/// Immutability is a construction rule: value objects expose validated
/// constructors and no `&mut self` methods. Changing a value means building
/// a new one.
pub trait ValueObject: Clone + PartialEq + fmt::Debug {
    /// Check the value's own rules.
    fn validate(&self) -> Result<(), DomainError>;

    /// Return `self` if it is valid.
    fn validated(self) -> Result<Self, DomainError> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Money {
        amount_cents: i64,
        currency: String,
    }

    impl ValueObject for Money {
        fn validate(&self) -> Result<(), DomainError> {
            if self.currency.len() != 3 {
                return Err(DomainError::invalid("currency", "expected ISO 4217 code"));
            }
            Ok(())
        }
    }

    #[test]
    fn equal_attributes_mean_equal_values() {
        let a = Money {
            amount_cents: 100,
            currency: "EUR".into(),
        };
        assert_eq!(a.clone(), a);
        assert_ne!(
            a,
            Money {
                amount_cents: 100,
                currency: "USD".into()
            }
        );
    }

    #[test]
    fn validated_rejects_bad_values() {
        let bad = Money {
            amount_cents: 1,
            currency: "EURO".into(),
        };
        assert!(matches!(
            bad.validated(),
            Err(DomainError::InvalidValue { field: "currency", .. })
        ));
    }
}
