//! Key and value capability traits
//!
//! The map decides at compile time what it may do with a value:
//! - `MapValue` is the baseline every stored value satisfies. Values that
//!   hold external resources opt into the release protocol by setting
//!   `RELEASABLE` and overriding `release`; the garbage collector calls it
//!   on evicted values and never calls it otherwise.
//! - `DeepCopy` additionally offers a structural copy. Only maps whose
//!   values implement it expose `get_for_modify`.
//!
//! There is no runtime capability probing: a map over values without
//! `DeepCopy` simply has no `get_for_modify` to call.

use std::hash::Hash;

use thiserror::Error;

/// Raised by a value's `release` hook. Logged by the garbage collector and
/// absorbed; one ill-behaved value cannot stall collection.
#[derive(Debug, Clone, Error)]
#[error("value release failed: {reason}")]
pub struct ValueReleaseError {
    reason: String,
}

impl ValueReleaseError {
    /// Creates a release error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Requirements on map keys.
pub trait MapKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Send + Sync + 'static> MapKey for T {}

/// Baseline capability of every stored value.
pub trait MapValue: Clone + Send + Sync + 'static {
    /// Whether evicted values must be released before they are dropped.
    const RELEASABLE: bool = false;

    /// Releases resources held by this value. Called by the garbage
    /// collector exactly once per evicted value when `RELEASABLE` is true.
    fn release(&mut self) -> Result<(), ValueReleaseError> {
        Ok(())
    }
}

impl MapValue for i64 {}
impl MapValue for u64 {}
impl MapValue for i32 {}
impl MapValue for u32 {}
impl MapValue for bool {}
impl MapValue for String {}
impl MapValue for Vec<u8> {}

/// Structural copy capability, required by `get_for_modify`.
pub trait DeepCopy: MapValue {
    /// Produces an independent copy sharing no mutable state with `self`.
    fn deep_copy(&self) -> Self;
}

impl DeepCopy for i64 {
    fn deep_copy(&self) -> Self {
        *self
    }
}

impl DeepCopy for u64 {
    fn deep_copy(&self) -> Self {
        *self
    }
}

impl DeepCopy for String {
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

impl DeepCopy for Vec<u8> {
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Handle {
        released: bool,
    }

    impl MapValue for Handle {
        const RELEASABLE: bool = true;

        fn release(&mut self) -> Result<(), ValueReleaseError> {
            if self.released {
                return Err(ValueReleaseError::new("double release"));
            }
            self.released = true;
            Ok(())
        }
    }

    #[test]
    fn test_default_values_are_not_releasable() {
        assert!(!<i64 as MapValue>::RELEASABLE);
        assert!(!<Vec<u8> as MapValue>::RELEASABLE);
    }

    #[test]
    fn test_opt_in_release() {
        assert!(Handle::RELEASABLE);
        let mut h = Handle { released: false };
        assert!(h.release().is_ok());
        let err = h.release().unwrap_err();
        assert!(err.reason().contains("double release"));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = vec![1u8, 2, 3];
        let mut copied = original.deep_copy();
        copied.push(4);
        assert_eq!(original.len(), 3);
        assert_eq!(copied.len(), 4);
    }
}
