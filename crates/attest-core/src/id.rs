//! Stable ID newtypes.
//!
//! IDs are newtype wrappers over `u32`, handed out in registration order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a function registered for verification.
///
/// This is the key of the contract side table: every handle that wraps the
/// same original function carries the same `FunctionId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

// Display just prints the inner value.

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
