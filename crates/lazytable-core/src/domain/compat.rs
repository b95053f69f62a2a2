//! Domain compatibility checks (pure metadata).
//!
//! Rule: no schema evolution. Two domains are compatible when they have the
//! same width and, position by position, the same name, role and kind.

use super::{AttributeMismatchSnafu, Domain, DomainResult, WidthMismatchSnafu};

/// Require `other` to be usable wherever `expected` is.
pub fn ensure_compatible(expected: &Domain, other: &Domain) -> DomainResult<()> {
    if expected.len() != other.len() {
        return WidthMismatchSnafu {
            left: expected.len(),
            right: other.len(),
        }
        .fail();
    }

    for (position, (left, right)) in expected
        .attributes()
        .iter()
        .zip(other.attributes())
        .enumerate()
    {
        let left_role = expected.role(position);
        let right_role = other.role(position);
        if left != right || left_role != right_role {
            return AttributeMismatchSnafu {
                position,
                left_name: left.name(),
                left_role: left_role.unwrap_or(super::Role::Meta),
                left_kind: left.kind().clone(),
                right_name: right.name(),
                right_role: right_role.unwrap_or(super::Role::Meta),
                right_kind: right.kind().clone(),
            }
            .fail();
        }
    }

    Ok(())
}
