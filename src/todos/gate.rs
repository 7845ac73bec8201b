use uuid::Uuid;

use crate::auth::extractors::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Allows access iff the principal owns the resource.
pub fn authorize_owner_access(principal: &Principal, resource_owner_id: Uuid) -> Access {
    if principal.id() == resource_owner_id {
        Access::Allow
    } else {
        Access::Deny
    }
}
