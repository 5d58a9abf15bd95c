use serde::{Deserialize, Serialize};

use voltmart_core::{CustomerId, DomainError, DomainResult, IdentityId};

/// Entity: a customer record.
///
/// Created at registration and immutable thereafter within this system's
/// scope. A customer is linked to at most one authenticated identity; the
/// link is what authorizes order placement on the customer's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    address: Option<String>,
    phone: Option<String>,
    identity: Option<IdentityId>,
}

impl Customer {
    /// Assemble a customer from its stored parts.
    pub fn from_parts(
        id: CustomerId,
        name: String,
        address: Option<String>,
        phone: Option<String>,
        identity: Option<IdentityId>,
    ) -> DomainResult<Self> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("customer name must not be empty"));
        }
        Ok(Self {
            id,
            name,
            address,
            phone,
            identity,
        })
    }

    pub fn id(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn identity(&self) -> Option<IdentityId> {
        self.identity
    }

    pub fn is_linked_to(&self, identity: IdentityId) -> bool {
        self.identity == Some(identity)
    }
}

/// Command: register a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    name: String,
    address: Option<String>,
    phone: Option<String>,
    identity: Option<IdentityId>,
}

impl NewCustomer {
    pub fn new(
        name: impl Into<String>,
        address: Option<String>,
        phone: Option<String>,
        identity: Option<IdentityId>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("customer name must not be empty"));
        }
        Ok(Self {
            name,
            address,
            phone,
            identity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn identity(&self) -> Option<IdentityId> {
        self.identity
    }
}

/// A verified caller identity together with its resolved customer link.
///
/// The surrounding session layer verifies the caller's token and resolves
/// the identity to a customer record (or to none) **before** invoking any
/// workflow here; this type is how that result is passed in. No token
/// parsing happens inside this system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    identity: IdentityId,
    customer: Option<CustomerId>,
}

impl CustomerIdentity {
    pub fn linked(identity: IdentityId, customer: CustomerId) -> Self {
        Self {
            identity,
            customer: Some(customer),
        }
    }

    /// An authenticated identity with no customer record (e.g. staff, or a
    /// registration that never completed).
    pub fn unlinked(identity: IdentityId) -> Self {
        Self {
            identity,
            customer: None,
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    pub fn customer(&self) -> Option<CustomerId> {
        self.customer
    }
}
