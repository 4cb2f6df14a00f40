//! Tenant context for multi-tenant database operations
//!
//! Every list and edge is scoped by tenant so that several game worlds/regions
//! can share one database without seeing each other's rows. The context is
//! passed explicitly into every operation.

use uuid::Uuid;

use crate::error::BuddyError;

/// Tenant context passed to all database operations for isolation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    tenant_id: Uuid,
    /// Hyphenated form, as stored in the `tenant_id` TEXT columns
    key: String,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            key: tenant_id.hyphenated().to_string(),
        }
    }

    /// Parse a tenant id carried in a message header
    pub fn parse(value: &str) -> Result<Self, BuddyError> {
        let tenant_id = Uuid::parse_str(value.trim())
            .map_err(|e| BuddyError::Transport(format!("Invalid tenant id '{}': {}", value, e)))?;
        Ok(Self::new(tenant_id))
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Tenant id as stored in the database
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TenantContext({})", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_key() {
        let id = Uuid::new_v4();
        let ctx = TenantContext::parse(&id.to_string()).unwrap();
        assert_eq!(ctx.tenant_id(), id);
        assert_eq!(ctx.key(), id.hyphenated().to_string());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TenantContext::parse("not-a-tenant").is_err());
    }
}
