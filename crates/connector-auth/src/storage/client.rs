//! Client storage trait.
//!
//! Client registrations belong to the external tenant registry. This server
//! only looks them up.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Read access to registered clients.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its client ID.
    ///
    /// Returns inactive clients too; callers check `is_active`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;
}
