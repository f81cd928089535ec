//! Contact repository trait definition.

use leadflow_types::contact::Contact;
use leadflow_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for persisted contacts.
pub trait ContactRepository: Send + Sync {
    /// Insert a contact. The contact must already carry its `id`.
    fn create_contact(
        &self,
        contact: &Contact,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_contact(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Contact>, RepositoryError>> + Send;
}
