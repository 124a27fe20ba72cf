//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific infrastructure.
//! It is responsible for converting Effects into actual API calls.

use std::future::Future;
use std::pin::Pin;

use crate::error::{Classification, ErrorKind, classify_status, message_contains};
use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Lifecycle step an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Creating,
    Reading,
    Updating,
    Deleting,
    Importing,
    WaitingFor,
    Listing,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Creating => "creating",
            Operation::Reading => "reading",
            Operation::Updating => "updating",
            Operation::Deleting => "deleting",
            Operation::Importing => "importing",
            Operation::WaitingFor => "waiting for",
            Operation::Listing => "listing",
        };
        f.write_str(s)
    }
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub operation: Option<Operation>,
    pub resource_id: Option<ResourceId>,
    /// Upstream handle, when known
    pub identifier: Option<String>,
    /// HTTP status of the upstream response, when there was one
    pub status: Option<u16>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] ", id.resource_type, id.name)?;
        }
        if let Some(op) = self.operation {
            write!(f, "Error {}", op)?;
            if let Some(ref id) = self.resource_id {
                write!(f, " {}", id.resource_type)?;
            }
            if let Some(ref identifier) = self.identifier {
                write!(f, " ({})", identifier)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Other,
            message: message.into(),
            operation: None,
            resource_id: None,
            identifier: None,
            status: None,
            cause: None,
        }
    }

    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(message).of_kind(kind)
    }

    /// Error built from an upstream HTTP status and message
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::with_kind(classify_status(status).kind, message);
        err.status = Some(status);
        err
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::NotFound, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Invalid, message)
    }

    pub fn canceled() -> Self {
        Self::with_kind(ErrorKind::Canceled, "operation canceled")
    }

    pub fn of_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Attach the lifecycle step unless an inner layer already did
    pub fn during(mut self, operation: Operation) -> Self {
        if self.operation.is_none() {
            self.operation = Some(operation);
        }
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn classification(&self) -> Classification {
        match self.status {
            Some(status) => classify_status(status),
            None => Classification::new(
                self.kind,
                matches!(self.kind, ErrorKind::Transport | ErrorKind::RateLimited),
            ),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Whether the upstream answered `status` with a message containing `fragment`
    pub fn is_status_with_message(&self, status: u16, fragment: &str) -> bool {
        self.status == Some(status) && message_contains(&self.message, fragment)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Contextualize errors with the operation, resource and handle they belong to
pub trait ResultExt<T> {
    fn context(
        self,
        operation: Operation,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<T>;
}

impl<T> ResultExt<T> for ProviderResult<T> {
    fn context(
        self,
        operation: Operation,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<T> {
        self.map_err(|e| {
            let mut e = e.during(operation);
            if e.resource_id.is_none() {
                e = e.for_resource(id.clone());
            }
            if let (None, Some(identifier)) = (&e.identifier, identifier) {
                e = e.with_identifier(identifier);
            }
            e
        })
    }
}

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "digitalocean_droplet")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
    }
}

/// Main Provider trait
///
/// Each infrastructure provider implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "digitalocean")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Schema of a resource type, if this Provider knows it
    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.resource_types()
            .into_iter()
            .find(|t| t.name() == resource_type)
            .map(|t| t.schema())
    }

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist or if no
    /// identifier is known yet.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Evaluate a data source against the upstream
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the upstream handle
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Adopt an existing upstream object under `id` from a user-supplied import ID
    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        (**self).schema(resource_type)
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, import_id)
    }
}
