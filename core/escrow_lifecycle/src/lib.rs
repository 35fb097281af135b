//! # Escrow Lifecycle
//!
//! Core of the escrow project service. It takes a project from registration
//! through approval, rejection, correction and closure, and provisions the
//! construction / marketing / retention sub-accounts a project needs before
//! it can be activated.
//!
//! | Concern              | Module                              |
//! |----------------------|-------------------------------------|
//! | Entry points         | [`lifecycle::EscrowLifecycle`]      |
//! | Field rules          | [`validation`]                      |
//! | Allocations          | [`allocation`]                      |
//! | Legal transitions    | [`transitions`]                     |
//! | Sub-accounts         | [`provisioning`]                    |
//! | Audit trail          | [`audit`]                           |
//! | Listings             | [`search`]                          |
//! | Response shape       | [`response`]                        |
//!
//! ## Architecture
//!
//! Persistence, the core-banking account service, the audit sink and the
//! message catalog are collaborators behind traits ([`storage`],
//! [`provisioning::AccountCreationService`], [`audit::AuditSink`],
//! [`messages::MessageCatalog`]). Operations return
//! `Result<T, LifecycleError>`; callers turn that into a [`Response`] with
//! the request's catalog.

pub mod allocation;
pub mod audit;
pub mod errors;
pub mod lifecycle;
pub mod messages;
pub mod provisioning;
pub mod response;
pub mod search;
pub mod storage;
pub mod transitions;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

#[cfg(test)]
mod test_approval;
#[cfg(test)]
mod test_registration;

pub use errors::{FailureKind, GuardViolation, LifecycleError, StoreError};
pub use lifecycle::{Clock, DocumentRequest, EscrowLifecycle, InclusionRequest, SystemClock};
pub use response::{Response, ResponseStatus};
pub use types::{Project, ProjectStatus, ProjectSubmission, RequestContext};
