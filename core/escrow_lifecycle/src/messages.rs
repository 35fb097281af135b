//! Message catalog seam.
//!
//! The core never embeds user-facing text. It produces catalog keys and asks
//! the [`MessageCatalog`] carried in the request context to resolve them.

pub const VALIDATION_PASSED: &str = "validation.passed";
pub const VALIDATION_FAILED: &str = "validation.failed";
pub const REQUEST_FAILED: &str = "request.failed";

pub const PROJECT_SUBMITTED: &str = "project.submitted";
pub const PROJECT_DRAFT_SAVED: &str = "project.draft_saved";
pub const PROJECT_UPDATED: &str = "project.updated";
pub const PROJECT_APPROVED: &str = "project.approved";
pub const PROJECT_REJECTED: &str = "project.rejected";
pub const PROJECT_RETURNED: &str = "project.returned";
pub const PROJECT_FOUND: &str = "project.found";
pub const CLOSURE_REQUESTED: &str = "project.closure_requested";
pub const DISTRIBUTION_UPDATED: &str = "project.distribution_updated";
pub const INCLUSION_ADDED: &str = "inclusion.added";
pub const DOCUMENT_RECORDED: &str = "document.recorded";
pub const SEARCH_COMPLETED: &str = "search.completed";

/// Resolves catalog keys to localized text.
pub trait MessageCatalog: Send + Sync {
    fn resolve(&self, code: &str, locale: &str) -> String;
}

/// Catalog that echoes the key back. Useful when no bundle is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyEchoCatalog;

impl MessageCatalog for KeyEchoCatalog {
    fn resolve(&self, code: &str, _locale: &str) -> String {
        code.to_string()
    }
}
