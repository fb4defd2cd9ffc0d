//! # Reconcile Document
//!
//! The data handles a reconcile pipeline operates on:
//!
//! - [`Document`] - one structured configuration object with nested field and
//!   annotation access
//! - [`Condition`] - a tracking record kept in the package ledger
//! - [`Diagnostic`] - a result entry attached to a document
//! - [`Package`] - the bounded document list processed in one run, serialized
//!   in the `ResourceList` shape
//! - [`wire_schemas`] - JSON schemas of the condition and diagnostic records

mod condition;
mod diagnostic;
mod document;
mod error;
mod package;
mod schema;

pub use condition::{Condition, ConditionStatus};
pub use diagnostic::{Diagnostic, ResourceRef, Severity};
pub use document::Document;
pub use error::{DocumentError, Result};
pub use package::{Package, PACKAGE_API_VERSION, PACKAGE_KIND};
pub use schema::wire_schemas;
