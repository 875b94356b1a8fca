pub mod document_service;

#[cfg(test)]
pub mod testing;

pub use document_service::{DocumentService, HttpDocumentService};
