//! Shared PDF handling utilities
//!
//! This crate provides the PDF side of document signing: reserving a
//! signature placeholder in the object graph, patching `/ByteRange` into the
//! serialized bytes, embedding the finished CMS blob, and locating existing
//! signature fields for verification.

pub mod appearance;
pub mod byterange;
pub mod contents;
pub mod error;
pub mod fields;
pub mod parser;
pub mod preparer;
pub mod text;

pub use appearance::{AppearanceBuilder, AppearanceOptions, AppearanceStream, StampFont};
pub use byterange::{ByteRangePatcher, ContentsWindow, PatchedByteRange};
pub use contents::embed_signature;
pub use error::PdfError;
pub use fields::{find_signature_fields, SignatureField, SignatureValue};
pub use parser::PdfDocument;
pub use preparer::{PlaceholderOptions, PreparedSignature, SignatureDetails, SignaturePreparer};
