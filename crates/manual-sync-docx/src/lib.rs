//! In-memory model of a DOCX package for content synchronisation.
//!
//! [`Docx`] loads the whole archive, exposes the document body as an ordered
//! list of owned element trees, and serializes it back so that untouched
//! elements and parts keep their original bytes.

pub mod body;
pub mod error;
pub mod numbering;
pub mod package;
pub mod rels;
pub mod wordml;
pub mod xml;

pub use body::{Body, BodyElement, DOCUMENT_PART};
pub use error::{DocxError, DocxResult};
pub use numbering::{Numbering, NUMBERING_PART};
pub use package::Docx;
pub use rels::{image_content_type, ContentTypes, Relationships, IMAGE_RELATIONSHIP};
pub use xml::{Element, Node, XmlDocument};
