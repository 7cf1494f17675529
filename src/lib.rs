// Copyright (c) 2018 Fabian Schuiki

//! A DTD grammar compiler front end.
//!
//! The crate reads a document type definition, expands its parameter
//! entities and conditional sections, and assembles the declarations into a
//! `DocumentType`. Generators turn the document type into SAX handler or
//! XSLT skeletons, or print it back as a normalized DTD.

#![deny(missing_docs)]

pub mod entity;
pub mod error;
pub mod generate;
pub mod model;
pub mod name;
pub mod parser;
pub mod scanner;

pub use crate::error::{Error, Result};
pub use crate::model::DocumentType;
pub use crate::parser::{parse_file, parse_str, Options};
