// Copyright (c) 2018 Fabian Schuiki

//! Errors that can occur while compiling a DTD.

use std::io;

use thiserror::Error;

use crate::scanner::Location;

/// An error that aborts a parse or a generator run.
#[derive(Error, Debug)]
pub enum Error {
    /// An entity declaration with malformed arguments.
    #[error("invalid entity declaration: {0}")]
    InvalidEntity(String),

    /// A reference to a well-formed but never declared parameter entity.
    #[error("undeclared parameter entity `%{0};`")]
    UndeclaredEntity(String),

    /// A declared external parameter entity whose content cannot be opened.
    #[error("cannot resolve parameter entity `%{name};` ({target}): {reason}")]
    UnresolvedReference {
        /// The name of the entity.
        name: String,
        /// The system identifier the entity was declared with.
        target: String,
        /// Why the last resolution attempt failed.
        reason: String,
    },

    /// A parameter entity that is expanded within its own replacement text.
    #[error("parameter entity `%{0};` references itself")]
    CyclicEntity(String),

    /// Malformed characters in the input, such as an unterminated literal.
    #[error("{location}: {message}")]
    Lexical {
        /// Where the problem starts.
        location: Location,
        /// What is wrong.
        message: String,
    },

    /// An unexpected token in a declaration.
    #[error("{location}: found {found}, expected {expected}")]
    Grammar {
        /// The location of the offending token.
        location: Location,
        /// The offending token.
        found: String,
        /// What the grammar expected instead.
        expected: String,
    },

    /// An invalid parser or generator configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A malformed template or a template referring to an unknown variable.
    #[error("template error: {0}")]
    Template(String),

    /// An error raised at a specific location of the input.
    #[error("{location}: {source}")]
    At {
        /// The location of the entity reference that failed.
        location: Location,
        /// The underlying error.
        source: Box<Error>,
    },

    /// An I/O error outside of entity resolution.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach a location to this error.
    ///
    /// Errors that already carry a location are returned unchanged.
    pub fn at(self, location: &Location) -> Error {
        match self {
            e @ Error::Lexical { .. } | e @ Error::Grammar { .. } | e @ Error::At { .. } => e,
            e => Error::At {
                location: location.clone(),
                source: Box::new(e),
            },
        }
    }

    /// The innermost error, looking through location wrappers.
    pub fn root(&self) -> &Error {
        match *self {
            Error::At { ref source, .. } => source.root(),
            ref e => e,
        }
    }

    /// The location this error was raised at, if known.
    pub fn location(&self) -> Option<&Location> {
        match *self {
            Error::Lexical { ref location, .. }
            | Error::Grammar { ref location, .. }
            | Error::At { ref location, .. } => Some(location),
            _ => None,
        }
    }
}
