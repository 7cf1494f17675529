// Copyright (c) 2018 Fabian Schuiki

//! Data structures representing a document type.
//!
//! A `DocumentType` is built by the parser and handed to generators
//! read-only. All maps preserve the order in which names were first
//! declared.

use std::fmt;

use indexmap::IndexMap;

use crate::entity::EntityTable;

/// The declarations of a DTD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentType {
    elements: IndexMap<String, ContentSpec>,
    attlists: IndexMap<String, AttributeList>,
    entities: IndexMap<String, EntityDef>,
    notations: IndexMap<String, Notation>,
    pis: Vec<ProcessingInstruction>,
    parameter_entities: EntityTable,
}

/// The attribute definitions of one element, keyed by attribute name.
pub type AttributeList = IndexMap<String, AttributeDef>;

/// The content an element may have.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentSpec {
    /// `EMPTY`
    Empty,
    /// `ANY`
    Any,
    /// Character data interleaved with the listed elements.
    Mixed(Vec<String>),
    /// Child elements only, structured by a content particle.
    Children(Particle),
}

/// A content particle of an element-only content model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Particle {
    /// What the particle matches.
    pub term: Term,
    /// How often it may match.
    pub occurrence: Occurrence,
}

/// The structure of a content particle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A single child element.
    Name(String),
    /// Particles in order, separated by `,`.
    Seq(Vec<Particle>),
    /// One of the particles, separated by `|`.
    Choice(Vec<Particle>),
}

/// The occurrence indicator of a content particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    /// Exactly once (no indicator).
    Once,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

/// An attribute definition within an `ATTLIST`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDef {
    /// The type of the attribute value.
    pub ty: AttributeType,
    /// Whether the attribute is required and what its default is.
    pub default: DefaultDecl,
}

/// The declared type of an attribute.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    /// `NOTATION (a|b)`
    Notation(Vec<String>),
    /// `(a|b)`
    Enumeration(Vec<String>),
}

/// The default declaration of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefaultDecl {
    /// `#REQUIRED`
    Required,
    /// `#IMPLIED`
    Implied,
    /// `#FIXED "value"`
    Fixed(String),
    /// `"value"`
    Value(String),
}

/// A general entity declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityDef {
    /// An entity with a literal replacement text.
    Internal(String),
    /// An external parsed entity.
    External(ExternalId),
    /// An external unparsed entity with its notation.
    Unparsed {
        /// Where the entity's content lives.
        id: ExternalId,
        /// The notation the content is in.
        notation: String,
    },
}

/// The public and system identifier of an external resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId {
    /// The optional public identifier.
    pub public: Option<String>,
    /// The system identifier, a path or URI.
    pub system: String,
}

/// A notation declaration. At least one of the identifiers is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notation {
    /// The public identifier.
    pub public: Option<String>,
    /// The system identifier.
    pub system: Option<String>,
}

/// A processing instruction kept from the DTD.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessingInstruction {
    /// The target name.
    pub target: String,
    /// The instruction's data.
    pub data: String,
}

impl DocumentType {
    /// Create a new empty document type.
    pub fn new() -> DocumentType {
        DocumentType::default()
    }

    /// The element declarations in declaration order.
    pub fn elements(&self) -> &IndexMap<String, ContentSpec> {
        &self.elements
    }

    /// The content of a declared element.
    pub fn element(&self, name: &str) -> Option<&ContentSpec> {
        self.elements.get(name)
    }

    /// The attribute lists, keyed by element name, in declaration order.
    pub fn attribute_lists(&self) -> &IndexMap<String, AttributeList> {
        &self.attlists
    }

    /// The attributes declared for an element.
    pub fn attributes(&self, element: &str) -> Option<&AttributeList> {
        self.attlists.get(element)
    }

    /// Whether the DTD contains at least one `ATTLIST`.
    pub fn has_attribute_lists(&self) -> bool {
        !self.attlists.is_empty()
    }

    /// The general entity declarations in declaration order.
    pub fn entities(&self) -> &IndexMap<String, EntityDef> {
        &self.entities
    }

    /// The notation declarations in declaration order.
    pub fn notations(&self) -> &IndexMap<String, Notation> {
        &self.notations
    }

    /// The processing instructions kept while parsing.
    pub fn processing_instructions(&self) -> &[ProcessingInstruction] {
        &self.pis
    }

    /// The parameter entities declared while parsing.
    pub fn parameter_entities(&self) -> &EntityTable {
        &self.parameter_entities
    }

    /// Add an element declaration. Returns `false` if the element was
    /// already declared, in which case the first declaration is kept.
    pub(crate) fn add_element(&mut self, name: String, spec: ContentSpec) -> bool {
        if self.elements.contains_key(&name) {
            return false;
        }
        self.elements.insert(name, spec);
        true
    }

    /// Open the attribute list of an element, creating it if needed.
    pub(crate) fn attribute_list_mut(&mut self, element: String) -> &mut AttributeList {
        self.attlists.entry(element).or_insert_with(IndexMap::new)
    }

    /// Add a general entity. Returns `false` if it was already declared.
    pub(crate) fn add_entity(&mut self, name: String, def: EntityDef) -> bool {
        if self.entities.contains_key(&name) {
            return false;
        }
        self.entities.insert(name, def);
        true
    }

    /// Add a notation. Returns `false` if it was already declared.
    pub(crate) fn add_notation(&mut self, name: String, notation: Notation) -> bool {
        if self.notations.contains_key(&name) {
            return false;
        }
        self.notations.insert(name, notation);
        true
    }

    pub(crate) fn add_processing_instruction(&mut self, pi: ProcessingInstruction) {
        self.pis.push(pi);
    }

    pub(crate) fn set_parameter_entities(&mut self, table: EntityTable) {
        self.parameter_entities = table;
    }
}

impl ContentSpec {
    /// The names of the child elements this content mentions, in order of
    /// first appearance.
    pub fn child_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        match *self {
            ContentSpec::Empty | ContentSpec::Any => (),
            ContentSpec::Mixed(ref list) => {
                for name in list {
                    if !names.contains(&name.as_str()) {
                        names.push(name.as_str());
                    }
                }
            }
            ContentSpec::Children(ref p) => p.collect_names(&mut names),
        }
        names
    }
}

impl Particle {
    /// Create a particle matching a single element.
    pub fn name<S: Into<String>>(name: S, occurrence: Occurrence) -> Particle {
        Particle {
            term: Term::Name(name.into()),
            occurrence,
        }
    }

    fn collect_names<'a>(&'a self, into: &mut Vec<&'a str>) {
        match self.term {
            Term::Name(ref name) => {
                if !into.contains(&name.as_str()) {
                    into.push(name.as_str());
                }
            }
            Term::Seq(ref ps) | Term::Choice(ref ps) => {
                for p in ps {
                    p.collect_names(into);
                }
            }
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Occurrence::Once => Ok(()),
            Occurrence::Optional => write!(f, "?"),
            Occurrence::ZeroOrMore => write!(f, "*"),
            Occurrence::OneOrMore => write!(f, "+"),
        }
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.term {
            Term::Name(ref name) => write!(f, "{}", name)?,
            Term::Seq(ref ps) => write_group(f, ps, ",")?,
            Term::Choice(ref ps) => write_group(f, ps, "|")?,
        }
        write!(f, "{}", self.occurrence)
    }
}

fn write_group(f: &mut fmt::Formatter, ps: &[Particle], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in ps.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", p)?;
    }
    write!(f, ")")
}

impl fmt::Display for ContentSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ContentSpec::Empty => write!(f, "EMPTY"),
            ContentSpec::Any => write!(f, "ANY"),
            ContentSpec::Mixed(ref names) if names.is_empty() => write!(f, "(#PCDATA)"),
            ContentSpec::Mixed(ref names) => {
                write!(f, "(#PCDATA")?;
                for name in names {
                    write!(f, "|{}", name)?;
                }
                write!(f, ")*")
            }
            ContentSpec::Children(ref p) => write!(f, "{}", p),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AttributeType::CData => write!(f, "CDATA"),
            AttributeType::Id => write!(f, "ID"),
            AttributeType::IdRef => write!(f, "IDREF"),
            AttributeType::IdRefs => write!(f, "IDREFS"),
            AttributeType::Entity => write!(f, "ENTITY"),
            AttributeType::Entities => write!(f, "ENTITIES"),
            AttributeType::NmToken => write!(f, "NMTOKEN"),
            AttributeType::NmTokens => write!(f, "NMTOKENS"),
            AttributeType::Notation(ref names) => write!(f, "NOTATION ({})", names.join("|")),
            AttributeType::Enumeration(ref names) => write!(f, "({})", names.join("|")),
        }
    }
}

impl fmt::Display for DefaultDecl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DefaultDecl::Required => write!(f, "#REQUIRED"),
            DefaultDecl::Implied => write!(f, "#IMPLIED"),
            DefaultDecl::Fixed(ref v) => write!(f, "#FIXED {}", quote(v)),
            DefaultDecl::Value(ref v) => write!(f, "{}", quote(v)),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.public {
            Some(ref public) => write!(f, "PUBLIC {} {}", quote(public), quote(&self.system)),
            None => write!(f, "SYSTEM {}", quote(&self.system)),
        }
    }
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.public, &self.system) {
            (Some(public), Some(system)) => write!(f, "PUBLIC {} {}", quote(public), quote(system)),
            (Some(public), None) => write!(f, "PUBLIC {}", quote(public)),
            (None, Some(system)) => write!(f, "SYSTEM {}", quote(system)),
            (None, None) => Ok(()),
        }
    }
}

impl fmt::Display for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EntityDef::Internal(ref value) => write!(f, "{}", quote(value)),
            EntityDef::External(ref id) => write!(f, "{}", id),
            EntityDef::Unparsed { ref id, ref notation } => write!(f, "{} NDATA {}", id, notation),
        }
    }
}

/// Quote a literal, preferring double quotes.
/// Quote a literal, preferring `"`. A value holding both quote characters
/// gets its `"` written as a character reference.
fn quote(s: &str) -> String {
    match (s.contains('"'), s.contains('\'')) {
        (true, false) => format!("'{}'", s),
        (true, true) => format!("\"{}\"", s.replace('"', "&#34;")),
        _ => format!("\"{}\"", s),
    }
}

fn write_attlist(f: &mut fmt::Formatter, element: &str, list: &AttributeList) -> fmt::Result {
    write!(f, "<!ATTLIST {}", element)?;
    for (name, def) in list {
        write!(f, "\n  {} {} {}", name, def.ty, def.default)?;
    }
    writeln!(f, ">")
}

/// Renders the document type as a normalized DTD.
impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in self.parameter_entities.values() {
            writeln!(f, "<!ENTITY % {} {}>", name, quote(value))?;
        }
        for (name, system) in self.parameter_entities.uris() {
            writeln!(f, "<!ENTITY % {} SYSTEM {}>", name, quote(system))?;
        }
        for (name, notation) in &self.notations {
            writeln!(f, "<!NOTATION {} {}>", name, notation)?;
        }
        for (name, def) in &self.entities {
            writeln!(f, "<!ENTITY {} {}>", name, def)?;
        }
        for (name, spec) in &self.elements {
            writeln!(f, "<!ELEMENT {} {}>", name, spec)?;
            if let Some(list) = self.attlists.get(name) {
                write_attlist(f, name, list)?;
            }
        }
        for (name, list) in &self.attlists {
            if !self.elements.contains_key(name) {
                write_attlist(f, name, list)?;
            }
        }
        for pi in &self.pis {
            writeln!(f, "<?{} {}?>", pi.target, pi.data)?;
        }
        Ok(())
    }
}
