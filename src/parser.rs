// Copyright (c) 2018 Fabian Schuiki

//! A parser for DTDs.
//!
//! The parser is a recursive descent over the tokens produced by the
//! scanner. It registers parameter entities in the entity table as soon as
//! their declaration is complete, so that the scanner can expand them in
//! everything that follows, and accumulates all other declarations in a
//! `DocumentType`.

use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::entity::{EntityKind, EntityTable};
use crate::error::{Error, Result};
use crate::model::{
    AttributeDef, AttributeType, ContentSpec, DefaultDecl, DocumentType, EntityDef, ExternalId,
    Notation, Occurrence, Particle, ProcessingInstruction, Term,
};
use crate::scanner::{Keyword, Lexeme, Location, Scanner, Token};

/// Parser configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Resolve relative references of the top-level DTD against this
    /// directory instead of the one containing the DTD.
    pub base_path: Option<PathBuf>,
    /// Keep processing instructions in the document type instead of
    /// discarding them.
    pub keep_processing_instructions: bool,
}

/// Parse a DTD file.
pub fn parse_file<P: AsRef<Path>>(path: P, options: &Options) -> Result<DocumentType> {
    let path = path.as_ref();
    debug!("parsing {}", path.display());
    let scanner = Scanner::open(path)?;
    Parser::new(scanner, options)?.parse()
}

/// Parse a DTD held in memory.
///
/// `name` is used in error locations. Relative references resolve against
/// `options.base_path`, or the current directory if it is not set.
pub fn parse_str(name: &str, text: &str, options: &Options) -> Result<DocumentType> {
    let scanner = Scanner::from_text(name, text, PathBuf::from("."));
    Parser::new(scanner, options)?.parse()
}

/// The state of a single parse.
///
/// Owns the scanner with its source stack, the parameter entity table and
/// the document type under construction. Consumed by `parse`, so nothing
/// survives a failed parse.
pub struct Parser {
    scanner: Scanner,
    entities: EntityTable,
    model: DocumentType,
    keep_pis: bool,
    peeked: Option<Lexeme>,
    /// The sources the currently open `INCLUDE` sections started in.
    sections: Vec<(usize, Location)>,
}

/// The definition part of an entity declaration.
enum Definition {
    Literal(String),
    External(ExternalId, Option<String>),
}

fn unexpected(lex: &Lexeme, expected: &str) -> Error {
    Error::Grammar {
        location: lex.location.clone(),
        found: lex.token.to_string(),
        expected: expected.to_owned(),
    }
}

impl Parser {
    /// Create a new parser reading from a scanner.
    pub fn new(mut scanner: Scanner, options: &Options) -> Result<Parser> {
        if let Some(ref base) = options.base_path {
            scanner.set_base_path(base.clone())?;
        }
        Ok(Parser {
            scanner,
            entities: EntityTable::new(),
            model: DocumentType::new(),
            keep_pis: options.keep_processing_instructions,
            peeked: None,
            sections: Vec::new(),
        })
    }

    /// Parse the entire input and return the document type.
    pub fn parse(mut self) -> Result<DocumentType> {
        self.parse_subset()?;
        debug!(
            "parsed {} elements, {} attribute lists, {} entities, {} parameter entities",
            self.model.elements().len(),
            self.model.attribute_lists().len(),
            self.model.entities().len(),
            self.entities.len()
        );
        let Parser {
            entities,
            mut model,
            ..
        } = self;
        model.set_parameter_entities(entities);
        Ok(model)
    }

    fn next(&mut self) -> Result<Lexeme> {
        match self.peeked.take() {
            Some(lex) => Ok(lex),
            None => self.scanner.next_token(&self.entities),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        let lex = match self.peeked.take() {
            Some(lex) => lex,
            None => self.scanner.next_token(&self.entities)?,
        };
        Ok(&self.peeked.get_or_insert(lex).token)
    }

    fn expect_name(&mut self, expected: &str) -> Result<(String, Location)> {
        let lex = self.next()?;
        match lex.token {
            Token::Name(ref name) => Ok((name.clone(), lex.location.clone())),
            _ => Err(unexpected(&lex, expected)),
        }
    }

    fn expect_literal(&mut self, expected: &str) -> Result<String> {
        let lex = self.next()?;
        match lex.token {
            Token::Literal(ref lit) => Ok(lit.clone()),
            _ => Err(unexpected(&lex, expected)),
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<Lexeme> {
        let lex = self.next()?;
        if lex.token != token {
            return Err(unexpected(&lex, expected));
        }
        Ok(lex)
    }

    /// Consume the `>` of a declaration opened by `open`.
    fn expect_close(&mut self, open: &Lexeme) -> Result<()> {
        let lex = self.expect(Token::Close, "`>`")?;
        if lex.source != open.source {
            return Err(Error::Grammar {
                location: lex.location,
                found: lex.token.to_string(),
                expected: format!(
                    "the declaration opened at {} to end in the same entity",
                    open.location
                ),
            });
        }
        Ok(())
    }

    /// Parse declarations until the end of the top-level source.
    fn parse_subset(&mut self) -> Result<()> {
        loop {
            let lex = self.next()?;
            match lex.token {
                Token::Eof => {
                    if let Some(&(_, ref location)) = self.sections.last() {
                        return Err(Error::Grammar {
                            location: lex.location.clone(),
                            found: lex.token.to_string(),
                            expected: format!("`]]>` closing the section opened at {}", location),
                        });
                    }
                    return Ok(());
                }
                Token::Decl(kw) => self.parse_decl(kw, &lex)?,
                Token::CondOpen => self.parse_conditional(&lex)?,
                Token::CondClose => match self.sections.pop() {
                    Some((source, _)) if source == lex.source => (),
                    Some((_, location)) => {
                        return Err(Error::Grammar {
                            location: lex.location.clone(),
                            found: lex.token.to_string(),
                            expected: format!(
                                "the section opened at {} to end in the same entity",
                                location
                            ),
                        })
                    }
                    None => return Err(unexpected(&lex, "a markup declaration")),
                },
                Token::Comment(_) => (),
                Token::Pi {
                    ref target,
                    ref data,
                } => {
                    // `<?xml ...?>` is a text declaration, not an instruction.
                    if self.keep_pis && !target.eq_ignore_ascii_case("xml") {
                        self.model.add_processing_instruction(ProcessingInstruction {
                            target: target.clone(),
                            data: data.clone(),
                        });
                    } else {
                        trace!("discarding processing instruction `{}`", target);
                    }
                }
                _ => return Err(unexpected(&lex, "a markup declaration")),
            }
        }
    }

    fn parse_conditional(&mut self, open: &Lexeme) -> Result<()> {
        let (keyword, location) = self.expect_name("`INCLUDE` or `IGNORE`")?;
        let bracket = self.expect(Token::LBracket, "`[`")?;
        if bracket.source != open.source {
            return Err(Error::Grammar {
                location: bracket.location,
                found: bracket.token.to_string(),
                expected: format!("`[` in the same entity as the `<![` at {}", open.location),
            });
        }
        match keyword.as_str() {
            "INCLUDE" => self.sections.push((open.source, open.location.clone())),
            "IGNORE" => {
                debug!("skipping ignored section at {}", open.location);
                self.scanner.skip_ignored_section()?;
            }
            _ => {
                return Err(Error::Grammar {
                    location,
                    found: format!("name `{}`", keyword),
                    expected: "`INCLUDE` or `IGNORE`".into(),
                })
            }
        }
        Ok(())
    }

    fn parse_decl(&mut self, kw: Keyword, open: &Lexeme) -> Result<()> {
        match kw {
            Keyword::Element => self.parse_element(open),
            Keyword::Attlist => self.parse_attlist(open),
            Keyword::Entity => self.parse_entity(open),
            Keyword::Notation => self.parse_notation(open),
        }
    }

    fn parse_element(&mut self, open: &Lexeme) -> Result<()> {
        let (name, _) = self.expect_name("an element name")?;
        let spec = self.parse_content_spec()?;
        self.expect_close(open)?;
        if !self.model.add_element(name.clone(), spec) {
            debug!("ignoring redeclaration of element `{}`", name);
        }
        Ok(())
    }

    fn parse_content_spec(&mut self) -> Result<ContentSpec> {
        let lex = self.next()?;
        match lex.token {
            Token::Name(ref kw) if kw == "EMPTY" => Ok(ContentSpec::Empty),
            Token::Name(ref kw) if kw == "ANY" => Ok(ContentSpec::Any),
            Token::LParen => {
                let mixed = match *self.peek()? {
                    Token::Hash(ref kw) => kw == "PCDATA",
                    _ => false,
                };
                if mixed {
                    self.next()?;
                    self.parse_mixed()
                } else {
                    self.parse_group().map(ContentSpec::Children)
                }
            }
            _ => Err(unexpected(&lex, "`EMPTY`, `ANY` or `(`")),
        }
    }

    /// Parse the rest of a mixed content model after `(#PCDATA`.
    fn parse_mixed(&mut self) -> Result<ContentSpec> {
        let mut names: Vec<String> = Vec::new();
        loop {
            let lex = self.next()?;
            match lex.token {
                Token::Pipe => {
                    let (name, _) = self.expect_name("an element name")?;
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                Token::RParen => break,
                _ => return Err(unexpected(&lex, "`|` or `)`")),
            }
        }
        if names.is_empty() {
            if *self.peek()? == Token::Star {
                self.next()?;
            }
        } else {
            self.expect(Token::Star, "`*` after a mixed content model")?;
        }
        Ok(ContentSpec::Mixed(names))
    }

    /// Parse the rest of a group after its `(`.
    fn parse_group(&mut self) -> Result<Particle> {
        let mut items = vec![self.parse_particle()?];
        let mut separator: Option<Token> = None;
        loop {
            let lex = self.next()?;
            match lex.token {
                Token::RParen => break,
                Token::Pipe | Token::Comma => {
                    match separator {
                        None => separator = Some(lex.token.clone()),
                        Some(ref sep) if *sep == lex.token => (),
                        Some(ref sep) => {
                            return Err(unexpected(&lex, &format!("{} or `)`", sep)));
                        }
                    }
                    items.push(self.parse_particle()?);
                }
                _ => return Err(unexpected(&lex, "`,`, `|` or `)`")),
            }
        }
        let term = match separator {
            Some(Token::Pipe) => Term::Choice(items),
            _ => Term::Seq(items),
        };
        Ok(Particle {
            term,
            occurrence: self.parse_occurrence()?,
        })
    }

    fn parse_particle(&mut self) -> Result<Particle> {
        let lex = self.next()?;
        match lex.token {
            Token::Name(ref name) => Ok(Particle {
                term: Term::Name(name.clone()),
                occurrence: self.parse_occurrence()?,
            }),
            Token::LParen => self.parse_group(),
            _ => Err(unexpected(&lex, "an element name or `(`")),
        }
    }

    fn parse_occurrence(&mut self) -> Result<Occurrence> {
        let occurrence = match *self.peek()? {
            Token::Question => Occurrence::Optional,
            Token::Star => Occurrence::ZeroOrMore,
            Token::Plus => Occurrence::OneOrMore,
            _ => return Ok(Occurrence::Once),
        };
        self.next()?;
        Ok(occurrence)
    }

    fn parse_attlist(&mut self, open: &Lexeme) -> Result<()> {
        let (element, _) = self.expect_name("an element name")?;
        let mut defs = Vec::new();
        loop {
            if *self.peek()? == Token::Close {
                self.expect_close(open)?;
                break;
            }
            let (name, _) = self.expect_name("an attribute name or `>`")?;
            let ty = self.parse_attribute_type()?;
            let default = self.parse_default_decl()?;
            defs.push((name, AttributeDef { ty, default }));
        }
        let list = self.model.attribute_list_mut(element.clone());
        for (name, def) in defs {
            if list.contains_key(&name) {
                debug!("ignoring redefinition of attribute `{}` on `{}`", name, element);
                continue;
            }
            list.insert(name, def);
        }
        Ok(())
    }

    fn parse_attribute_type(&mut self) -> Result<AttributeType> {
        let lex = self.next()?;
        let ty = match lex.token {
            Token::LParen => return self.parse_name_list().map(AttributeType::Enumeration),
            Token::Name(ref kw) => match kw.as_str() {
                "CDATA" => AttributeType::CData,
                "ID" => AttributeType::Id,
                "IDREF" => AttributeType::IdRef,
                "IDREFS" => AttributeType::IdRefs,
                "ENTITY" => AttributeType::Entity,
                "ENTITIES" => AttributeType::Entities,
                "NMTOKEN" => AttributeType::NmToken,
                "NMTOKENS" => AttributeType::NmTokens,
                "NOTATION" => {
                    self.expect(Token::LParen, "`(`")?;
                    return self.parse_name_list().map(AttributeType::Notation);
                }
                _ => return Err(unexpected(&lex, "an attribute type")),
            },
            _ => return Err(unexpected(&lex, "an attribute type")),
        };
        Ok(ty)
    }

    /// Parse the rest of an enumeration after its `(`.
    fn parse_name_list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        loop {
            let (name, _) = self.expect_name("a name token")?;
            names.push(name);
            let lex = self.next()?;
            match lex.token {
                Token::Pipe => (),
                Token::RParen => return Ok(names),
                _ => return Err(unexpected(&lex, "`|` or `)`")),
            }
        }
    }

    fn parse_default_decl(&mut self) -> Result<DefaultDecl> {
        let lex = self.next()?;
        match lex.token {
            Token::Literal(ref value) => Ok(DefaultDecl::Value(value.clone())),
            Token::Hash(ref kw) if kw == "REQUIRED" => Ok(DefaultDecl::Required),
            Token::Hash(ref kw) if kw == "IMPLIED" => Ok(DefaultDecl::Implied),
            Token::Hash(ref kw) if kw == "FIXED" => self
                .expect_literal("a default value")
                .map(DefaultDecl::Fixed),
            _ => Err(unexpected(
                &lex,
                "`#REQUIRED`, `#IMPLIED`, `#FIXED` or a default value",
            )),
        }
    }

    fn parse_entity(&mut self, open: &Lexeme) -> Result<()> {
        let parameter = *self.peek()? == Token::Percent;
        if parameter {
            self.next()?;
        }
        let (name, location) = self.expect_name("an entity name")?;
        let lex = self.next()?;
        let def = match lex.token {
            Token::Literal(ref value) => Definition::Literal(value.clone()),
            Token::Name(ref kw) if kw == "SYSTEM" || kw == "PUBLIC" => {
                let id = self.parse_external_id(kw == "PUBLIC")?;
                let is_ndata = match *self.peek()? {
                    Token::Name(ref kw) => kw == "NDATA",
                    _ => false,
                };
                let notation = if is_ndata && !parameter {
                    self.next()?;
                    Some(self.expect_name("a notation name")?.0)
                } else {
                    None
                };
                Definition::External(id, notation)
            }
            _ => return Err(unexpected(&lex, "a literal, `SYSTEM` or `PUBLIC`")),
        };
        self.expect_close(open)?;

        if parameter {
            let result = match def {
                Definition::Literal(value) => self.entities.declare(&name, EntityKind::Value, value),
                Definition::External(id, _) => self.entities.declare(&name, EntityKind::Uri, id.system),
            };
            return result.map_err(|e| e.at(&location));
        }

        let def = match def {
            Definition::Literal(value) => EntityDef::Internal(
                self.entities
                    .expand_references(&value)
                    .map_err(|e| e.at(&location))?,
            ),
            Definition::External(id, None) => EntityDef::External(id),
            Definition::External(id, Some(notation)) => EntityDef::Unparsed { id, notation },
        };
        if !self.model.add_entity(name.clone(), def) {
            debug!("ignoring redeclaration of entity `{}`", name);
        }
        Ok(())
    }

    /// Parse the literals of an external identifier after `SYSTEM` or
    /// `PUBLIC`.
    fn parse_external_id(&mut self, public: bool) -> Result<ExternalId> {
        let public = if public {
            Some(self.expect_literal("a public identifier")?)
        } else {
            None
        };
        let system = self.expect_literal("a system identifier")?;
        Ok(ExternalId { public, system })
    }

    fn parse_notation(&mut self, open: &Lexeme) -> Result<()> {
        let (name, _) = self.expect_name("a notation name")?;
        let lex = self.next()?;
        let notation = match lex.token {
            Token::Name(ref kw) if kw == "SYSTEM" => Notation {
                public: None,
                system: Some(self.expect_literal("a system identifier")?),
            },
            Token::Name(ref kw) if kw == "PUBLIC" => {
                let public = self.expect_literal("a public identifier")?;
                let system = match *self.peek()? {
                    Token::Literal(_) => Some(self.expect_literal("a system identifier")?),
                    _ => None,
                };
                Notation {
                    public: Some(public),
                    system,
                }
            }
            _ => return Err(unexpected(&lex, "`SYSTEM` or `PUBLIC`")),
        };
        self.expect_close(open)?;
        if !self.model.add_notation(name.clone(), notation) {
            debug!("ignoring redeclaration of notation `{}`", name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeList;

    fn parse(input: &str) -> DocumentType {
        parse_str("test.dtd", input, &Options::default()).unwrap()
    }

    fn parse_err(input: &str) -> Error {
        match parse_str("test.dtd", input, &Options::default()) {
            Ok(dt) => panic!("expected an error, got {:?}", dt),
            Err(e) => e,
        }
    }

    fn attrs(dt: &DocumentType, element: &str) -> AttributeList {
        dt.attributes(element).cloned().unwrap_or_default()
    }

    #[test]
    fn simple1() {
        let dt = parse("<!ELEMENT hello EMPTY>");
        assert_eq!(dt.element("hello"), Some(&ContentSpec::Empty));
        assert!(!dt.has_attribute_lists());
    }

    #[test]
    fn content_models() {
        let dt = parse(
            "<!ELEMENT book (title, (para | list)*, appendix?)+>
             <!ELEMENT para (#PCDATA | em | em)*>
             <!ELEMENT title (#PCDATA)>
             <!ELEMENT any ANY>",
        );
        assert_eq!(
            dt.element("book").unwrap().to_string(),
            "(title,(para|list)*,appendix?)+"
        );
        assert_eq!(
            dt.element("para"),
            Some(&ContentSpec::Mixed(vec!["em".into()]))
        );
        assert_eq!(dt.element("title"), Some(&ContentSpec::Mixed(vec![])));
        assert_eq!(dt.element("any"), Some(&ContentSpec::Any));
        let names: Vec<_> = dt.elements().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["book", "para", "title", "any"]);
    }

    #[test]
    fn mixed_separators_rejected() {
        match parse_err("<!ELEMENT a (b, c | d)>") {
            Error::Grammar { found, .. } => assert_eq!(found, "`|`"),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn mixed_with_names_needs_star() {
        match parse_err("<!ELEMENT a (#PCDATA | b)>") {
            Error::Grammar { found, .. } => assert_eq!(found, "`>`"),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn attribute_lists() {
        let dt = parse(
            "<!ATTLIST img
                src CDATA #REQUIRED
                alt CDATA #IMPLIED
                align (left|right) 'left'
                fmt NOTATION (gif|png) #FIXED \"gif\"
                refs IDREFS #IMPLIED>",
        );
        let list = attrs(&dt, "img");
        let names: Vec<_> = list.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["src", "alt", "align", "fmt", "refs"]);
        assert_eq!(list["src"].default, DefaultDecl::Required);
        assert_eq!(
            list["align"].ty,
            AttributeType::Enumeration(vec!["left".into(), "right".into()])
        );
        assert_eq!(list["align"].default, DefaultDecl::Value("left".into()));
        assert_eq!(
            list["fmt"].ty,
            AttributeType::Notation(vec!["gif".into(), "png".into()])
        );
        assert_eq!(list["fmt"].default, DefaultDecl::Fixed("gif".into()));
        assert_eq!(list["refs"].ty, AttributeType::IdRefs);
        assert!(dt.has_attribute_lists());
    }

    #[test]
    fn attribute_lists_merge_first_wins() {
        let dt = parse(
            "<!ATTLIST a x CDATA 'one'>
             <!ATTLIST a x CDATA 'two' y ID #IMPLIED>",
        );
        let list = attrs(&dt, "a");
        assert_eq!(list.len(), 2);
        assert_eq!(list["x"].default, DefaultDecl::Value("one".into()));
        assert_eq!(list["y"].ty, AttributeType::Id);
    }

    #[test]
    fn empty_attlist_counts() {
        let dt = parse("<!ATTLIST a>");
        assert!(dt.has_attribute_lists());
        assert!(attrs(&dt, "a").is_empty());
    }

    #[test]
    fn parameter_entities_expand_in_declarations() {
        let dt = parse(
            "<!ENTITY % inline 'em | strong'>
             <!ENTITY % text '(#PCDATA | %inline;)*'>
             <!ENTITY % attrs 'class CDATA #IMPLIED'>
             <!ELEMENT p %text;>
             <!ATTLIST p %attrs; lang NMTOKEN 'en'>",
        );
        assert_eq!(
            dt.element("p"),
            Some(&ContentSpec::Mixed(vec!["em".into(), "strong".into()]))
        );
        assert_eq!(
            dt.parameter_entities().value("text"),
            Some("(#PCDATA | em | strong)*")
        );
        let names: Vec<_> = attrs(&dt, "p").keys().cloned().collect();
        assert_eq!(names, vec!["class", "lang"]);
        // `%inline;` splices two names and a `|` into the attribute list,
        // which is not a valid attribute definition.
        assert!(parse_str(
            "bad.dtd",
            "<!ENTITY % n 'a | b'><!ATTLIST p %n; CDATA #IMPLIED>",
            &Options::default()
        )
        .is_err());
    }

    #[test]
    fn whole_declaration_in_entity() {
        let dt = parse(
            "<!ENTITY % decl '<!ELEMENT x EMPTY>'>
             %decl;",
        );
        assert_eq!(dt.element("x"), Some(&ContentSpec::Empty));
    }

    #[test]
    fn parameter_entity_first_wins() {
        let dt = parse(
            "<!ENTITY % c 'EMPTY'>
             <!ENTITY % c 'ANY'>
             <!ELEMENT x %c;>",
        );
        assert_eq!(dt.element("x"), Some(&ContentSpec::Empty));
    }

    #[test]
    fn no_forward_references() {
        let err = parse_err(
            "<!ELEMENT x %c;>
             <!ENTITY % c 'EMPTY'>",
        );
        match err.root() {
            Error::UndeclaredEntity(name) => assert_eq!(name, "c"),
            e => panic!("unexpected {:?}", e),
        }
        assert_eq!(err.location().unwrap().line, 1);
    }

    #[test]
    fn general_entities() {
        let dt = parse(
            "<!ENTITY % year '2018'>
             <!ENTITY copy 'Copyright %year; &amp; later'>
             <!ENTITY chap1 SYSTEM 'chap1.xml'>
             <!ENTITY logo PUBLIC '-//ACME//Logo' 'logo.gif' NDATA gif>
             <!ENTITY copy 'ignored'>",
        );
        let names: Vec<_> = dt.entities().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["copy", "chap1", "logo"]);
        assert_eq!(
            dt.entities()["copy"],
            EntityDef::Internal("Copyright 2018 &amp; later".into())
        );
        assert_eq!(
            dt.entities()["chap1"],
            EntityDef::External(ExternalId {
                public: None,
                system: "chap1.xml".into(),
            })
        );
        assert_eq!(
            dt.entities()["logo"],
            EntityDef::Unparsed {
                id: ExternalId {
                    public: Some("-//ACME//Logo".into()),
                    system: "logo.gif".into(),
                },
                notation: "gif".into(),
            }
        );
    }

    #[test]
    fn parameter_entity_ndata_rejected() {
        match parse_err("<!ENTITY % p SYSTEM 'p.ent' NDATA gif>") {
            Error::Grammar { found, expected, .. } => {
                assert_eq!(found, "name `NDATA`");
                assert_eq!(expected, "`>`");
            }
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn invalid_parameter_entity_name() {
        match parse_err("<!ENTITY % 1st 'x'>").root() {
            Error::InvalidEntity(_) => (),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn notations() {
        let dt = parse(
            "<!NOTATION gif SYSTEM 'image/gif'>
             <!NOTATION jpeg PUBLIC 'JPEG'>
             <!NOTATION png PUBLIC 'PNG' 'image/png'>",
        );
        assert_eq!(
            dt.notations()["jpeg"],
            Notation {
                public: Some("JPEG".into()),
                system: None,
            }
        );
        assert_eq!(dt.notations()["png"].system, Some("image/png".into()));
        assert_eq!(dt.notations().len(), 3);
    }

    #[test]
    fn conditional_sections() {
        let dt = parse(
            "<!ENTITY % draft 'INCLUDE'>
             <!ENTITY % final 'IGNORE'>
             <![%draft;[
               <!ELEMENT note (#PCDATA)>
               <![%final;[ <!ELEMENT gone EMPTY> ]]>
             ]]>
             <![IGNORE[ <!ELEMENT %undeclared; ]]>
             <!ELEMENT kept EMPTY>",
        );
        let names: Vec<_> = dt.elements().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["note", "kept"]);
    }

    #[test]
    fn unterminated_include() {
        match parse_err("<![INCLUDE[ <!ELEMENT a EMPTY>") {
            Error::Grammar { found, .. } => assert_eq!(found, "end of input"),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn stray_section_end() {
        match parse_err("<!ELEMENT a EMPTY> ]]>") {
            Error::Grammar { found, .. } => assert_eq!(found, "`]]>`"),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn unknown_section_keyword() {
        match parse_err("<![MAYBE[ ]]>") {
            Error::Grammar { found, .. } => assert_eq!(found, "name `MAYBE`"),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn declaration_must_close_in_its_entity() {
        let err = parse_err(
            "<!ENTITY % open '<!ELEMENT a EMPTY'>
             %open;>",
        );
        match err {
            Error::Grammar { location, found, .. } => {
                assert_eq!(found, "`>`");
                assert_eq!(location.source, "test.dtd");
            }
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn declaration_split_over_sibling_entities() {
        let err = parse_err(
            "<!ENTITY % p '<!ELEMENT a EMPTY'>
             <!ENTITY % q '>'>
             %p;%q;",
        );
        match err {
            Error::Grammar { location, found, .. } => {
                assert_eq!(found, "`>`");
                assert_eq!(location.source, "%q;");
            }
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn section_split_over_sibling_entities() {
        let err = parse_err(
            "<!ENTITY % o '<![INCLUDE[ <!ELEMENT a EMPTY>'>
             <!ENTITY % c ']]>'>
             %o;%c;",
        );
        match err {
            Error::Grammar { location, found, .. } => {
                assert_eq!(found, "`]]>`");
                assert_eq!(location.source, "%c;");
            }
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn section_within_one_entity() {
        let dt = parse(
            "<!ENTITY % whole '<![INCLUDE[ <!ELEMENT a EMPTY> ]]>'>
             %whole;%whole;",
        );
        assert_eq!(dt.element("a"), Some(&ContentSpec::Empty));
    }

    #[test]
    fn missing_terminator_at_end() {
        match parse_err("<!ENTITY % open '<!ELEMENT a EMPTY'> %open;") {
            Error::Grammar { found, .. } => assert_eq!(found, "end of input"),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn processing_instructions() {
        let input = "<?xml version='1.0'?><?gen skip?><!ELEMENT a EMPTY>";
        let dt = parse(input);
        assert!(dt.processing_instructions().is_empty());
        let options = Options {
            keep_processing_instructions: true,
            ..Options::default()
        };
        let dt = parse_str("test.dtd", input, &options).unwrap();
        let targets: Vec<_> = dt
            .processing_instructions()
            .iter()
            .map(|pi| pi.target.as_str())
            .collect();
        assert_eq!(targets, vec!["gen"]);
    }

    #[test]
    fn text_declarations_in_entities_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("mod.ent"),
            "<?xml version='1.0' encoding='UTF-8'?>\n<?gen from-module?>\n<!ELEMENT m EMPTY>",
        )
        .unwrap();
        let options = Options {
            base_path: Some(dir.path().to_path_buf()),
            keep_processing_instructions: true,
        };
        let dt = parse_str(
            "test.dtd",
            "<!ENTITY % mod SYSTEM 'mod.ent'> %mod;",
            &options,
        )
        .unwrap();
        let pis: Vec<_> = dt
            .processing_instructions()
            .iter()
            .map(|pi| (pi.target.as_str(), pi.data.as_str()))
            .collect();
        assert_eq!(pis, vec![("gen", "from-module")]);
        assert!(dt.element("m").is_some());
    }

    #[test]
    fn unexpected_token() {
        match parse_err("<!ELEMENT a EMPTY>\n(") {
            Error::Grammar {
                location,
                found,
                expected,
            } => {
                assert_eq!(location, Location::new("test.dtd", 2, 1));
                assert_eq!(found, "`(`");
                assert_eq!(expected, "a markup declaration");
            }
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn invalid_base_path() {
        let options = Options {
            base_path: Some(PathBuf::from("/definitely/not/here")),
            ..Options::default()
        };
        match parse_str("test.dtd", "", &options) {
            Err(Error::Configuration(_)) => (),
            r => panic!("unexpected {:?}", r),
        }
    }
}
