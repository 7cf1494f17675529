// Copyright (c) 2018 Fabian Schuiki

//! A scanner for DTD syntax.
//!
//! The scanner reads from a stack of sources. The bottom of the stack is the
//! DTD being compiled; every parameter entity reference found outside of a
//! literal pushes the entity's replacement text as a new source on top. Once a
//! source is exhausted it is popped and scanning resumes in the enclosing
//! source. Tokens never span two sources.

use std::collections::VecDeque;
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::entity::{Base, EntityReader, EntityTable, Origin};
use crate::error::{Error, Result};
use crate::name::{is_name_char, is_name_start};

/// A position within a named source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// The file, URI or entity the position refers to.
    pub source: String,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Location {
    /// Create a new location.
    pub fn new<S: Into<String>>(source: S, line: usize, column: usize) -> Location {
        Location {
            source: source.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// The tokens that may appear in a DTD.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    /// A markup declaration opener such as `<!ELEMENT`.
    Decl(Keyword),
    /// `<![`
    CondOpen,
    /// `]]>`
    CondClose,
    /// `[`
    LBracket,
    /// `>`
    Close,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `|`
    Pipe,
    /// `,`
    Comma,
    /// `?`
    Question,
    /// `*`
    Star,
    /// `+`
    Plus,
    /// A `%` that does not start a parameter entity reference.
    Percent,
    /// A `#` keyword such as `#PCDATA`, without the `#`.
    Hash(String),
    /// A name or name token.
    Name(String),
    /// A quoted literal, without the quotes.
    Literal(String),
    /// A general entity reference `&name;`, left unexpanded.
    GeneralRef(String),
    /// A comment, without the delimiters.
    Comment(String),
    /// A processing instruction.
    Pi {
        /// The target name.
        target: String,
        /// Everything after the target, trimmed.
        data: String,
    },
    /// The end of the top-level source.
    Eof,
}

/// The markup declaration keywords.
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Element,
    Attlist,
    Entity,
    Notation,
}

impl Keyword {
    /// The keyword as it appears after `<!`.
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Element => "ELEMENT",
            Keyword::Attlist => "ATTLIST",
            Keyword::Entity => "ENTITY",
            Keyword::Notation => "NOTATION",
        }
    }

    fn from_str(s: &str) -> Option<Keyword> {
        match s {
            "ELEMENT" => Some(Keyword::Element),
            "ATTLIST" => Some(Keyword::Attlist),
            "ENTITY" => Some(Keyword::Entity),
            "NOTATION" => Some(Keyword::Notation),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Token::Decl(kw) => write!(f, "`<!{}`", kw.as_str()),
            Token::CondOpen => write!(f, "`<![`"),
            Token::CondClose => write!(f, "`]]>`"),
            Token::LBracket => write!(f, "`[`"),
            Token::Close => write!(f, "`>`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::Pipe => write!(f, "`|`"),
            Token::Comma => write!(f, "`,`"),
            Token::Question => write!(f, "`?`"),
            Token::Star => write!(f, "`*`"),
            Token::Plus => write!(f, "`+`"),
            Token::Percent => write!(f, "`%`"),
            Token::Hash(ref kw) => write!(f, "`#{}`", kw),
            Token::Name(ref name) => write!(f, "name `{}`", name),
            Token::Literal(ref lit) => write!(f, "literal {:?}", lit),
            Token::GeneralRef(ref name) => write!(f, "entity reference `&{};`", name),
            Token::Comment(_) => write!(f, "comment"),
            Token::Pi { ref target, .. } => write!(f, "processing instruction `<?{}`", target),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token together with where it was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexeme {
    /// The token.
    pub token: Token,
    /// The location of the token's first character.
    pub location: Location,
    /// The number of sources on the stack when the token was read. The
    /// top-level source has depth 1; `Eof` has depth 0.
    pub depth: usize,
    /// The source the token was read from. Every source pushed on a scanner
    /// gets a new id, so two expansions of the same entity differ. `Eof`
    /// has id 0.
    pub source: usize,
}

/// A single input on the source stack.
struct Source {
    id: usize,
    name: String,
    entity: Option<String>,
    base: Base,
    reader: Box<dyn BufRead>,
    pending: VecDeque<char>,
    exhausted: bool,
    line: usize,
    column: usize,
}

impl Source {
    fn new(
        id: usize,
        name: String,
        entity: Option<String>,
        base: Base,
        reader: Box<dyn BufRead>,
    ) -> Source {
        Source {
            id,
            name,
            entity,
            base,
            reader,
            pending: VecDeque::new(),
            exhausted: false,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> Location {
        Location::new(self.name.clone(), self.line, self.column)
    }

    /// Read lines until at least `n` characters are buffered or the reader
    /// runs dry.
    fn fill(&mut self, n: usize) -> Result<()> {
        let mut line = String::new();
        while self.pending.len() < n && !self.exhausted {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => self.exhausted = true,
                Ok(_) => self.pending.extend(line.chars()),
                Err(e) => return Err(Error::from(e).at(&self.location())),
            }
        }
        Ok(())
    }

    fn peek_at(&mut self, offset: usize) -> Result<Option<char>> {
        self.fill(offset + 1)?;
        Ok(self.pending.get(offset).cloned())
    }

    fn peek(&mut self) -> Result<Option<char>> {
        self.peek_at(0)
    }

    fn starts_with(&mut self, s: &str) -> Result<bool> {
        for (i, c) in s.chars().enumerate() {
            if self.peek_at(i)? != Some(c) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn bump(&mut self) -> Result<Option<char>> {
        self.fill(1)?;
        let c = self.pending.pop_front();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => (),
        }
        Ok(c)
    }

    fn advance(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.bump()?;
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(c) = self.peek()? {
            if !c.is_whitespace() {
                break;
            }
            self.bump()?;
        }
        Ok(())
    }

    fn read_name_chars(&mut self) -> Result<String> {
        let mut buffer = String::new();
        while let Some(c) = self.peek()? {
            if !is_name_char(c) {
                break;
            }
            buffer.push(c);
            self.bump()?;
        }
        Ok(buffer)
    }

    /// Consume characters up to and including `terminator`. Returns `None` if
    /// the source runs dry before the terminator.
    fn read_until(&mut self, terminator: &str) -> Result<Option<String>> {
        let mut buffer = String::new();
        loop {
            if self.starts_with(terminator)? {
                self.advance(terminator.chars().count())?;
                return Ok(Some(buffer));
            }
            match self.bump()? {
                Some(c) => buffer.push(c),
                None => return Ok(None),
            }
        }
    }
}

/// The outcome of scanning the top source once.
enum Scanned {
    Token(Token, Location),
    Reference(String, Location),
    Exhausted,
}

fn lexical<S: Into<String>>(location: Location, message: S) -> Error {
    Error::Lexical {
        location,
        message: message.into(),
    }
}

/// Scan the next token or parameter entity reference from a single source.
fn scan(src: &mut Source) -> Result<Scanned> {
    src.skip_whitespace()?;
    let location = src.location();
    let c = match src.bump()? {
        Some(c) => c,
        None => return Ok(Scanned::Exhausted),
    };
    let token = match c {
        '[' => Token::LBracket,
        '>' => Token::Close,
        '(' => Token::LParen,
        ')' => Token::RParen,
        '|' => Token::Pipe,
        ',' => Token::Comma,
        '?' => Token::Question,
        '*' => Token::Star,
        '+' => Token::Plus,
        '%' => match src.peek()? {
            Some(c) if is_name_start(c) => {
                let name = src.read_name_chars()?;
                if src.peek()? != Some(';') {
                    return Err(lexical(
                        location,
                        format!("expected `;` after parameter entity reference `%{}`", name),
                    ));
                }
                src.bump()?;
                return Ok(Scanned::Reference(name, location));
            }
            _ => Token::Percent,
        },
        '&' => {
            let name = src.read_name_chars()?;
            if name.is_empty() || src.peek()? != Some(';') {
                return Err(lexical(location, "malformed entity reference"));
            }
            src.bump()?;
            Token::GeneralRef(name)
        }
        '#' => {
            let kw = src.read_name_chars()?;
            if kw.is_empty() {
                return Err(lexical(location, "expected a keyword after `#`"));
            }
            Token::Hash(kw)
        }
        '"' | '\'' => {
            let mut quote = [0; 4];
            match src.read_until(c.encode_utf8(&mut quote))? {
                Some(lit) => Token::Literal(lit),
                None => return Err(lexical(location, "unterminated literal")),
            }
        }
        ']' => {
            if !src.starts_with("]>")? {
                return Err(lexical(location, "unexpected `]`"));
            }
            src.advance(2)?;
            Token::CondClose
        }
        '<' => scan_markup(src, location.clone())?,
        c if is_name_char(c) => {
            let mut name = String::new();
            name.push(c);
            name.push_str(&src.read_name_chars()?);
            Token::Name(name)
        }
        c => return Err(lexical(location, format!("unexpected character `{}`", c))),
    };
    Ok(Scanned::Token(token, location))
}

/// Scan the remainder of a construct starting with `<`.
fn scan_markup(src: &mut Source, location: Location) -> Result<Token> {
    if src.starts_with("!--")? {
        src.advance(3)?;
        return match src.read_until("-->")? {
            Some(text) => Ok(Token::Comment(text)),
            None => Err(lexical(location, "unterminated comment")),
        };
    }
    if src.starts_with("![")? {
        src.advance(2)?;
        return Ok(Token::CondOpen);
    }
    match src.bump()? {
        Some('!') => {
            let kw = src.read_name_chars()?;
            match Keyword::from_str(&kw) {
                Some(kw) => Ok(Token::Decl(kw)),
                None => Err(lexical(
                    location,
                    format!("unknown markup declaration `<!{}`", kw),
                )),
            }
        }
        Some('?') => {
            let target = src.read_name_chars()?;
            if target.is_empty() {
                return Err(lexical(location, "expected a target after `<?`"));
            }
            match src.read_until("?>")? {
                Some(data) => Ok(Token::Pi {
                    target,
                    data: data.trim().to_owned(),
                }),
                None => Err(lexical(location, "unterminated processing instruction")),
            }
        }
        _ => Err(lexical(location, "unexpected `<`")),
    }
}

/// A scanner over a stack of DTD sources.
pub struct Scanner {
    stack: Vec<Source>,
    base: Base,
    end: Location,
    next_id: usize,
}

impl Scanner {
    /// Create a scanner with an empty source stack.
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Scanner {
        Scanner {
            stack: Vec::new(),
            base: Base::dir(base_path),
            end: Location::new("<none>", 1, 1),
            next_id: 1,
        }
    }

    /// Create a scanner reading a DTD file.
    ///
    /// Relative references resolve against the directory containing the
    /// file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Scanner> {
        let reader = EntityReader::open_file(path)?;
        let mut scanner = Scanner::new(".");
        scanner.push_source(reader, None)?;
        Ok(scanner)
    }

    /// Create a scanner reading an in-memory DTD.
    pub fn from_text<S, P>(name: &str, text: S, base_path: P) -> Scanner
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        let base = Base::dir(base_path);
        let reader = EntityReader::from_text(Origin::Literal(name.to_owned()), text);
        Scanner {
            stack: vec![Source::new(1, name.to_owned(), None, base.clone(), reader.reader)],
            base,
            end: Location::new(name, 1, 1),
            next_id: 2,
        }
    }

    /// Push a new source on top of the stack.
    ///
    /// `entity` names the parameter entity the source expands, if any. Fails
    /// if that entity is already being expanded further down the stack.
    pub fn push_source(&mut self, reader: EntityReader, entity: Option<&str>) -> Result<()> {
        if let Some(name) = entity {
            if self.stack.iter().any(|s| s.entity.as_ref().map(String::as_str) == Some(name)) {
                return Err(Error::CyclicEntity(name.to_owned()));
            }
        }
        let base = reader.origin.base().unwrap_or_else(|| self.base().clone());
        let name = reader.origin.to_string();
        debug!("entering {} (depth {})", name, self.stack.len() + 1);
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(Source::new(
            id,
            name,
            entity.map(str::to_owned),
            base,
            reader.reader,
        ));
        Ok(())
    }

    /// Pop the topmost source, dropping its reader.
    ///
    /// Returns `false` if the stack was already empty.
    pub fn pop_source(&mut self) -> bool {
        match self.stack.pop() {
            Some(src) => {
                debug!("leaving {} (depth {})", src.name, self.stack.len() + 1);
                self.end = src.location();
                true
            }
            None => false,
        }
    }

    /// The number of sources on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// What relative references in the current source are resolved
    /// against.
    pub fn base(&self) -> &Base {
        match self.stack.last() {
            Some(src) => &src.base,
            None => &self.base,
        }
    }

    /// Change the directory relative references of the current source are
    /// resolved against.
    pub fn set_base_path<P: Into<PathBuf>>(&mut self, path: P) -> Result<()> {
        let path = path.into();
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "base path `{}` is not an existing directory",
                path.display()
            )));
        }
        match self.stack.last_mut() {
            Some(src) => src.base = Base::Dir(path),
            None => self.base = Base::Dir(path),
        }
        Ok(())
    }

    /// The current location in the topmost source.
    pub fn location(&self) -> Location {
        match self.stack.last() {
            Some(src) => src.location(),
            None => self.end.clone(),
        }
    }

    /// Scan the next token, expanding parameter entity references.
    ///
    /// Returns `Token::Eof` once the top-level source is exhausted, at which
    /// point the stack is empty.
    pub fn next_token(&mut self, entities: &EntityTable) -> Result<Lexeme> {
        loop {
            let depth = self.stack.len();
            let (source, scanned) = match self.stack.last_mut() {
                Some(src) => (src.id, scan(src)?),
                None => {
                    return Ok(Lexeme {
                        token: Token::Eof,
                        location: self.end.clone(),
                        depth: 0,
                        source: 0,
                    })
                }
            };
            match scanned {
                Scanned::Exhausted => {
                    self.pop_source();
                }
                Scanned::Reference(name, location) => {
                    self.enter(entities, &name)
                        .map_err(|e| e.at(&location))?;
                }
                Scanned::Token(token, location) => {
                    trace!("{}: {}", location, token);
                    return Ok(Lexeme {
                        token,
                        location,
                        depth,
                        source,
                    });
                }
            }
        }
    }

    fn enter(&mut self, entities: &EntityTable, name: &str) -> Result<()> {
        let reader = entities.open_reference(name, self.base())?;
        self.push_source(reader, Some(name))
    }

    /// Skip the body of an ignored conditional section, up to and including
    /// its `]]>`.
    ///
    /// The body is not tokenized and references in it are not expanded.
    /// Nested sections are skipped along with it.
    pub fn skip_ignored_section(&mut self) -> Result<()> {
        let location = self.location();
        let src = match self.stack.last_mut() {
            Some(src) => src,
            None => return Err(lexical(location, "unterminated IGNORE section")),
        };
        let mut nesting = 0usize;
        loop {
            if src.starts_with("<![")? {
                src.advance(3)?;
                nesting += 1;
            } else if src.starts_with("]]>")? {
                src.advance(3)?;
                if nesting == 0 {
                    return Ok(());
                }
                nesting -= 1;
            } else if src.bump()?.is_none() {
                return Err(lexical(location, "unterminated IGNORE section"));
            }
        }
    }

    /// Iterate over all tokens up to and including `Eof`.
    pub fn tokens<'a>(&'a mut self, entities: &'a EntityTable) -> Tokens<'a> {
        Tokens {
            scanner: self,
            entities,
            done: false,
        }
    }
}

/// An iterator over the tokens of a scanner.
pub struct Tokens<'a> {
    scanner: &'a mut Scanner,
    entities: &'a EntityTable,
    done: bool,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Lexeme>;

    fn next(&mut self) -> Option<Result<Lexeme>> {
        if self.done {
            return None;
        }
        let next = self.scanner.next_token(self.entities);
        match next {
            Ok(Lexeme {
                token: Token::Eof, ..
            })
            | Err(_) => self.done = true,
            _ => (),
        }
        Some(next)
    }
}
