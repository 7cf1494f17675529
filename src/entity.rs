// Copyright (c) 2018 Fabian Schuiki

//! The parameter entity table.
//!
//! Parameter entities are the macros of a DTD. An entity is either declared
//! with a literal replacement text, which is stored with all parameter entity
//! references already expanded, or with a system identifier naming a file or
//! URI whose content is spliced in when the entity is referenced. The first
//! declaration of a name wins; later declarations are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use log::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::name::is_name;

/// The two kinds of parameter entity declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    /// The content is a literal replacement text.
    Value,
    /// The content is a path or URI naming the replacement text.
    Uri,
}

/// A table of declared parameter entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityTable {
    values: BTreeMap<String, String>,
    uris: BTreeMap<String, String>,
}

impl EntityTable {
    /// Create a new empty table.
    pub fn new() -> EntityTable {
        EntityTable::default()
    }

    /// Declare a parameter entity.
    ///
    /// Does nothing if `name` is already declared with either kind. Literal
    /// values have their parameter entity references expanded before they are
    /// stored.
    pub fn declare<S: Into<String>>(&mut self, name: &str, kind: EntityKind, content: S) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidEntity("empty entity name".into()));
        }
        if !is_name(name) {
            return Err(Error::InvalidEntity(format!("`{}` is not a valid entity name", name)));
        }
        if self.contains(name) {
            debug!("ignoring redeclaration of parameter entity `%{};`", name);
            return Ok(());
        }
        let content = content.into();
        match kind {
            EntityKind::Value => {
                let value = self.expand_references(&content)?;
                self.values.insert(name.to_owned(), value);
            }
            EntityKind::Uri => {
                self.uris.insert(name.to_owned(), content);
            }
        }
        Ok(())
    }

    /// Check whether an entity of either kind is declared under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.uris.contains_key(name)
    }

    /// The kind an entity was declared with.
    pub fn kind(&self, name: &str) -> Option<EntityKind> {
        if self.values.contains_key(name) {
            Some(EntityKind::Value)
        } else if self.uris.contains_key(name) {
            Some(EntityKind::Uri)
        } else {
            None
        }
    }

    /// The expanded replacement text of a literal entity.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// The system identifier of an external entity.
    pub fn uri(&self, name: &str) -> Option<&str> {
        self.uris.get(name).map(String::as_str)
    }

    /// Iterate over the literal entities in name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over the external entities in name order.
    pub fn uris(&self) -> impl Iterator<Item = (&str, &str)> {
        self.uris.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The number of declared entities.
    pub fn len(&self) -> usize {
        self.values.len() + self.uris.len()
    }

    /// Check whether no entities have been declared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand all parameter entity references in a text.
    ///
    /// A `%` that is not followed by a valid name and a `;` is kept as a
    /// literal character.
    pub fn expand_references(&self, text: &str) -> Result<String> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find('%') {
            result.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let name = match after.find(';') {
                Some(end) if is_name(&after[..end]) => &after[..end],
                _ => {
                    result.push('%');
                    rest = after;
                    continue;
                }
            };
            if let Some(value) = self.values.get(name) {
                result.push_str(value);
            } else if let Some(target) = self.uris.get(name) {
                return Err(Error::UnresolvedReference {
                    name: name.to_owned(),
                    target: target.clone(),
                    reason: "external entities cannot be expanded inside a literal".into(),
                });
            } else {
                return Err(Error::UndeclaredEntity(name.to_owned()));
            }
            rest = &after[name.len() + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }

    /// Open a reader over the replacement text of an entity.
    ///
    /// External entities are looked up as a local file first, relative to a
    /// directory `base` unless the identifier is an absolute path, and as a
    /// URI if no such file can be opened. Against a URL `base` a relative
    /// identifier is joined to the URL.
    pub fn open_reference(&self, name: &str, base: &Base) -> Result<EntityReader> {
        if let Some(target) = self.uris.get(name) {
            return open_external(name, target, base);
        }
        if let Some(value) = self.values.get(name) {
            return Ok(EntityReader {
                origin: Origin::Literal(name.to_owned()),
                reader: Box::new(Cursor::new(value.trim().as_bytes().to_vec())),
            });
        }
        if is_name(name) {
            Err(Error::UndeclaredEntity(name.to_owned()))
        } else {
            Err(Error::InvalidEntity(format!("`{}` is not a valid entity name", name)))
        }
    }
}

/// Where the content of an entity reader comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The replacement text of the literal entity with the given name.
    Literal(String),
    /// A local file.
    File(PathBuf),
    /// A network resource.
    Url(Url),
}

impl Origin {
    /// What relative references inside this content resolve against, if the
    /// content has its own base.
    pub fn base(&self) -> Option<Base> {
        match *self {
            Origin::File(ref path) => path.parent().map(|p| Base::Dir(p.to_path_buf())),
            Origin::Url(ref url) => Some(Base::Url(url.clone())),
            Origin::Literal(_) => None,
        }
    }
}

/// What relative system identifiers are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Base {
    /// A local directory.
    Dir(PathBuf),
    /// The URL of content fetched over the network.
    Url(Url),
}

impl Base {
    /// A local directory base.
    pub fn dir<P: Into<PathBuf>>(path: P) -> Base {
        Base::Dir(path.into())
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Base::Dir(ref path) => write!(f, "{}", path.display()),
            Base::Url(ref url) => write!(f, "{}", url),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Origin::Literal(ref name) => write!(f, "%{};", name),
            Origin::File(ref path) => write!(f, "{}", path.display()),
            Origin::Url(ref url) => write!(f, "{}", url),
        }
    }
}

/// A reader over the replacement text of a parameter entity.
pub struct EntityReader {
    /// Where the content comes from.
    pub origin: Origin,
    /// The content itself.
    pub reader: Box<dyn BufRead>,
}

impl EntityReader {
    /// Create a reader over an in-memory text.
    pub fn from_text<S: Into<String>>(origin: Origin, text: S) -> EntityReader {
        EntityReader {
            origin,
            reader: Box::new(Cursor::new(text.into().into_bytes())),
        }
    }

    /// Open a local file.
    pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<EntityReader> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(EntityReader {
            origin: Origin::File(path.to_path_buf()),
            reader: Box::new(BufReader::new(file)),
        })
    }

    /// Read the remaining content into a string.
    pub fn read_to_string(mut self) -> io::Result<String> {
        let mut buffer = String::new();
        self.reader.read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}

impl fmt::Debug for EntityReader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EntityReader")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Resolve the system identifier of an external entity.
fn open_external(name: &str, target: &str, base: &Base) -> Result<EntityReader> {
    let unresolved = |reason: String| Error::UnresolvedReference {
        name: name.to_owned(),
        target: target.to_owned(),
        reason,
    };

    let path = Path::new(target);
    let local = if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        match *base {
            Base::Dir(ref dir) => Some(dir.join(path)),
            Base::Url(_) => None,
        }
    };
    let mut reason = String::new();
    if let Some(path) = local {
        match EntityReader::open_file(&path) {
            Ok(reader) => {
                debug!("resolved `%{};` to file {}", name, path.display());
                return Ok(reader);
            }
            Err(e) => reason = format!("{}: {}", path.display(), e),
        }
    }

    let url = match *base {
        Base::Url(ref base) => base.join(target).map_err(|e| unresolved(e.to_string()))?,
        Base::Dir(_) => Url::parse(target).map_err(|_| unresolved(reason))?,
    };
    match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| unresolved(format!("`{}` is not a local file URI", url)))?;
            EntityReader::open_file(&path).map_err(|e| unresolved(format!("{}: {}", path.display(), e)))
        }
        "http" | "https" => {
            debug!("fetching `%{};` from {}", name, url);
            let response = ureq::get(url.as_str())
                .call()
                .map_err(|e| unresolved(e.to_string()))?;
            Ok(EntityReader {
                origin: Origin::Url(url),
                reader: Box::new(BufReader::new(response.into_reader())),
            })
        }
        scheme => Err(unresolved(format!("unsupported URI scheme `{}`", scheme))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn table(decls: &[(&str, &str)]) -> EntityTable {
        let mut table = EntityTable::new();
        for &(name, value) in decls {
            table.declare(name, EntityKind::Value, value).unwrap();
        }
        table
    }

    #[test]
    fn first_declaration_wins() {
        let mut t = table(&[("n", "first")]);
        t.declare("n", EntityKind::Value, "second").unwrap();
        t.declare("n", EntityKind::Uri, "second.ent").unwrap();
        assert_eq!(t.value("n"), Some("first"));
        assert_eq!(t.uri("n"), None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn uri_declaration_blocks_value() {
        let mut t = EntityTable::new();
        t.declare("n", EntityKind::Uri, "n.ent").unwrap();
        t.declare("n", EntityKind::Value, "text").unwrap();
        assert_eq!(t.kind("n"), Some(EntityKind::Uri));
        assert_eq!(t.value("n"), None);
    }

    #[test]
    fn invalid_names() {
        let mut t = EntityTable::new();
        match t.declare("", EntityKind::Value, "x") {
            Err(Error::InvalidEntity(_)) => (),
            r => panic!("unexpected {:?}", r),
        }
        match t.declare("1st", EntityKind::Value, "x") {
            Err(Error::InvalidEntity(_)) => (),
            r => panic!("unexpected {:?}", r),
        }
        assert!(t.is_empty());
    }

    #[test]
    fn expand_simple() {
        let t = table(&[("x", "Y")]);
        assert_eq!(t.expand_references("a%x;b").unwrap(), "aYb");
    }

    #[test]
    fn expand_undeclared() {
        let t = EntityTable::new();
        match t.expand_references("a%x;b") {
            Err(Error::UndeclaredEntity(name)) => assert_eq!(name, "x"),
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn expand_literal_percent() {
        let t = EntityTable::new();
        assert_eq!(t.expand_references("50%off").unwrap(), "50%off");
        assert_eq!(t.expand_references("100%").unwrap(), "100%");
        assert_eq!(t.expand_references("% x;").unwrap(), "% x;");
        assert_eq!(t.expand_references("%%").unwrap(), "%%");
    }

    #[test]
    fn expand_percent_before_reference() {
        let t = table(&[("x", "Y")]);
        assert_eq!(t.expand_references("5%%x;").unwrap(), "5%Y");
    }

    #[test]
    fn expand_chain() {
        let t = table(&[("foo", "bar"), ("bar", "baz")]);
        assert_eq!(
            t.expand_references("foo%foo;bar%bar;").unwrap(),
            "foobarbarbaz"
        );
    }

    #[test]
    fn values_are_expanded_on_declaration() {
        let t = table(&[("a", "A"), ("b", "(%a;|B)")]);
        assert_eq!(t.value("b"), Some("(A|B)"));
    }

    #[test]
    fn self_reference_is_undeclared() {
        let mut t = EntityTable::new();
        match t.declare("a", EntityKind::Value, "x %a;") {
            Err(Error::UndeclaredEntity(name)) => assert_eq!(name, "a"),
            r => panic!("unexpected {:?}", r),
        }
        assert!(!t.contains("a"));
    }

    #[test]
    fn expansion_is_idempotent() {
        let t = table(&[("a", "A"), ("b", "%a;%a;")]);
        let once = t.expand_references("x %b; 10%").unwrap();
        assert_eq!(once, "x AA 10%");
        assert_eq!(t.expand_references(&once).unwrap(), once);
    }

    #[test]
    fn external_reference_in_literal() {
        let mut t = EntityTable::new();
        t.declare("ext", EntityKind::Uri, "ext.ent").unwrap();
        match t.expand_references("%ext;") {
            Err(Error::UnresolvedReference { name, .. }) => assert_eq!(name, "ext"),
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn open_value_is_trimmed() {
        let t = table(&[("x", "  (a|b)\n")]);
        let reader = t.open_reference("x", &Base::dir(".")).unwrap();
        assert_eq!(reader.origin, Origin::Literal("x".into()));
        assert_eq!(reader.read_to_string().unwrap(), "(a|b)");
    }

    #[test]
    fn open_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("common.ent"), "<!ELEMENT a EMPTY>").unwrap();
        let mut t = EntityTable::new();
        t.declare("common", EntityKind::Uri, "common.ent").unwrap();
        let reader = t.open_reference("common", &Base::dir(dir.path())).unwrap();
        assert_eq!(reader.origin, Origin::File(dir.path().join("common.ent")));
        assert_eq!(reader.origin.base(), Some(Base::dir(dir.path())));
        assert_eq!(reader.read_to_string().unwrap(), "<!ELEMENT a EMPTY>");
    }

    #[test]
    fn open_absolute_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abs.ent");
        fs::write(&path, "abs").unwrap();
        let mut t = EntityTable::new();
        t.declare("abs", EntityKind::Uri, path.to_str().unwrap()).unwrap();
        let reader = t.open_reference("abs", &Base::dir("/nonexistent")).unwrap();
        assert_eq!(reader.read_to_string().unwrap(), "abs");
    }

    #[test]
    fn open_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uri.ent");
        fs::write(&path, "via uri").unwrap();
        let url = Url::from_file_path(&path).unwrap();
        let mut t = EntityTable::new();
        t.declare("u", EntityKind::Uri, url.as_str()).unwrap();
        let reader = t.open_reference("u", &Base::dir("/nonexistent")).unwrap();
        assert_eq!(reader.read_to_string().unwrap(), "via uri");
    }

    #[test]
    fn open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = EntityTable::new();
        t.declare("gone", EntityKind::Uri, "gone.ent").unwrap();
        match t.open_reference("gone", &Base::dir(dir.path())) {
            Err(Error::UnresolvedReference { name, target, .. }) => {
                assert_eq!(name, "gone");
                assert_eq!(target, "gone.ent");
            }
            r => panic!("unexpected {:?}", r),
        }
    }

    /// Serve `count` requests on a local port, answering each with the body
    /// registered for its path.
    fn serve(count: usize, bodies: &[(&str, &str)]) -> u16 {
        use std::io::Write;
        use std::net::TcpListener;
        use std::thread;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let bodies: Vec<(String, String)> = bodies
            .iter()
            .map(|&(p, b)| (p.to_owned(), b.to_owned()))
            .collect();
        thread::spawn(move || {
            for stream in listener.incoming().take(count) {
                let mut stream = stream.unwrap();
                let mut request = String::new();
                {
                    let mut reader = BufReader::new(&mut stream);
                    let mut line = String::new();
                    while reader.read_line(&mut line).unwrap() > 0 {
                        if line == "\r\n" {
                            break;
                        }
                        request.push_str(&line);
                        line.clear();
                    }
                }
                let path = request.split_whitespace().nth(1).unwrap_or("").to_owned();
                let reply = match bodies.iter().find(|&&(ref p, _)| *p == path) {
                    Some(&(_, ref body)) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    ),
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_owned(),
                };
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });
        port
    }

    #[test]
    fn open_http_when_no_local_file() {
        let port = serve(1, &[("/dtd/remote.ent", "<!ELEMENT r EMPTY>")]);
        let url = format!("http://127.0.0.1:{}/dtd/remote.ent", port);
        let dir = tempfile::tempdir().unwrap();
        let mut t = EntityTable::new();
        t.declare("remote", EntityKind::Uri, url.as_str()).unwrap();
        let reader = t.open_reference("remote", &Base::dir(dir.path())).unwrap();
        assert_eq!(reader.origin, Origin::Url(Url::parse(&url).unwrap()));
        assert_eq!(reader.read_to_string().unwrap(), "<!ELEMENT r EMPTY>");
    }

    #[test]
    fn local_file_shadows_http() {
        // Nothing listens on this port; the file must be found first.
        let target = "http://127.0.0.1:9/dtd/remote.ent";
        let dir = tempfile::tempdir().unwrap();
        let shadow = dir.path().join("http:").join("127.0.0.1:9").join("dtd");
        fs::create_dir_all(&shadow).unwrap();
        fs::write(shadow.join("remote.ent"), "local").unwrap();
        let mut t = EntityTable::new();
        t.declare("remote", EntityKind::Uri, target).unwrap();
        let reader = t.open_reference("remote", &Base::dir(dir.path())).unwrap();
        assert_eq!(reader.origin, Origin::File(dir.path().join(target)));
        assert_eq!(reader.read_to_string().unwrap(), "local");
    }

    #[test]
    fn relative_to_url_base() {
        let port = serve(1, &[("/dtd/inner.ent", "deep")]);
        let root = format!("http://127.0.0.1:{}/dtd/", port);
        let base = Base::Url(Url::parse(&format!("{}outer.ent", root)).unwrap());
        let mut t = EntityTable::new();
        t.declare("inner", EntityKind::Uri, "inner.ent").unwrap();
        let reader = t.open_reference("inner", &base).unwrap();
        let inner = Url::parse(&format!("{}inner.ent", root)).unwrap();
        assert_eq!(reader.origin.base(), Some(Base::Url(inner)));
        assert_eq!(reader.read_to_string().unwrap(), "deep");
    }

    #[test]
    fn open_unsupported_scheme() {
        let mut t = EntityTable::new();
        t.declare("m", EntityKind::Uri, "mailto:someone@example.org").unwrap();
        match t.open_reference("m", &Base::dir(".")) {
            Err(Error::UnresolvedReference { reason, .. }) => assert!(reason.contains("mailto")),
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn open_undeclared() {
        let t = EntityTable::new();
        match t.open_reference("nope", &Base::dir(".")) {
            Err(Error::UndeclaredEntity(name)) => assert_eq!(name, "nope"),
            r => panic!("unexpected {:?}", r),
        }
    }

    #[test]
    fn structural_equality_and_order() {
        let a = table(&[("a", "1"), ("b", "2")]);
        let b = table(&[("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
        let c = table(&[("a", "1"), ("b", "3")]);
        assert!(a < c);
        let mut d = a.clone();
        d.declare("z", EntityKind::Uri, "z.ent").unwrap();
        assert_ne!(a, d);
        assert!(a < d);
    }
}
