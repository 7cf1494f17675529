// Copyright (c) 2018 Fabian Schuiki

//! Code generation from a document type.
//!
//! Generators fill a set of named templates with text derived from the
//! declarations of a `DocumentType`. Templates are plain text with `{name}`
//! placeholders; `{{` and `}}` produce literal braces. Every template has a
//! built-in default which can be overridden by a `<name>.tpl` file in a
//! template directory.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use log::debug;

use crate::error::{Error, Result};
use crate::model::{AttributeList, DefaultDecl, DocumentType};

/// The kinds of output that can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A Java SAX handler skeleton.
    Sax,
    /// An XSLT identity-style stylesheet skeleton.
    Xslt,
    /// The normalized DTD.
    Dtd,
}

impl Target {
    /// The templates this target uses.
    pub fn template_names(self) -> &'static [&'static str] {
        match self {
            Target::Sax => &[
                "sax.file",
                "sax.package",
                "sax.constant",
                "sax.start_case",
                "sax.end_case",
                "sax.handler",
                "sax.attribute",
            ],
            Target::Xslt => &[
                "xslt.file",
                "xslt.element",
                "xslt.attribute",
                "xslt.optional_attribute",
            ],
            Target::Dtd => &[],
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Target> {
        match s {
            "sax" | "java" => Ok(Target::Sax),
            "xslt" | "xsl" => Ok(Target::Xslt),
            "dtd" => Ok(Target::Dtd),
            _ => Err(Error::Configuration(format!("unknown target `{}`", s))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Target::Sax => write!(f, "sax"),
            Target::Xslt => write!(f, "xslt"),
            Target::Dtd => write!(f, "dtd"),
        }
    }
}

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// The name of the generated class.
    pub class_name: String,
    /// The package of the generated class, if any.
    pub package: Option<String>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            class_name: "DocumentHandler".into(),
            package: None,
        }
    }
}

/// A text template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    text: String,
}

impl Template {
    /// Create a new template.
    pub fn new<S: Into<String>, T: Into<String>>(name: S, text: T) -> Template {
        Template {
            name: name.into(),
            text: text.into(),
        }
    }

    /// The name of the template.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Substitute all placeholders.
    ///
    /// Fails if a placeholder has no value in `vars` or a brace is
    /// unbalanced.
    pub fn render(&self, vars: &HashMap<&str, String>) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut chars = self.text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut var = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => var.push(c),
                            None => {
                                return Err(Error::Template(format!(
                                    "unterminated placeholder in template `{}`",
                                    self.name
                                )))
                            }
                        }
                    }
                    match vars.get(var.trim()) {
                        Some(value) => out.push_str(value),
                        None => {
                            return Err(Error::Template(format!(
                                "unknown variable `{}` in template `{}`",
                                var.trim(),
                                self.name
                            )))
                        }
                    }
                }
                '}' => {
                    return Err(Error::Template(format!(
                        "unmatched `}}` in template `{}`",
                        self.name
                    )))
                }
                c => out.push(c),
            }
        }
        Ok(out)
    }
}

/// A named set of templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Templates {
    templates: IndexMap<String, Template>,
}

impl Templates {
    /// Create an empty template set.
    pub fn new() -> Templates {
        Templates::default()
    }

    /// The built-in templates of a target.
    pub fn builtin(target: Target) -> Templates {
        let mut set = Templates::new();
        for &name in target.template_names() {
            if let Some(text) = builtin_text(name) {
                set.insert(Template::new(name, text));
            }
        }
        set
    }

    /// Add or replace a template.
    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Result<&Template> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::Template(format!("no template named `{}`", name)))
    }

    /// Replace templates with the `<name>.tpl` files found in a directory.
    ///
    /// Only templates already in the set are looked up.
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::Configuration(format!(
                "template directory `{}` does not exist",
                dir.display()
            )));
        }
        let names: Vec<String> = self.templates.keys().cloned().collect();
        for name in names {
            let path = dir.join(format!("{}.tpl", name));
            if path.is_file() {
                debug!("loading template `{}` from {}", name, path.display());
                let text = fs::read_to_string(&path)?;
                self.insert(Template::new(name, text));
            }
        }
        Ok(())
    }

    fn render(&self, name: &str, vars: &HashMap<&str, String>) -> Result<String> {
        self.get(name)?.render(vars)
    }
}

fn builtin_text(name: &str) -> Option<&'static str> {
    Some(match name {
        "sax.file" => SAX_FILE,
        "sax.package" => "package {package};\n\n",
        "sax.constant" => "    public static final String {constant} = \"{name}\";\n",
        "sax.start_case" => {
            "        case {constant}:\n            start{method}({args});\n            break;\n"
        }
        "sax.end_case" => "        case {constant}:\n            end{method}();\n            break;\n",
        "sax.handler" => SAX_HANDLER,
        "sax.attribute" => "        String {variable} = atts.getValue(\"{name}\"); // {type} {default}\n",
        "xslt.file" => XSLT_FILE,
        "xslt.element" => XSLT_ELEMENT,
        "xslt.attribute" => {
            "      <xsl:attribute name=\"{name}\"><xsl:value-of select=\"@{name}\"/></xsl:attribute>\n"
        }
        "xslt.optional_attribute" => XSLT_OPTIONAL_ATTRIBUTE,
        _ => return None,
    })
}

const SAX_FILE: &str = "{package}// Generated by dtdgen from {source}. Do not edit.

import org.xml.sax.Attributes;
import org.xml.sax.SAXException;
import org.xml.sax.helpers.DefaultHandler;

public class {class} extends DefaultHandler {{
{constants}
    @Override
    public void startElement(String uri, String localName, String qName, Attributes atts)
            throws SAXException {{
        switch (qName) {{
{start_cases}        default:
            unknownElement(qName);
        }}
    }}

    @Override
    public void endElement(String uri, String localName, String qName) throws SAXException {{
        switch (qName) {{
{end_cases}        default:
            break;
        }}
    }}

    protected void unknownElement(String name) throws SAXException {{
        throw new SAXException(\"undeclared element: \" + name);
    }}
{handlers}}}
";

const SAX_HANDLER: &str = "
    /** {name}: {content} */
    protected void start{method}({params}) throws SAXException {{
{attributes}    }}

    protected void end{method}() throws SAXException {{
    }}
";

const XSLT_FILE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<!-- Generated by dtdgen from {source}. -->
<xsl:stylesheet version=\"1.0\" xmlns:xsl=\"http://www.w3.org/1999/XSL/Transform\">
  <xsl:output method=\"xml\" indent=\"yes\"/>
{templates}</xsl:stylesheet>
";

const XSLT_ELEMENT: &str = "
  <!-- {name}: {content} -->
  <xsl:template match=\"{name}\">
    <xsl:copy>
{attributes}      <xsl:apply-templates/>
    </xsl:copy>
  </xsl:template>
";

const XSLT_OPTIONAL_ATTRIBUTE: &str = "      <xsl:if test=\"@{name}\">
        <xsl:attribute name=\"{name}\"><xsl:value-of select=\"@{name}\"/></xsl:attribute>
      </xsl:if>
";

/// Words Java does not accept as identifiers.
const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final",
    "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "native", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "true", "try", "void", "volatile", "while", "var", "yield", "record",
];

/// Allocates unique Java identifiers derived from XML names.
#[derive(Default)]
struct Identifiers {
    used: HashSet<String>,
}

impl Identifiers {
    /// An allocator that never hands out any of `reserved` unchanged.
    fn reserving(reserved: &[&str]) -> Identifiers {
        Identifiers {
            used: reserved.iter().map(|&r| r.to_owned()).collect(),
        }
    }

    /// Allocate an identifier, escaping keywords and leading digits with `_`.
    /// A counter is appended while the result is already taken.
    fn alloc(&mut self, mut ident: String) -> String {
        if ident.starts_with(|c: char| c.is_numeric()) {
            ident.insert(0, '_');
        }
        if JAVA_KEYWORDS.contains(&ident.as_str()) {
            ident.push('_');
        }
        let mut candidate = ident.clone();
        let mut n = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{}{}", ident, n);
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Split a name into its alphanumeric words.
fn words(name: &str) -> Vec<String> {
    let words: Vec<String> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect();
    if words.is_empty() {
        vec!["unnamed".into()]
    } else {
        words
    }
}

/// `chapter-title` becomes `ChapterTitle`.
fn camel_case(name: &str) -> String {
    let mut buffer = String::new();
    for word in words(name) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            buffer.extend(first.to_uppercase());
            buffer.push_str(chars.as_str());
        }
    }
    buffer
}

/// `chapter-title` becomes `chapterTitle`.
fn lower_camel_case(name: &str) -> String {
    let camel = camel_case(name);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => camel,
    }
}

/// `chapter-title` becomes `CHAPTER_TITLE`.
fn constant_case(name: &str) -> String {
    words(name)
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Generate output for a document type.
///
/// `source` names the DTD the model was read from and ends up in a comment
/// at the top of the output.
pub fn generate(
    model: &DocumentType,
    target: Target,
    templates: &Templates,
    settings: &Settings,
    source: &str,
) -> Result<String> {
    debug!("generating {} output for {} elements", target, model.elements().len());
    match target {
        Target::Sax => generate_sax(model, templates, settings, source),
        Target::Xslt => generate_xslt(model, templates, source),
        Target::Dtd => Ok(model.to_string()),
    }
}

fn default_summary(default: &DefaultDecl) -> String {
    match *default {
        DefaultDecl::Required => "required".into(),
        DefaultDecl::Implied => "optional".into(),
        DefaultDecl::Fixed(ref v) => format!("fixed \"{}\"", v),
        DefaultDecl::Value(ref v) => format!("default \"{}\"", v),
    }
}

fn generate_sax(
    model: &DocumentType,
    templates: &Templates,
    settings: &Settings,
    source: &str,
) -> Result<String> {
    let empty = AttributeList::new();
    let mut constants = String::new();
    let mut start_cases = String::new();
    let mut end_cases = String::new();
    let mut handlers = String::new();
    let mut constant_names = Identifiers::default();
    // `startDocument()` and `endDocument()` belong to `DefaultHandler`.
    let mut method_names = Identifiers::reserving(&["Document"]);

    for (name, content) in model.elements() {
        let constant = constant_names.alloc(constant_case(name));
        let method = method_names.alloc(camel_case(name));
        let attributes = model.attributes(name).unwrap_or(&empty);

        let mut vars = HashMap::new();
        vars.insert("name", name.clone());
        vars.insert("constant", constant);
        vars.insert("method", method);
        vars.insert("content", content.to_string());
        vars.insert(
            "args",
            if attributes.is_empty() { "" } else { "atts" }.to_owned(),
        );
        vars.insert(
            "params",
            if attributes.is_empty() {
                ""
            } else {
                "Attributes atts"
            }
            .to_owned(),
        );

        let mut variables = Identifiers::reserving(&["atts"]);
        let mut reads = String::new();
        for (attr, def) in attributes {
            let mut avars = HashMap::new();
            avars.insert("name", attr.clone());
            avars.insert("variable", variables.alloc(lower_camel_case(attr)));
            avars.insert("type", def.ty.to_string());
            avars.insert("default", default_summary(&def.default));
            reads.push_str(&templates.render("sax.attribute", &avars)?);
        }
        vars.insert("attributes", reads);

        constants.push_str(&templates.render("sax.constant", &vars)?);
        start_cases.push_str(&templates.render("sax.start_case", &vars)?);
        end_cases.push_str(&templates.render("sax.end_case", &vars)?);
        handlers.push_str(&templates.render("sax.handler", &vars)?);
    }

    let mut vars = HashMap::new();
    let package = match settings.package {
        Some(ref package) => {
            let mut pvars = HashMap::new();
            pvars.insert("package", package.clone());
            templates.render("sax.package", &pvars)?
        }
        None => String::new(),
    };
    vars.insert("package", package);
    vars.insert("source", source.to_owned());
    vars.insert("class", settings.class_name.clone());
    vars.insert("constants", constants);
    vars.insert("start_cases", start_cases);
    vars.insert("end_cases", end_cases);
    vars.insert("handlers", handlers);
    templates.render("sax.file", &vars)
}

fn generate_xslt(model: &DocumentType, templates: &Templates, source: &str) -> Result<String> {
    let empty = AttributeList::new();
    let mut elements = String::new();
    for (name, content) in model.elements() {
        let mut attributes = String::new();
        for (attr, def) in model.attributes(name).unwrap_or(&empty) {
            let mut avars = HashMap::new();
            avars.insert("name", attr.clone());
            let template = match def.default {
                DefaultDecl::Implied => "xslt.optional_attribute",
                _ => "xslt.attribute",
            };
            attributes.push_str(&templates.render(template, &avars)?);
        }
        let mut vars = HashMap::new();
        vars.insert("name", name.clone());
        vars.insert("content", content.to_string());
        vars.insert("attributes", attributes);
        elements.push_str(&templates.render("xslt.element", &vars)?);
    }
    let mut vars = HashMap::new();
    vars.insert("source", source.to_owned());
    vars.insert("templates", elements);
    templates.render("xslt.file", &vars)
}
