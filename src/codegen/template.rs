//! Marshal template parser.
//!
//! A template is line oriented:
//!
//! ```text
//! #header-code
//! pub const EXIT_SIGNALED: i32 = 128;
//! #end-header-code
//!
//! #marshal Exit
//! int code
//! int signal
//! #end-marshal
//!
//! #marshal Service
//! string name
//! (blob, data, data_len)
//! Exit exit
//! Exit* parent
//! ignore* cache
//! #end-marshal
//! ```
//!
//! Header code is copied verbatim into the interface unit. Blank lines and
//! `//` comments are allowed outside header code.

use std::collections::{HashMap, HashSet};

use crate::error::{NgcsError, Result};

const HEADER_START: &str = "#header-code";
const HEADER_END: &str = "#end-header-code";
const MARSHAL_START: &str = "#marshal";
const MARSHAL_END: &str = "#end-marshal";

/// Local name the generated unmarshaler gives its reader.
const READER_LOCAL: &str = "r";

const BUILTIN_KINDS: &[&str] = &["int", "long", "string", "blob", "ignore", "ignore*"];

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub header: Option<HeaderCode>,
    pub records: Vec<RecordDef>,
}

/// Verbatim Rust copied into the interface unit.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCode {
    /// Line of the first `#header-code`.
    pub line: usize,
    pub text: String,
}

/// One `#marshal` block.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDef {
    pub name: String,
    pub line: usize,
    pub fields: Vec<FieldDef>,
}

impl RecordDef {
    /// Fields that occupy a struct member on the wire, in order.
    pub fn wire_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|field| field.kind.on_wire())
    }

    pub fn wire_count(&self) -> usize {
        self.wire_fields().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// `int f`
    Int,
    /// `long f`
    Long,
    /// `string f`, written up to the first NUL
    Text,
    /// `string f len`
    SizedText { length: String },
    /// `blob f len`
    Blob { length: String },
    /// `Type f`
    Record(String),
    /// `Type* f`
    OptionalRecord(String),
    /// `ignore* f`: local storage only
    Ignored,
}

impl FieldKind {
    pub fn on_wire(&self) -> bool {
        !matches!(self, FieldKind::Ignored)
    }

    /// Name of the extra length field, if any.
    pub fn length_field(&self) -> Option<&str> {
        match self {
            FieldKind::SizedText { length } | FieldKind::Blob { length } => Some(length),
            _ => None,
        }
    }

    /// Record type embedded by value.
    fn by_value(&self) -> Option<&str> {
        match self {
            FieldKind::Record(name) => Some(name),
            _ => None,
        }
    }

    fn referenced(&self) -> Option<&str> {
        match self {
            FieldKind::Record(name) | FieldKind::OptionalRecord(name) => Some(name),
            _ => None,
        }
    }
}

fn error(line: usize, message: impl Into<String>) -> NgcsError {
    NgcsError::Template {
        line,
        message: message.into(),
    }
}

/// Parse a template and check its records.
pub fn parse(source: &str) -> Result<Template> {
    let mut template = Template::default();
    let mut lines = source.lines().enumerate().map(|(i, text)| (i + 1, text));

    while let Some((line, raw)) = lines.next() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with("//") {
            continue;
        }
        if text == HEADER_START {
            let body = read_header(line, &mut lines)?;
            match template.header.as_mut() {
                Some(header) => header.text.push_str(&body),
                None => template.header = Some(HeaderCode { line, text: body }),
            }
        } else if let Some(rest) = directive(text, MARSHAL_START) {
            let name = record_name(line, rest)?;
            let fields = read_fields(line, &name, &mut lines)?;
            template.records.push(RecordDef { name, line, fields });
        } else if text.starts_with('#') {
            return Err(error(line, format!("unknown directive `{}`", text)));
        } else {
            return Err(error(line, format!("line outside any block: `{}`", text)));
        }
    }

    check_records(&template.records)?;
    Ok(template)
}

/// Match `#marshal` followed by whitespace or end of line.
fn directive<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(name)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn read_header<'a>(start: usize, lines: &mut impl Iterator<Item = (usize, &'a str)>) -> Result<String> {
    let mut body = String::new();
    for (_, raw) in lines.by_ref() {
        if raw.trim() == HEADER_END {
            return Ok(body);
        }
        body.push_str(raw);
        body.push('\n');
    }
    Err(error(start, "unterminated #header-code block"))
}

fn record_name(line: usize, rest: &str) -> Result<String> {
    let mut words = rest.split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| error(line, "#marshal needs a type name"))?;
    if let Some(extra) = words.next() {
        return Err(error(line, format!("unexpected `{}` after type name", extra)));
    }
    check_type_name(line, name)?;
    Ok(name.to_string())
}

fn read_fields<'a>(
    start: usize,
    record: &str,
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<Vec<FieldDef>> {
    let mut fields: Vec<FieldDef> = Vec::new();
    let mut names: HashSet<String> = HashSet::new();

    for (line, raw) in lines.by_ref() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with("//") {
            continue;
        }
        if text == MARSHAL_END {
            return Ok(fields);
        }
        if text == HEADER_START || directive(text, MARSHAL_START).is_some() {
            return Err(error(line, format!("`{}` inside #marshal {}", text, record)));
        }

        let Some(field) = parse_field(line, text)? else {
            continue;
        };
        let claimed = std::iter::once(field.name.as_str()).chain(field.kind.length_field());
        for name in claimed {
            if !names.insert(name.to_string()) {
                return Err(error(line, format!("duplicate field `{}` in {}", name, record)));
            }
        }
        fields.push(field);
    }
    Err(error(start, format!("unterminated #marshal {} block", record)))
}

/// Parse `kind name [length]` or `(kind, name[, length])`. `ignore` yields nothing.
fn parse_field(line: usize, text: &str) -> Result<Option<FieldDef>> {
    let words: Vec<&str> = match text.strip_prefix('(') {
        Some(inner) => inner
            .strip_suffix(')')
            .ok_or_else(|| error(line, "unclosed `(` in field"))?
            .split(',')
            .map(str::trim)
            .collect(),
        None => text.split_whitespace().collect(),
    };
    if words.iter().any(|word| word.is_empty()) {
        return Err(error(line, format!("empty element in `{}`", text)));
    }

    let kind = match words.as_slice() {
        ["ignore"] => return Ok(None),
        ["ignore*", _] => FieldKind::Ignored,
        ["int", _] => FieldKind::Int,
        ["long", _] => FieldKind::Long,
        ["string", _] => FieldKind::Text,
        ["string", _, length] => FieldKind::SizedText {
            length: field_name(line, length)?,
        },
        ["blob", _, length] => FieldKind::Blob {
            length: field_name(line, length)?,
        },
        ["blob", name] => {
            return Err(error(line, format!("blob field `{}` needs a length field", name)));
        }
        [ty, _] if !BUILTIN_KINDS.contains(ty) => match ty.strip_suffix('*') {
            Some(target) => {
                check_type_name(line, target)?;
                FieldKind::OptionalRecord(target.to_string())
            }
            None => {
                check_type_name(line, ty)?;
                FieldKind::Record(ty.to_string())
            }
        },
        _ => return Err(error(line, format!("expected `<type> <name> [length]`, got `{}`", text))),
    };

    Ok(Some(FieldDef {
        name: field_name(line, words[1])?,
        kind,
        line,
    }))
}

fn field_name(line: usize, name: &str) -> Result<String> {
    check_ident(line, name)?;
    if name == READER_LOCAL {
        return Err(error(line, format!("field name `{}` is reserved", name)));
    }
    Ok(name.to_string())
}

fn check_type_name(line: usize, name: &str) -> Result<()> {
    check_ident(line, name)?;
    if BUILTIN_KINDS.contains(&name) || name == "Self" {
        return Err(error(line, format!("`{}` cannot name a record", name)));
    }
    Ok(())
}

fn check_ident(line: usize, name: &str) -> Result<()> {
    syn::parse_str::<syn::Ident>(name)
        .map(|_| ())
        .map_err(|_| error(line, format!("`{}` is not a valid identifier", name)))
}

/// Unique names, known references, and no record containing itself by value.
fn check_records(records: &[RecordDef]) -> Result<()> {
    let mut by_name: HashMap<&str, &RecordDef> = HashMap::new();
    for record in records {
        if by_name.insert(&record.name, record).is_some() {
            return Err(error(record.line, format!("record `{}` defined twice", record.name)));
        }
    }

    for record in records {
        for field in &record.fields {
            if let Some(target) = field.kind.referenced()
                && !by_name.contains_key(target)
            {
                return Err(error(field.line, format!("unknown record type `{}`", target)));
            }
        }
    }

    let mut finished: HashSet<&str> = HashSet::new();
    for record in records {
        let mut path = Vec::new();
        visit(record, &by_name, &mut path, &mut finished)?;
    }
    Ok(())
}

fn visit<'a>(
    record: &'a RecordDef,
    by_name: &HashMap<&str, &'a RecordDef>,
    path: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Result<()> {
    if finished.contains(record.name.as_str()) {
        return Ok(());
    }
    path.push(&record.name);
    for field in &record.fields {
        let Some(target) = field.kind.by_value() else {
            continue;
        };
        if let Some(start) = path.iter().position(|name| *name == target) {
            let cycle = path[start..].join(" -> ");
            return Err(error(
                field.line,
                format!("`{} -> {}` embeds a record in itself by value; use `{}*`", cycle, target, target),
            ));
        }
        if let Some(next) = by_name.get(target).copied() {
            visit(next, by_name, path, finished)?;
        }
    }
    path.pop();
    finished.insert(&record.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_error(source: &str) -> (usize, String) {
        match parse(source) {
            Err(NgcsError::Template { line, message }) => (line, message),
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_all_field_kinds() {
        let source = "\
#marshal Exit
int code
#end-marshal

#marshal Service
string name
string label label_len
(blob, data, data_len)
long started
Exit exit
Exit* parent
ignore
ignore* cache
#end-marshal
";
        let template = parse(source).unwrap();
        assert!(template.header.is_none());
        assert_eq!(template.records.len(), 2);

        let service = &template.records[1];
        assert_eq!(service.name, "Service");
        assert_eq!(service.line, 5);
        let kinds: Vec<&FieldKind> = service.fields.iter().map(|f| &f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &FieldKind::Text,
                &FieldKind::SizedText {
                    length: "label_len".into()
                },
                &FieldKind::Blob {
                    length: "data_len".into()
                },
                &FieldKind::Long,
                &FieldKind::Record("Exit".into()),
                &FieldKind::OptionalRecord("Exit".into()),
                &FieldKind::Ignored,
            ]
        );
        assert_eq!(service.fields[2].name, "data");
        assert_eq!(service.wire_count(), 6);
    }

    #[test]
    fn test_header_code_is_verbatim() {
        let source = "// leading comment\n#header-code\n#[derive(Debug)]\npub struct Raw;\n#end-header-code\n";
        let template = parse(source).unwrap();
        let header = template.header.unwrap();
        assert_eq!(header.line, 2);
        assert_eq!(header.text, "#[derive(Debug)]\npub struct Raw;\n");
        assert!(template.records.is_empty());
    }

    #[test]
    fn test_empty_record() {
        let template = parse("#marshal Ping\n#end-marshal\n").unwrap();
        assert_eq!(template.records[0].wire_count(), 0);
    }

    #[test]
    fn test_unterminated_blocks() {
        let (line, message) = template_error("\n#marshal A\nint x\n");
        assert_eq!(line, 2);
        assert!(message.contains("unterminated"));

        let (line, _) = template_error("#header-code\nconst X: i32 = 1;\n");
        assert_eq!(line, 1);
    }

    #[test]
    fn test_rejects_bad_lines() {
        assert_eq!(template_error("int x\n").0, 1);
        assert!(template_error("#marshal A\nint x\n#marshal B\n").1.contains("inside"));
        assert!(template_error("#marshal\n#end-marshal\n").1.contains("type name"));
        assert!(template_error("#marshal A B\n#end-marshal\n").1.contains("unexpected"));
        assert!(template_error("#bogus\n").1.contains("unknown directive"));
        assert!(template_error("#marshal A\nint\n#end-marshal\n").1.contains("expected"));
        assert!(template_error("#marshal A\n(int, x\n#end-marshal\n").1.contains("unclosed"));
        assert!(template_error("#marshal A\n(int, , x)\n#end-marshal\n").1.contains("empty"));
    }

    #[test]
    fn test_rejects_bad_names() {
        let (line, message) = template_error("#marshal A\nint x\nint type\n#end-marshal\n");
        assert_eq!(line, 3);
        assert!(message.contains("identifier"));

        assert!(template_error("#marshal int\n#end-marshal\n").1.contains("cannot name"));
        assert!(template_error("#marshal A\nint r\n#end-marshal\n").1.contains("reserved"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let (line, message) = template_error("#marshal A\nint x\nlong x\n#end-marshal\n");
        assert_eq!(line, 3);
        assert!(message.contains("duplicate field `x`"));

        let message = template_error("#marshal A\nint n\nblob data n\n#end-marshal\n").1;
        assert!(message.contains("duplicate field `n`"));

        let (line, message) = template_error("#marshal A\n#end-marshal\n#marshal A\n#end-marshal\n");
        assert_eq!(line, 3);
        assert!(message.contains("defined twice"));
    }

    #[test]
    fn test_blob_needs_length() {
        assert!(template_error("#marshal A\nblob data\n#end-marshal\n").1.contains("length"));
    }

    #[test]
    fn test_unknown_record_type() {
        let (line, message) = template_error("#marshal A\nMissing m\n#end-marshal\n");
        assert_eq!(line, 2);
        assert!(message.contains("unknown record type `Missing`"));
    }

    #[test]
    fn test_rejects_recursion_by_value() {
        let (line, message) = template_error("#marshal Node\nint v\nNode next\n#end-marshal\n");
        assert_eq!(line, 3);
        assert!(message.contains("Node -> Node"));

        let source = "#marshal A\nB b\n#end-marshal\n#marshal B\nA a\n#end-marshal\n";
        assert!(template_error(source).1.contains("A -> B -> A"));
    }

    #[test]
    fn test_allows_recursion_through_pointer() {
        let template = parse("#marshal Node\nint v\nNode* next\n#end-marshal\n").unwrap();
        assert_eq!(
            template.records[0].fields[1].kind,
            FieldKind::OptionalRecord("Node".into())
        );
    }
}
