use std::collections::HashMap;
use std::path::Path;

use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::Marker;

use crate::{pointer, Error};

/// A `[start, end)` range of byte offsets into a source file.
pub type Span = (usize, usize);

/// A YAML (or JSON) node with the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum YamlNode {
    Mapping {
        entries: Vec<(YamlNode, YamlNode)>,
        span: Span,
    },
    Sequence {
        items: Vec<YamlNode>,
        span: Span,
    },
    Scalar {
        value: String,
        span: Span,
    },
}

impl YamlNode {
    /// The range the node was read from.
    pub fn span(&self) -> Span {
        match self {
            YamlNode::Mapping { span, .. }
            | YamlNode::Sequence { span, .. }
            | YamlNode::Scalar { span, .. } => *span,
        }
    }
}

/// The parsed first document of a source file.
#[derive(Debug, Clone)]
pub struct YamlAst {
    root: Option<YamlNode>,
    len: usize,
}

/// Where a pointer led inside a [`YamlAst`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AstMatch {
    /// The key, when the pointer ends at a mapping entry.
    pub key: Option<Span>,
    /// The value, when the pointer ends at a mapping entry.
    pub value: Option<Span>,
    /// The entire node: key and value for an entry, the item for a sequence element.
    pub node: Span,
}

impl YamlAst {
    /// Parse the first document of `source`, which was read from `path`.
    pub fn parse(path: &Path, source: &str) -> Result<Self, Error> {
        let mut builder = AstBuilder::new(source);
        let mut parser = Parser::new_from_str(source);
        parser
            .load(&mut builder, false)
            .map_err(|e| Error::YamlScan {
                path: path.to_owned(),
                message: e.to_string(),
            })?;
        Ok(Self {
            root: builder.root,
            len: source.len(),
        })
    }
}

/// Walk `ast` along `json_pointer`, one token at a time.
///
/// Mappings are searched by key and sequences by index, whatever the token looks like. The
/// root pointer (`""` or `"/"`) yields the whole file.
pub fn resolve_json_pointer_in_yaml_ast(ast: &YamlAst, json_pointer: &str) -> Option<AstMatch> {
    let segments = pointer::decode(json_pointer)?;
    if segments.is_empty() {
        return Some(AstMatch {
            key: None,
            value: None,
            node: (0, ast.len),
        });
    }

    let mut node = ast.root.as_ref()?;
    let mut matched = None;
    for segment in &segments {
        match node {
            YamlNode::Mapping { entries, .. } => {
                let (key, value) = entries.iter().find(|(key, _)| {
                    matches!(key, YamlNode::Scalar { value, .. } if value == segment)
                })?;
                matched = Some(AstMatch {
                    key: Some(key.span()),
                    value: Some(value.span()),
                    node: (key.span().0, value.span().1),
                });
                node = value;
            }
            YamlNode::Sequence { items, .. } => {
                let item = items.get(segment.parse::<usize>().ok()?)?;
                matched = Some(AstMatch {
                    key: None,
                    value: None,
                    node: item.span(),
                });
                node = item;
            }
            YamlNode::Scalar { .. } => return None,
        }
    }
    matched
}

enum Frame {
    Mapping {
        start: usize,
        anchor: usize,
        entries: Vec<(YamlNode, YamlNode)>,
        key: Option<YamlNode>,
    },
    Sequence {
        start: usize,
        anchor: usize,
        items: Vec<YamlNode>,
    },
}

/// Builds [`YamlNode`]s from parser events.
///
/// The parser reports positions as character indexes, which are turned into byte offsets here.
struct AstBuilder<'s> {
    source: &'s str,
    offsets: Vec<usize>,
    stack: Vec<Frame>,
    anchors: HashMap<usize, YamlNode>,
    root: Option<YamlNode>,
}

impl<'s> AstBuilder<'s> {
    fn new(source: &'s str) -> Self {
        let mut offsets: Vec<usize> = source.char_indices().map(|(i, _)| i).collect();
        offsets.push(source.len());
        Self {
            source,
            offsets,
            stack: vec![],
            anchors: HashMap::new(),
            root: None,
        }
    }

    fn offset(&self, mark: &Marker) -> usize {
        self.offsets
            .get(mark.index())
            .copied()
            .unwrap_or(self.source.len())
    }

    fn push_node(&mut self, node: YamlNode, anchor: usize) {
        if anchor != 0 {
            self.anchors.insert(anchor, node.clone());
        }
        match self.stack.last_mut() {
            Some(Frame::Mapping { entries, key, .. }) => match key.take() {
                Some(k) => entries.push((k, node)),
                None => *key = Some(node),
            },
            Some(Frame::Sequence { items, .. }) => items.push(node),
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
        }
    }

    /// The end of a container: past its closing bracket in flow style, or the end of its last
    /// child in block style.
    fn container_end(&self, start: usize, end_mark: usize, last_child: Option<Span>) -> usize {
        match self.source[end_mark.min(self.source.len())..].chars().next() {
            Some(c @ ('}' | ']')) => end_mark + c.len_utf8(),
            _ => last_child.map_or(start, |(_, end)| end),
        }
    }

    fn scalar_end(&self, start: usize, value: &str) -> usize {
        let rest = &self.source[start..];
        let end = match rest.chars().next() {
            Some('\'') => quoted_end(rest, '\''),
            Some('"') => quoted_end(rest, '"'),
            Some('|' | '>') => block_scalar_end(rest),
            _ if !value.contains('\n') && rest.starts_with(value) => value.len(),
            _ => plain_end(rest),
        };
        start + end
    }
}

impl MarkedEventReceiver for AstBuilder<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let at = self.offset(&mark);
        match event {
            Event::Scalar(value, _, anchor, ..) => {
                let end = self.scalar_end(at, &value);
                self.push_node(
                    YamlNode::Scalar {
                        value,
                        span: (at, end.max(at)),
                    },
                    anchor,
                );
            }
            Event::Alias(anchor) => {
                let node = match self.anchors.get(&anchor) {
                    Some(YamlNode::Mapping { entries, .. }) => YamlNode::Mapping {
                        entries: entries.clone(),
                        span: (at, at),
                    },
                    Some(YamlNode::Sequence { items, .. }) => YamlNode::Sequence {
                        items: items.clone(),
                        span: (at, at),
                    },
                    Some(YamlNode::Scalar { value, .. }) => YamlNode::Scalar {
                        value: value.clone(),
                        span: (at, at),
                    },
                    None => YamlNode::Scalar {
                        value: String::new(),
                        span: (at, at),
                    },
                };
                self.push_node(node, 0);
            }
            Event::MappingStart(anchor, ..) => self.stack.push(Frame::Mapping {
                start: at,
                anchor,
                entries: vec![],
                key: None,
            }),
            Event::SequenceStart(anchor, ..) => self.stack.push(Frame::Sequence {
                start: at,
                anchor,
                items: vec![],
            }),
            Event::MappingEnd => {
                if let Some(Frame::Mapping {
                    start,
                    anchor,
                    entries,
                    ..
                }) = self.stack.pop()
                {
                    // In a block sequence the mapping start is marked after its first key.
                    let start = entries
                        .first()
                        .map_or(start, |(key, _)| start.min(key.span().0));
                    let end = self.container_end(start, at, entries.last().map(|(_, v)| v.span()));
                    self.push_node(
                        YamlNode::Mapping {
                            entries,
                            span: (start, end),
                        },
                        anchor,
                    );
                }
            }
            Event::SequenceEnd => {
                if let Some(Frame::Sequence {
                    start,
                    anchor,
                    items,
                }) = self.stack.pop()
                {
                    let end = self.container_end(start, at, items.last().map(YamlNode::span));
                    self.push_node(
                        YamlNode::Sequence {
                            items,
                            span: (start, end),
                        },
                        anchor,
                    );
                }
            }
            _ => (),
        }
    }
}

/// Length of a quoted scalar including both quotes.
fn quoted_end(rest: &str, quote: char) -> usize {
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if quote == '"' => {
                chars.next();
            }
            c if c == quote => {
                // '' is an escaped quote inside single quotes
                if quote == '\'' && matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                } else {
                    return i + c.len_utf8();
                }
            }
            _ => (),
        }
    }
    rest.len()
}

/// Length of a plain scalar on its first line.
fn plain_end(rest: &str) -> usize {
    let line = rest.split('\n').next().unwrap_or_default();
    let line = line.split(" #").next().unwrap_or_default();
    line.trim_end().len()
}

/// Length of a `|` or `>` block scalar: its header plus every following line that is blank or
/// indented at least as deep as the first content line.
fn block_scalar_end(rest: &str) -> usize {
    let mut lines = rest.split_inclusive('\n');
    let header = lines.next().unwrap_or_default();
    let mut end = header.trim_end().len();
    let mut offset = header.len();
    let mut indent = None;

    for line in lines {
        let content = line.trim_end();
        if content.trim().is_empty() {
            offset += line.len();
            continue;
        }
        let depth = content.len() - content.trim_start().len();
        let required = *indent.get_or_insert(depth);
        if depth < required || depth == 0 {
            break;
        }
        end = offset + content.len();
        offset += line.len();
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> YamlAst {
        YamlAst::parse(Path::new("test.yaml"), source).unwrap()
    }

    fn text<'a>(source: &'a str, span: Span) -> &'a str {
        &source[span.0..span.1]
    }

    #[test]
    fn block_mappings() {
        let source = "openapi: 3.1.0\ninfo:\n  title: Pets\n  version: '1.0'\npaths: {}\n";
        let ast = parse(source);

        let title = resolve_json_pointer_in_yaml_ast(&ast, "/info/title").unwrap();
        assert_eq!(text(source, title.key.unwrap()), "title");
        assert_eq!(text(source, title.value.unwrap()), "Pets");
        assert_eq!(text(source, title.node), "title: Pets");

        let version = resolve_json_pointer_in_yaml_ast(&ast, "/info/version").unwrap();
        assert_eq!(text(source, version.value.unwrap()), "'1.0'");

        let info = resolve_json_pointer_in_yaml_ast(&ast, "/info").unwrap();
        assert_eq!(text(source, info.value.unwrap()), "title: Pets\n  version: '1.0'");

        let paths = resolve_json_pointer_in_yaml_ast(&ast, "/paths").unwrap();
        assert_eq!(text(source, paths.value.unwrap()), "{}");
    }

    #[test]
    fn root_is_whole_file() {
        let source = "# pets\nopenapi: 3.1.0\n";
        let ast = parse(source);
        let root = resolve_json_pointer_in_yaml_ast(&ast, "/").unwrap();
        assert_eq!(root.node, (0, source.len()));
        assert_eq!(root.key, None);
        assert_eq!(resolve_json_pointer_in_yaml_ast(&ast, "").unwrap().node, root.node);
    }

    #[test]
    fn sequences_and_numeric_keys() {
        let source = "responses:\n  200:\n    description: ok\ntags:\n  - a\n  - \"b\"\n";
        let ast = parse(source);

        let ok = resolve_json_pointer_in_yaml_ast(&ast, "/responses/200/description").unwrap();
        assert_eq!(text(source, ok.value.unwrap()), "ok");

        let tag = resolve_json_pointer_in_yaml_ast(&ast, "/tags/1").unwrap();
        assert_eq!(tag.key, None);
        assert_eq!(text(source, tag.node), "\"b\"");

        assert!(resolve_json_pointer_in_yaml_ast(&ast, "/tags/7").is_none());
        assert!(resolve_json_pointer_in_yaml_ast(&ast, "/tags/0/name").is_none());
        assert!(resolve_json_pointer_in_yaml_ast(&ast, "/nothing").is_none());
    }

    #[test]
    fn mappings_inside_sequences() {
        let source = "parameters:\n  - name: id\n    in: path\n  - {name: limit, in: query}\n";
        let ast = parse(source);

        let first = resolve_json_pointer_in_yaml_ast(&ast, "/parameters/0").unwrap();
        assert_eq!(first.key, None);
        assert_eq!(text(source, first.node), "name: id\n    in: path");
        let name = resolve_json_pointer_in_yaml_ast(&ast, "/parameters/0/name").unwrap();
        assert_eq!(text(source, name.node), "name: id");

        let second = resolve_json_pointer_in_yaml_ast(&ast, "/parameters/1").unwrap();
        assert_eq!(text(source, second.node), "{name: limit, in: query}");
    }

    #[test]
    fn json_sources() {
        let source = r#"{"paths": {"/pets": {"get": {"tags": ["pets"]}}}}"#;
        let ast = parse(source);
        let get = resolve_json_pointer_in_yaml_ast(&ast, "/paths/~1pets/get").unwrap();
        assert_eq!(text(source, get.value.unwrap()), r#"{"tags": ["pets"]}"#);
        let tag = resolve_json_pointer_in_yaml_ast(&ast, "/paths/~1pets/get/tags/0").unwrap();
        assert_eq!(text(source, tag.node), r#""pets""#);
    }

    #[test]
    fn block_scalars() {
        let source = "description: |\n  line one\n\n  line two\nsummary: s\n";
        let ast = parse(source);
        let description = resolve_json_pointer_in_yaml_ast(&ast, "/description").unwrap();
        assert_eq!(
            text(source, description.value.unwrap()),
            "|\n  line one\n\n  line two"
        );
    }
}
