//! Script node tree
//!
//! Script files are indentation-delimited. A line ending in `:` opens a section
//! whose body is every following line indented deeper than it. Everything else is
//! a simple line until a structure asks for it to be split into `key`/`value`
//! entries with [`SectionNode::convert_to_entries`].

use std::fmt;

/// Tree building errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// Line is indented but no section was opened above it
    #[error("Unexpected indentation at line {line}")]
    UnexpectedIndentation { line: usize },

    /// Line mixes tabs and spaces, or disagrees with the file's indentation style
    #[error("Inconsistent indentation at line {line}: {message}")]
    InconsistentIndentation { line: usize, message: String },
}

/// A plain line inside a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleNode {
    pub key: String,
    pub line: usize,
}

/// A `key: value` (or `key = value`) line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNode {
    pub key: String,
    pub value: String,
    pub line: usize,
}

impl EntryNode {
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A section header and its indented body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionNode {
    pub key: String,
    pub line: usize,
    nodes: Vec<Node>,
}

/// Any node of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Simple(SimpleNode),
    Entry(EntryNode),
    Section(SectionNode),
}

impl Node {
    pub fn key(&self) -> &str {
        match self {
            Node::Simple(n) => &n.key,
            Node::Entry(n) => &n.key,
            Node::Section(n) => &n.key,
        }
    }

    /// 1-based source line (0 for a file root)
    pub fn line(&self) -> usize {
        match self {
            Node::Simple(n) => n.line,
            Node::Entry(n) => n.line,
            Node::Section(n) => n.line,
        }
    }
}

struct RawLine {
    indent: usize,
    text: String,
    number: usize,
}

impl SectionNode {
    pub fn new(key: impl Into<String>, line: usize) -> Self {
        Self {
            key: key.into(),
            line,
            nodes: Vec::new(),
        }
    }

    /// Parse a whole file into a root section named after the file
    pub fn parse(name: &str, source: &str) -> Result<Self, NodeError> {
        let lines = Self::split_lines(source)?;
        let mut root = SectionNode::new(name, 0);
        let mut pos = 0;
        Self::build(&lines, &mut pos, 0, &mut root)?;
        if let Some(line) = lines.get(pos) {
            return Err(NodeError::UnexpectedIndentation { line: line.number });
        }
        Ok(root)
    }

    fn split_lines(source: &str) -> Result<Vec<RawLine>, NodeError> {
        let mut style: Option<char> = None;
        let mut lines = Vec::new();

        for (index, raw) in source.lines().enumerate() {
            let number = index + 1;
            let text = strip_comment(raw);
            let content = text.trim();
            if content.is_empty() {
                continue;
            }

            let prefix: String = text.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            if prefix.contains(' ') && prefix.contains('\t') {
                return Err(NodeError::InconsistentIndentation {
                    line: number,
                    message: "tabs and spaces are mixed".into(),
                });
            }
            if let Some(c) = prefix.chars().next() {
                match style {
                    None => style = Some(c),
                    Some(s) if s != c => {
                        return Err(NodeError::InconsistentIndentation {
                            line: number,
                            message: "indentation style differs from the rest of the file".into(),
                        })
                    }
                    Some(_) => {}
                }
            }

            lines.push(RawLine {
                indent: prefix.chars().count(),
                text: content.to_string(),
                number,
            });
        }

        Ok(lines)
    }

    fn build(lines: &[RawLine], pos: &mut usize, indent: usize, parent: &mut SectionNode) -> Result<(), NodeError> {
        while let Some(line) = lines.get(*pos) {
            if line.indent < indent {
                return Ok(());
            }
            if line.indent > indent {
                return Err(NodeError::UnexpectedIndentation { line: line.number });
            }
            *pos += 1;

            match line.text.strip_suffix(':') {
                Some(header) => {
                    let mut section = SectionNode::new(header.trim_end(), line.number);
                    if let Some(next) = lines.get(*pos) {
                        if next.indent > indent {
                            let body_indent = next.indent;
                            Self::build(lines, pos, body_indent, &mut section)?;
                        }
                    }
                    if section.is_empty() {
                        tracing::warn!("Empty section '{}' at line {}", section.key, section.line);
                    }
                    parent.nodes.push(Node::Section(section));
                }
                None => parent.nodes.push(Node::Simple(SimpleNode {
                    key: line.text.clone(),
                    line: line.number,
                })),
            }
        }
        Ok(())
    }

    /// Copy of this section with `key<separator>value` lines turned into entries
    ///
    /// `levels` bounds the depth: `0` converts only direct children, a negative
    /// value converts the whole subtree.
    pub fn convert_to_entries(&self, levels: i32, separator: &str) -> SectionNode {
        let nodes = self
            .nodes
            .iter()
            .map(|node| match node {
                Node::Simple(simple) => match simple.key.split_once(separator) {
                    Some((key, value)) if !key.trim().is_empty() => Node::Entry(EntryNode {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                        line: simple.line,
                    }),
                    _ => node.clone(),
                },
                Node::Section(section) if levels != 0 => {
                    Node::Section(section.convert_to_entries(levels - 1, separator))
                }
                other => other.clone(),
            })
            .collect();

        SectionNode {
            key: self.key.clone(),
            line: self.line,
            nodes,
        }
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First child with the given key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key().eq_ignore_ascii_case(key))
    }

    /// Value of the entry with the given key
    pub fn get_value(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Node::Entry(entry)) => Some(&entry.value),
            _ => None,
        }
    }
}

impl<'a> IntoIterator for &'a SectionNode {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl fmt::Display for SectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.key, self.line)
    }
}

/// Drop a trailing `#` comment, `##` stands for a literal `#`
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '#' {
            if chars.peek() == Some(&'#') {
                chars.next();
                out.push('#');
                continue;
            }
            break;
        }
        out.push(c);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_lines() {
        let source = "options:\n  greeting: hi\n\non chat:\n  send {@greeting} # say it\n";
        let root = SectionNode::parse("test.sk", source).unwrap();
        assert_eq!(root.len(), 2);

        match &root.nodes()[1] {
            Node::Section(section) => {
                assert_eq!(section.key, "on chat");
                assert_eq!(section.line, 4);
                assert_eq!(section.nodes()[0].key(), "send {@greeting}");
            }
            other => panic!("expected section, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_sections() {
        let source = "command /ping:\n\ttrigger:\n\t\tsend \"pong\"\n\tusage: /ping\n";
        let root = SectionNode::parse("test.sk", source).unwrap();
        let Node::Section(command) = &root.nodes()[0] else { panic!() };
        assert_eq!(command.len(), 2);
        let Node::Section(trigger) = command.get("trigger").unwrap() else { panic!() };
        assert_eq!(trigger.nodes()[0].line(), 3);
    }

    #[test]
    fn test_bad_indentation() {
        assert!(matches!(
            SectionNode::parse("t", "  indented"),
            Err(NodeError::UnexpectedIndentation { line: 1 })
        ));
        assert!(matches!(
            SectionNode::parse("t", "a:\n  b\n\tc"),
            Err(NodeError::InconsistentIndentation { line: 3, .. })
        ));
    }

    #[test]
    fn test_comment_escape() {
        let root = SectionNode::parse("t", "send \"##1\" # comment").unwrap();
        assert_eq!(root.nodes()[0].key(), "send \"#1\"");
    }

    #[test]
    fn test_convert_to_entries_levels() {
        let root = SectionNode::parse("t", "a: 1\nsub:\n  b: 2\n  deeper:\n    c: 3\nplain").unwrap();

        let shallow = root.convert_to_entries(0, ":");
        assert_eq!(shallow.get_value("a"), Some("1"));
        let Node::Section(sub) = shallow.get("sub").unwrap() else { panic!() };
        assert!(matches!(sub.get("b"), None));

        let deep = root.convert_to_entries(-1, ":");
        let Node::Section(sub) = deep.get("sub").unwrap() else { panic!() };
        assert_eq!(sub.get_value("b"), Some("2"));
        assert!(matches!(deep.get("plain"), Some(Node::Simple(_))));
    }
}
