use std::fmt;
use std::sync::OnceLock;

use ns_core::{Diagnostic, SourceSpan};
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Text(String),
    LineBreak,
    Element(MarkupElement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
    /// False for tags like `<k>` that never see a matching end tag.
    pub closed: bool,
}

impl MarkupElement {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

/// Plain text of a node list with tags stripped and line breaks kept.
pub fn plain_text(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::LineBreak => out.push('\n'),
            MarkupNode::Element(element) => out.push_str(&plain_text(&element.children)),
        }
    }
    out
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<(/?)(\p{L}[^<>\n]*)>").expect("tag regex must compile"))
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"([\p{L}_][\w\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'/]+))"#)
            .expect("attribute regex must compile")
    })
}

fn tag_name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^\s*([^\s/=]+)").expect("tag name regex must compile"))
}

struct OpenElement {
    element: MarkupElement,
    start_index: usize,
}

/// Parses dialogue markup text into a node tree. Holds no state between calls,
/// so nested content can be parsed with the same function.
pub fn parse_markup(text: &str, span: SourceSpan) -> (Vec<MarkupNode>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut flat: Vec<MarkupNode> = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();

    let mut last = 0usize;
    for caps in tag_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_text(&mut flat, &text[last..whole.start()]);
        last = whole.end();

        let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let is_end = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = tag_name_regex()
            .captures(inner)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        if is_end {
            let Some(open_at) = stack
                .iter()
                .rposition(|open| open.element.name.eq_ignore_ascii_case(&name))
            else {
                diagnostics.push(Diagnostic::warning(
                    "MARKUP_UNMATCHED_END_TAG",
                    format!("End tag </{}> has no matching start tag.", name),
                    span,
                ));
                continue;
            };
            while stack.len() > open_at + 1 {
                close_void(&mut flat, &mut stack);
            }
            if let Some(open) = stack.pop() {
                let mut element = open.element;
                element.children = flat.split_off(open.start_index);
                element.closed = true;
                flat.push(MarkupNode::Element(element));
            }
            continue;
        }

        let attributes = attribute_regex()
            .captures_iter(inner)
            .filter_map(|c| {
                let key = c.get(1)?.as_str().to_string();
                let value = c
                    .get(2)
                    .or_else(|| c.get(3))
                    .or_else(|| c.get(4))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                Some((key, value))
            })
            .collect();
        let element = MarkupElement {
            name,
            attributes,
            children: Vec::new(),
            closed: false,
        };
        if inner.trim_end().ends_with('/') {
            flat.push(MarkupNode::Element(element));
        } else {
            stack.push(OpenElement {
                element,
                start_index: flat.len(),
            });
        }
    }
    push_text(&mut flat, &text[last..]);

    while !stack.is_empty() {
        close_void(&mut flat, &mut stack);
    }
    (flat, diagnostics)
}

/// An element that never closed keeps no children; what followed it stays
/// at the parent level.
fn close_void(flat: &mut Vec<MarkupNode>, stack: &mut Vec<OpenElement>) {
    if let Some(open) = stack.pop() {
        let rest = flat.split_off(open.start_index);
        flat.push(MarkupNode::Element(open.element));
        flat.extend(rest);
    }
}

fn push_text(out: &mut Vec<MarkupNode>, text: &str) {
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            out.push(MarkupNode::LineBreak);
        }
        if !line.is_empty() {
            out.push(MarkupNode::Text(line.to_string()));
        }
    }
}

impl fmt::Display for MarkupNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{}", text),
            Self::LineBreak => writeln!(f),
            Self::Element(element) => {
                write!(f, "<{}", element.name)?;
                for (key, value) in &element.attributes {
                    write!(f, " {}=\"{}\"", key, value)?;
                }
                write!(f, ">")?;
                if element.closed {
                    for child in &element.children {
                        write!(f, "{}", child)?;
                    }
                    write!(f, "</{}>", element.name)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod markup_tests {
    use super::*;

    fn parse(text: &str) -> Vec<MarkupNode> {
        let (nodes, diagnostics) = parse_markup(text, SourceSpan::synthetic());
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        nodes
    }

    #[test]
    fn nested_elements_and_attributes() {
        let nodes = parse(r##"Hi <FONT incolor="#88abda" size=20>blue <U>line</U></FONT>!"##);
        assert_eq!(nodes.len(), 3);
        let MarkupNode::Element(font) = &nodes[1] else {
            panic!("expected element, got {:?}", nodes[1]);
        };
        assert_eq!(font.name, "FONT");
        assert_eq!(font.attribute("incolor"), Some("#88abda"));
        assert_eq!(font.attribute("size"), Some("20"));
        assert!(font.closed);
        assert_eq!(font.children.len(), 2);
        assert_eq!(plain_text(&nodes), "Hi blue line!");
    }

    #[test]
    fn unclosed_tags_become_void_elements() {
        let nodes = parse("wait<k>here\nnext");
        assert_eq!(
            nodes,
            vec![
                MarkupNode::Text("wait".to_string()),
                MarkupNode::Element(MarkupElement {
                    name: "k".to_string(),
                    attributes: Vec::new(),
                    children: Vec::new(),
                    closed: false,
                }),
                MarkupNode::Text("here".to_string()),
                MarkupNode::LineBreak,
                MarkupNode::Text("next".to_string()),
            ]
        );
    }

    #[test]
    fn stray_end_tag_is_reported() {
        let (nodes, diagnostics) = parse_markup("a</b>c", SourceSpan::synthetic());
        assert_eq!(diagnostics[0].code, "MARKUP_UNMATCHED_END_TAG");
        assert_eq!(plain_text(&nodes), "ac");
    }

    #[test]
    fn rendering_reparses_to_same_tree() {
        let nodes = parse(r#"<voice name="aya" src="v/001.ogg">Line<k><RUBY text="x">y</RUBY>"#);
        let rendered: String = nodes.iter().map(ToString::to_string).collect();
        assert_eq!(parse(&rendered), nodes);
    }
}
