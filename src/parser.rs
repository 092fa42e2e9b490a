//! Markup parser
//!
//! Single left-to-right scan over the input with an explicit open-element
//! stack, no backtracking. Malformed nesting never aborts compilation:
//! mismatched closing tags produce a [`Diagnostic`] and parsing recovers
//! using the popped element as the true boundary.

use crate::ast::{Attribute, Node, NodeKind};
use crate::error::Diagnostic;
use crate::expr;

/// Parser output: the root of the element tree plus any recoverable
/// anomalies encountered along the way.
#[derive(Debug)]
pub struct ParseOutput {
    pub root: Node,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse markup with diagnostics logged through `log::warn!`.
pub fn parse(source: &str) -> ParseOutput {
    Parser::new(source).parse()
}

/// Parse markup without logging; diagnostics are still collected.
pub fn parse_silent(source: &str) -> ParseOutput {
    Parser::new(source).silent(true).parse()
}

/// An element whose closing tag has not been seen yet. The control
/// attribute hoisted at open time is held back until the element closes,
/// so the wrapper ends up in the parent while children accumulate in the
/// inner element.
struct OpenElement {
    node: Node,
    control: Option<(NodeKind, String, Attribute)>,
}

pub struct Parser {
    chars: Vec<char>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    silent: bool,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            diagnostics: Vec::new(),
            silent: false,
        }
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn parse(mut self) -> ParseOutput {
        let mut stack = vec![OpenElement {
            node: Node::root(),
            control: None,
        }];

        while self.pos < self.chars.len() {
            match self.peek() {
                '<' => {
                    if self.lookahead("<!--") {
                        self.pos += 4;
                        self.skip_comment();
                    } else if self.lookahead("</") {
                        self.pos += 2;
                        self.parse_closing_tag(&mut stack);
                    } else {
                        self.pos += 1;
                        self.parse_opening_tag(&mut stack);
                    }
                }
                '{' => {
                    self.pos += 1;
                    self.parse_expression(&mut stack);
                }
                _ => self.parse_text(&mut stack),
            }
        }

        // Unclosed elements at end of input fold into their parents.
        while stack.len() > 1 {
            let open = stack.pop().expect("stack holds the root");
            let node = complete(open);
            stack.last_mut().expect("root remains").node.children.push(node);
        }

        ParseOutput {
            root: stack.pop().expect("root remains").node,
            diagnostics: self.diagnostics,
        }
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn lookahead(&self, expected: &str) -> bool {
        self.chars[self.pos..]
            .iter()
            .zip(expected.chars())
            .filter(|(a, b)| **a == *b)
            .count()
            == expected.len()
    }

    fn report(&mut self, message: String) {
        if !self.silent {
            log::warn!("{message}");
        }
        self.diagnostics.push(Diagnostic::new(message));
    }

    /// Skip a comment body, tracking `<!-- -->` nesting recursively. The
    /// cursor starts just past the opening `<!--`; comments contribute no
    /// node.
    fn skip_comment(&mut self) {
        while self.pos < self.chars.len() {
            if self.lookahead("<!--") {
                self.pos += 4;
                self.skip_comment();
            } else if self.lookahead("-->") {
                self.pos += 3;
                return;
            } else {
                self.pos += 1;
            }
        }
    }

    fn parse_opening_tag(&mut self, stack: &mut Vec<OpenElement>) {
        let mut element = Node::tag("");
        let mut self_closing = false;

        while self.pos < self.chars.len() {
            let c = self.peek();

            if c == '/' || c == '>' {
                if c == '/' {
                    self_closing = true;
                    self.pos += 1;
                }
                self.pos += 1;
                break;
            } else if c.is_whitespace() {
                self.pos += 1;
                self.parse_attributes(&mut element.attributes);
            } else if c == '=' {
                self.parse_attributes(&mut element.attributes);
            } else {
                element.name.push(c);
                self.pos += 1;
            }
        }

        let control = hoist_control(&mut element.attributes);

        if self_closing {
            let node = complete(OpenElement {
                node: element,
                control,
            });
            stack.last_mut().expect("root remains").node.children.push(node);
        } else {
            stack.push(OpenElement {
                node: element,
                control,
            });
        }
    }

    fn parse_closing_tag(&mut self, stack: &mut Vec<OpenElement>) {
        let mut name = String::new();

        while self.pos < self.chars.len() {
            let c = self.peek();
            self.pos += 1;
            if c == '>' {
                break;
            }
            name.push(c);
        }

        if stack.len() == 1 {
            self.report(format!("Unexpected closing tag \"{name}\""));
            return;
        }

        let open = stack.pop().expect("checked above");
        if open.node.name != name {
            self.report(format!("Unclosed tag \"{}\"", open.node.name));
        }

        let node = complete(open);
        stack.last_mut().expect("root remains").node.children.push(node);
    }

    fn parse_attributes(&mut self, attributes: &mut Vec<Attribute>) {
        while self.pos < self.chars.len() {
            let c = self.peek();

            if c == '/' || c == '>' {
                break;
            } else if c.is_whitespace() {
                self.pos += 1;
                continue;
            }

            let mut key = String::new();
            let mut value: Option<String> = None;

            while self.pos < self.chars.len() {
                let c = self.peek();

                if c == '/' || c == '>' || c.is_whitespace() {
                    // Boolean-style attribute.
                    value = Some(String::new());
                    break;
                } else if c == '=' {
                    self.pos += 1;
                    break;
                } else {
                    key.push(c);
                    self.pos += 1;
                }
            }

            let mut expression = false;
            let value = match value {
                Some(value) => value,
                None => {
                    if self.pos >= self.chars.len() {
                        String::new()
                    } else {
                        match self.peek() {
                            quote @ ('"' | '\'') => {
                                self.pos += 1;
                                self.read_until(|c| c == quote, true)
                            }
                            '{' => {
                                expression = true;
                                self.pos += 1;
                                self.read_until(|c| c == '}', true)
                            }
                            _ => self.read_until(
                                |c| c.is_whitespace() || c == '/' || c == '>',
                                false,
                            ),
                        }
                    }
                }
            };

            let (value, dynamic) = if expression {
                let translated = expr::translate(&value);
                (translated.expression, translated.dynamic)
            } else {
                (value, false)
            };

            attributes.push(Attribute {
                key,
                value,
                expression,
                dynamic,
            });
        }
    }

    /// Read characters until `stop` matches or the input ends. When
    /// `consume_stop` is set the terminating character is skipped
    /// (closing quote or brace); otherwise it is left for the caller.
    fn read_until(&mut self, stop: impl Fn(char) -> bool, consume_stop: bool) -> String {
        let mut out = String::new();

        while self.pos < self.chars.len() {
            let c = self.peek();
            if stop(c) {
                if consume_stop {
                    self.pos += 1;
                }
                break;
            }
            out.push(c);
            self.pos += 1;
        }

        out
    }

    /// Accumulate plain text up to the next `<` or `{`. Pure-whitespace
    /// runs contribute nothing.
    fn parse_text(&mut self, stack: &mut Vec<OpenElement>) {
        let content = self.read_until(|c| c == '<' || c == '{', false);

        if content.chars().all(char::is_whitespace) {
            return;
        }

        let node = Node::text(Attribute {
            key: String::new(),
            value: decode_entities(&content),
            expression: false,
            dynamic: false,
        });
        stack.last_mut().expect("root remains").node.children.push(node);
    }

    /// An embedded `{expr}` text expression.
    fn parse_expression(&mut self, stack: &mut Vec<OpenElement>) {
        let source = self.read_until(|c| c == '}', true);
        let translated = expr::translate(&source);

        let node = Node::text(Attribute {
            key: String::new(),
            value: translated.expression,
            expression: true,
            dynamic: translated.dynamic,
        });
        stack.last_mut().expect("root remains").node.children.push(node);
    }
}

/// Pull the first control-flow attribute off the element, if any. At most
/// one applies per element, first found wins; unknown `#`-keys stay as
/// ordinary attributes.
fn hoist_control(attributes: &mut Vec<Attribute>) -> Option<(NodeKind, String, Attribute)> {
    let index = attributes
        .iter()
        .position(|a| NodeKind::from_control_key(&a.key).is_some())?;
    let attribute = attributes.remove(index);
    let kind = NodeKind::from_control_key(&attribute.key).expect("position matched");
    let name = attribute.key.clone();

    Some((
        kind,
        name,
        Attribute {
            key: String::new(),
            value: attribute.value,
            expression: attribute.expression,
            dynamic: attribute.dynamic,
        },
    ))
}

fn complete(open: OpenElement) -> Node {
    match open.control {
        Some((kind, name, attribute)) => Node::control(kind, name, attribute, open.node),
        None => open.node,
    }
}

/// Decode the fixed entity set in one pass. Escaping for code embedding
/// happens in the emitter, not here; the tree carries decoded text.
fn decode_entities(content: &str) -> String {
    const ENTITIES: &[(&str, char)] = &[
        ("&amp;", '&'),
        ("&gt;", '>'),
        ("&lt;", '<'),
        ("&nbsp;", ' '),
        ("&quot;", '"'),
    ];

    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    'outer: while let Some(offset) = rest.find('&') {
        out.push_str(&rest[..offset]);
        rest = &rest[offset..];

        for (entity, decoded) in ENTITIES {
            if rest.starts_with(entity) {
                out.push(*decoded);
                rest = &rest[entity.len()..];
                continue 'outer;
            }
        }

        out.push('&');
        rest = &rest[1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child<'a>(node: &'a Node, index: usize) -> &'a Node {
        &node.children[index]
    }

    #[test]
    fn single_element_with_text_expression() {
        let output = parse_silent("<h1>{title}</h1>");
        assert!(output.diagnostics.is_empty());

        let h1 = child(&output.root, 0);
        assert_eq!(h1.kind, NodeKind::Tag);
        assert_eq!(h1.name, "h1");

        let text = child(h1, 0);
        assert_eq!(text.kind, NodeKind::Text);
        assert_eq!(text.attributes[0].value, "instance.title");
        assert!(text.attributes[0].expression);
        assert!(text.attributes[0].dynamic);
    }

    #[test]
    fn attribute_forms() {
        let output = parse_silent(r#"<input disabled type="text" size=4 value={draft}/>"#);
        let input = child(&output.root, 0);
        assert_eq!(input.attributes.len(), 4);

        assert_eq!(input.attributes[0].key, "disabled");
        assert_eq!(input.attributes[0].value, "");

        assert_eq!(input.attributes[1].key, "type");
        assert_eq!(input.attributes[1].value, "text");
        assert!(!input.attributes[1].expression);

        assert_eq!(input.attributes[2].key, "size");
        assert_eq!(input.attributes[2].value, "4");

        assert_eq!(input.attributes[3].key, "value");
        assert_eq!(input.attributes[3].value, "instance.draft");
        assert!(input.attributes[3].expression);
        assert!(input.attributes[3].dynamic);
    }

    #[test]
    fn self_closing_has_no_children() {
        let output = parse_silent("<br/><p>x</p>");
        assert_eq!(output.root.children.len(), 2);
        assert!(child(&output.root, 0).children.is_empty());
        assert_eq!(child(&output.root, 1).name, "p");
    }

    #[test]
    fn control_attribute_wraps_element() {
        let output = parse_silent("<div #if={a}><span/></div>");
        let wrapper = child(&output.root, 0);
        assert_eq!(wrapper.kind, NodeKind::If);
        assert_eq!(wrapper.name, "#if");
        assert_eq!(wrapper.attributes.len(), 1);
        assert_eq!(wrapper.attributes[0].key, "");
        assert_eq!(wrapper.attributes[0].value, "instance.a");
        assert!(wrapper.attributes[0].dynamic);

        // Children land inside the wrapped element, not the wrapper.
        let div = child(wrapper, 0);
        assert_eq!(div.name, "div");
        assert!(div.attributes.is_empty());
        assert_eq!(child(div, 0).name, "span");
    }

    #[test]
    fn first_control_attribute_wins() {
        let output = parse_silent("<div #if={a} #for={x in xs}/>");
        let wrapper = child(&output.root, 0);
        assert_eq!(wrapper.kind, NodeKind::If);

        // The losing control attribute stays on the inner element.
        let div = child(wrapper, 0);
        assert_eq!(div.attributes.len(), 1);
        assert_eq!(div.attributes[0].key, "#for");
    }

    #[test]
    fn else_control_carries_empty_expression() {
        let output = parse_silent("<div #else>x</div>");
        let wrapper = child(&output.root, 0);
        assert_eq!(wrapper.kind, NodeKind::Else);
        assert_eq!(wrapper.attributes[0].value, "");
        assert!(!wrapper.attributes[0].expression);
    }

    #[test]
    fn nested_comments_contribute_nothing() {
        let output = parse_silent("<p><!-- a <!-- nested --> b --></p>");
        let p = child(&output.root, 0);
        assert!(p.children.is_empty());
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn whitespace_only_text_skipped() {
        let output = parse_silent("<div>\n   \t</div>");
        assert!(child(&output.root, 0).children.is_empty());
    }

    #[test]
    fn entities_decoded_in_text() {
        let output = parse_silent("<p>a &amp;&lt;b&gt; &quot;c&quot;&nbsp;&amp;gt;</p>");
        let text = child(child(&output.root, 0), 0);
        assert_eq!(text.attributes[0].value, "a &<b> \"c\" &gt;");
    }

    #[test]
    fn mismatched_closing_tag_recovers() {
        let output = parse_silent("<div><span>x</div>");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].message, "Unclosed tag \"span\"");

        // The popped element is the boundary; the div close then matches
        // nothing and folds at end of input.
        let div = child(&output.root, 0);
        assert_eq!(div.name, "div");
        let span = child(div, 0);
        assert_eq!(span.name, "span");
        assert_eq!(child(span, 0).attributes[0].value, "x");
    }

    #[test]
    fn stray_closing_tag_reported_and_skipped() {
        let output = parse_silent("</div><p>x</p>");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(
            output.diagnostics[0].message,
            "Unexpected closing tag \"div\""
        );
        assert_eq!(output.root.children.len(), 1);
    }

    #[test]
    fn unclosed_elements_fold_at_end_of_input() {
        let output = parse_silent("<ul><li>one");
        let ul = child(&output.root, 0);
        assert_eq!(ul.name, "ul");
        let li = child(ul, 0);
        assert_eq!(li.name, "li");
        assert_eq!(child(li, 0).attributes[0].value, "one");
    }

    #[test]
    fn event_attribute_preserved_with_sigil() {
        let output = parse_silent("<button @click={increment($event)}>+</button>");
        let button = child(&output.root, 0);
        assert_eq!(button.attributes[0].key, "@click");
        assert_eq!(
            button.attributes[0].value,
            "instance.increment(locals.$event)"
        );
        assert!(button.attributes[0].dynamic);
    }

    #[test]
    fn sibling_chain_shape() {
        let output =
            parse_silent("<a #if={a}>A</a><b #elseif={c}>B</b><c #else>C</c>");
        let kinds: Vec<NodeKind> = output.root.children.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NodeKind::If, NodeKind::ElseIf, NodeKind::Else]);
    }
}
