//! Steam BBCode → node tree.
//!
//! Only known tag names become elements; anything else in brackets (patch note
//! section markers like `[ MAPS ]`, `[1]`) stays literal text. The tree is
//! forgiving: stray closing tags are dropped, unclosed tags close at the end of
//! input, and `[*]` closes the previous list item of the same list.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    H1,
    H2,
    H3,
    Bold,
    Italic,
    Underline,
    Strike,
    Url,
    Img,
    List,
    OList,
    Item,
    Quote,
    Code,
    NoParse,
    Paragraph,
    Hr,
    Spoiler,
    YouTube,
    Table,
    Row,
    HeaderCell,
    Cell,
}

impl Tag {
    pub fn from_name(name: &str) -> Option<Self> {
        let tag = match name.to_ascii_lowercase().as_str() {
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "b" => Tag::Bold,
            "i" => Tag::Italic,
            "u" => Tag::Underline,
            "s" | "strike" => Tag::Strike,
            "url" => Tag::Url,
            "img" => Tag::Img,
            "list" => Tag::List,
            "olist" => Tag::OList,
            "*" => Tag::Item,
            "quote" => Tag::Quote,
            "code" => Tag::Code,
            "noparse" => Tag::NoParse,
            "p" => Tag::Paragraph,
            "hr" => Tag::Hr,
            "spoiler" => Tag::Spoiler,
            "previewyoutube" => Tag::YouTube,
            "table" => Tag::Table,
            "tr" => Tag::Row,
            "th" => Tag::HeaderCell,
            "td" => Tag::Cell,
            _ => return None,
        };
        Some(tag)
    }

    /// Never has children; a matching close tag is ignored.
    fn is_void(self) -> bool {
        matches!(self, Tag::Hr)
    }

    /// Content up to the matching close tag is taken as-is.
    fn verbatim_close(self) -> Option<&'static str> {
        match self {
            Tag::Code => Some("[/code]"),
            Tag::NoParse => Some("[/noparse]"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub arg: Option<String>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Open(Tag, Option<String>),
    Close(Tag),
}

/// Trim and strip one layer of matching quotes: `[url="x"]` and `[url=x]` agree.
fn clean_arg(raw: &str) -> String {
    let t = raw.trim();
    for q in ['"', '\''] {
        if let Some(inner) = t.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner.to_string();
        }
    }
    t.to_string()
}

/// `rest` starts with `[`. Returns the token and its byte length.
fn parse_tag(rest: &str) -> Option<(Token, usize)> {
    let end = rest.find(']')?;
    let inner = &rest[1..end];
    if inner.is_empty() || inner.contains('[') || inner.contains('\n') {
        return None;
    }
    if let Some(name) = inner.strip_prefix('/') {
        return Some((Token::Close(Tag::from_name(name)?), end + 1));
    }
    let (name, arg) = match inner.split_once('=') {
        Some((n, a)) => (n, Some(clean_arg(a))),
        None => (inner, None),
    };
    Some((Token::Open(Tag::from_name(name)?, arg), end + 1))
}

fn tokenize(input: &str) -> Vec<Token> {
    // ASCII lowercasing keeps byte offsets aligned with `input`.
    let lower = input.to_ascii_lowercase();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];
        if rest.starts_with('[') {
            if let Some((tok, len)) = parse_tag(rest) {
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                i += len;

                let verbatim = match &tok {
                    Token::Open(tag, _) => tag.verbatim_close().map(|c| (*tag, c)),
                    _ => None,
                };
                tokens.push(tok);

                if let Some((tag, close)) = verbatim {
                    let (raw, skip) = match lower[i..].find(close) {
                        Some(off) => (&input[i..i + off], off + close.len()),
                        None => (&input[i..], input.len() - i),
                    };
                    if !raw.is_empty() {
                        tokens.push(Token::Text(raw.to_string()));
                    }
                    tokens.push(Token::Close(tag));
                    i += skip;
                }
                continue;
            }
        }
        let Some(ch) = rest.chars().next() else { break };
        text.push(ch);
        i += ch.len_utf8();
    }
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens
}

struct Frame {
    tag: Option<Tag>, // None = root
    arg: Option<String>,
    children: Vec<Node>,
}

fn push_node(stack: &mut [Frame], node: Node) {
    let Some(top) = stack.last_mut() else { return };
    if let (Node::Text(t), Some(Node::Text(prev))) = (&node, top.children.last_mut()) {
        prev.push_str(t);
        return;
    }
    top.children.push(node);
}

fn close_top(stack: &mut Vec<Frame>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(Frame {
        tag: Some(tag),
        arg,
        children,
    }) = stack.pop()
    {
        push_node(stack, Node::Element(Element { tag, arg, children }));
    }
}

/// Index of the open item of the innermost list, if any.
fn open_item(stack: &[Frame]) -> Option<usize> {
    for (idx, frame) in stack.iter().enumerate().rev() {
        match frame.tag {
            Some(Tag::Item) => return Some(idx),
            Some(Tag::List | Tag::OList) | None => return None,
            _ => {}
        }
    }
    None
}

pub fn parse(input: &str) -> Vec<Node> {
    let mut stack = vec![Frame {
        tag: None,
        arg: None,
        children: Vec::new(),
    }];

    for tok in tokenize(input) {
        match tok {
            Token::Text(t) => push_node(&mut stack, Node::Text(t)),
            Token::Open(tag, arg) => {
                if tag == Tag::Item {
                    if let Some(idx) = open_item(&stack) {
                        while stack.len() > idx {
                            close_top(&mut stack);
                        }
                    }
                }
                if tag.is_void() {
                    push_node(
                        &mut stack,
                        Node::Element(Element {
                            tag,
                            arg,
                            children: Vec::new(),
                        }),
                    );
                } else {
                    stack.push(Frame {
                        tag: Some(tag),
                        arg,
                        children: Vec::new(),
                    });
                }
            }
            Token::Close(tag) => {
                let Some(idx) = stack.iter().rposition(|f| f.tag == Some(tag)) else {
                    continue;
                };
                while stack.len() > idx {
                    close_top(&mut stack);
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|f| f.children).unwrap_or_default()
}

/// Concatenated raw text of a subtree.
pub fn plain_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    for n in nodes {
        match n {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => out.push_str(&plain_text(&e.children)),
        }
    }
    out
}
