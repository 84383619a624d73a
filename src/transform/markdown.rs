// src/transform/markdown.rs
//! Node tree → Reddit-flavoured Markdown.

use once_cell::sync::OnceCell;
use regex::Regex;

use super::bbcode::{plain_text, Element, Node, Tag};

pub const STEAM_CLAN_IMAGE_ROOT: &str = "https://clan.akamai.steamstatic.com/images";
const STEAM_CLAN_IMAGE_PLACEHOLDER: &str = "{STEAM_CLAN_IMAGE}";

pub fn render(nodes: &[Node]) -> String {
    let out = render_nodes(nodes);

    // Block elements pad themselves with blank lines; squash the runs.
    static RE_BLANKS: OnceCell<Regex> = OnceCell::new();
    let re = RE_BLANKS.get_or_init(|| Regex::new(r"(?:[ \t]*\n){3,}").unwrap());
    re.replace_all(&out, "\n\n").trim().to_string()
}

fn render_nodes(nodes: &[Node]) -> String {
    nodes.iter().map(render_node).collect()
}

fn render_node(node: &Node) -> String {
    match node {
        Node::Text(t) => html_escape::decode_html_entities(t).into_owned(),
        Node::Element(e) => render_element(e),
    }
}

fn render_element(e: &Element) -> String {
    let inner = || render_nodes(&e.children);
    match e.tag {
        Tag::H1 => block(&format!("# {}", one_line(&inner()))),
        Tag::H2 => block(&format!("## {}", one_line(&inner()))),
        Tag::H3 => block(&format!("### {}", one_line(&inner()))),
        Tag::Bold => wrap(&inner(), "**", "**"),
        Tag::Italic => wrap(&inner(), "*", "*"),
        Tag::Strike => wrap(&inner(), "~~", "~~"),
        Tag::Spoiler => wrap(&inner(), ">!", "!<"),
        Tag::Underline => inner(),
        Tag::Url => {
            let text = inner();
            let href = e
                .arg
                .clone()
                .unwrap_or_else(|| plain_text(&e.children).trim().to_string());
            if href.is_empty() {
                text
            } else if text.trim().is_empty() {
                href
            } else {
                wrap(&text, "[", &format!("]({href})"))
            }
        }
        Tag::Img => {
            let src = plain_text(&e.children)
                .trim()
                .replace(STEAM_CLAN_IMAGE_PLACEHOLDER, STEAM_CLAN_IMAGE_ROOT);
            if src.is_empty() {
                String::new()
            } else {
                format!("[image]({src})")
            }
        }
        Tag::YouTube => {
            // [previewyoutube=VIDEO_ID;full][/previewyoutube]
            let id = e
                .arg
                .as_deref()
                .and_then(|a| a.split(';').next())
                .map(str::trim)
                .unwrap_or_default();
            if id.is_empty() {
                String::new()
            } else {
                block(&format!(
                    "[YouTube video](https://www.youtube.com/watch?v={id})"
                ))
            }
        }
        Tag::List => block(&render_list(e, false)),
        Tag::OList => block(&render_list(e, true)),
        Tag::Item => block(&item_lines("*", &e.children).join("\n")),
        Tag::Quote => {
            let body = inner();
            let quoted: Vec<String> = body
                .trim()
                .lines()
                .map(|l| format!("> {l}").trim_end().to_string())
                .collect();
            block(&quoted.join("\n"))
        }
        Tag::Code => {
            let raw = plain_text(&e.children);
            block(&format!("```\n{}\n```", raw.trim_matches('\n')))
        }
        Tag::NoParse => plain_text(&e.children),
        Tag::Paragraph => block(inner().trim()),
        Tag::Hr => block("---"),
        Tag::Table => {
            let rows: Vec<String> = e
                .children
                .iter()
                .filter_map(|n| match n {
                    Node::Element(r) if r.tag == Tag::Row => Some(render_row(r)),
                    _ => None,
                })
                .filter(|r| !r.is_empty())
                .collect();
            block(&rows.join("\n"))
        }
        Tag::Row => block(&render_row(e)),
        Tag::HeaderCell | Tag::Cell => one_line(&inner()),
    }
}

fn render_row(row: &Element) -> String {
    let cells: Vec<String> = row
        .children
        .iter()
        .filter_map(|n| match n {
            Node::Element(c) if matches!(c.tag, Tag::HeaderCell | Tag::Cell) => {
                Some(render_element(c))
            }
            _ => None,
        })
        .collect();
    cells.join(" | ")
}

fn render_list(list: &Element, ordered: bool) -> String {
    let mut lines = Vec::new();
    let mut n = 0;
    for child in &list.children {
        match child {
            Node::Element(item) if item.tag == Tag::Item => {
                n += 1;
                let marker = if ordered { format!("{n}.") } else { "*".to_string() };
                lines.extend(item_lines(&marker, &item.children));
            }
            Node::Text(t) if t.trim().is_empty() => {}
            other => {
                let s = render_node(other);
                lines.extend(
                    s.lines()
                        .filter(|l| !l.trim().is_empty())
                        .map(|l| l.trim_end().to_string()),
                );
            }
        }
    }
    lines.join("\n")
}

/// First line gets the marker, continuation lines are indented under it.
fn item_lines(marker: &str, children: &[Node]) -> Vec<String> {
    let body = render_nodes(children);
    let mut lines = body
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty());
    let first = lines.next().unwrap_or_default().trim_start();
    let mut out = vec![format!("{marker} {first}").trim_end().to_string()];
    out.extend(lines.map(|l| format!("    {l}")));
    out
}

fn block(s: &str) -> String {
    format!("\n\n{s}\n\n")
}

fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Wrap the non-whitespace core of `inner`, keeping its outer whitespace
/// outside the markers (`** x**` is not bold in Markdown).
fn wrap(inner: &str, open: &str, close: &str) -> String {
    let core = inner.trim();
    if core.is_empty() {
        return inner.to_string();
    }
    let lead = &inner[..inner.len() - inner.trim_start().len()];
    let trail = &inner[inner.trim_end().len()..];
    format!("{lead}{open}{core}{close}{trail}")
}
