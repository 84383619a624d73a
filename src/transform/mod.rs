//! Steam BBCode → Reddit Markdown.
//!
//! Two stages: parse into a node tree and render it ([`bbcode`], [`markdown`]),
//! then promote section-marker lines to headings ([`headings`]). Pure.

pub mod bbcode;
pub mod headings;
pub mod markdown;

pub fn transform(body_markup: &str) -> String {
    let normalized = body_markup.replace("\r\n", "\n").replace('\r', "\n");
    let tree = bbcode::parse(&normalized);
    let rendered = markdown::render(&tree);
    headings::promote(&rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_marker_becomes_h3_and_rest_is_kept() {
        let out = transform("[ WEAPONS ]\n...");
        assert_eq!(out, "### WEAPONS\n...");
    }

    #[test]
    fn label_becomes_h4() {
        assert_eq!(transform("Maps:\n"), "#### Maps");
    }

    #[test]
    fn typical_patch_notes() {
        let src = "[p][ MAPS ][/p]\r\n[p]Ancient:[/p][list]\r\n[*]Fixed a wallbang &amp; a boost spot\r\n[/list]";
        assert_eq!(
            transform(src),
            "### MAPS\n\n#### Ancient\n\n* Fixed a wallbang & a boost spot"
        );
    }

    #[test]
    fn is_deterministic() {
        let src = "[h1]Release Notes[/h1][list][*]a[*]b[/list]";
        assert_eq!(transform(src), transform(src));
        assert_eq!(transform(""), "");
    }
}
