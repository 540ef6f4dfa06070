//! DOM traversal helpers over `scraper` documents.

use scraper::{node::Node, ElementRef, Html, Selector};

/// Tags whose text never contributes to extracted content.
const IGNORE_TAGS: &[&str] = &["script", "style", "noscript", "sup"];

/// Navigation and reference chrome stripped before quote extraction.
const CHROME_CLASSES: &[&str] = &[
    "catlinks",
    "mw-editsection",
    "mw-references-wrap",
    "navbox",
    "navbox-inner",
    "reference",
    "references",
    "reflist",
    "toc",
    "vertical-navbox",
];

const CHROME_CLASS_PREFIXES: &[&str] = &["vector-toc", "toclimit-"];

const HEADING_TAGS: &[&str] = &["h2", "h3", "h4"];

/// Picks the element holding the article body, falling back to `body` and then
/// the document root.
pub(crate) fn select_content_root(document: &Html) -> ElementRef<'_> {
    let selectors = [
        "#mw-content-text .mw-parser-output",
        "#mw-content-text",
        "body .mw-parser-output",
        "body",
    ];
    for selector in selectors {
        let parsed = Selector::parse(selector).expect("valid selector");
        if let Some(node) = document.select(&parsed).next() {
            return node;
        }
    }
    document.root_element()
}

pub(crate) fn is_chrome(element: &scraper::node::Element) -> bool {
    let tag_name = element.name();
    if tag_name == "body" || tag_name == "html" {
        return false;
    }
    if IGNORE_TAGS.contains(&tag_name) {
        return true;
    }
    element.classes().any(|class_name| {
        CHROME_CLASSES.contains(&class_name)
            || CHROME_CLASS_PREFIXES
                .iter()
                .any(|prefix| class_name.starts_with(prefix))
    })
}

pub(crate) fn has_chrome_ancestor(node: &ElementRef<'_>) -> bool {
    if is_chrome(node.value()) {
        return true;
    }
    node.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_chrome(ancestor.value()))
}

/// Appends the visible text of `element`, skipping chrome subtrees. `<br>` becomes
/// a newline so multi-line list items can be split later.
pub(crate) fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) => {
                if inner.name() == "br" {
                    out.push('\n');
                    continue;
                }
                if is_chrome(inner) {
                    continue;
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn visible_text(element: ElementRef<'_>) -> String {
    let mut buf = String::new();
    collect_text(element, &mut buf);
    buf
}

pub(crate) fn is_heading(element: &ElementRef<'_>) -> bool {
    HEADING_TAGS.contains(&element.value().name())
}

/// Newer MediaWiki skins wrap each heading in `<div class="mw-heading">`.
pub(crate) fn is_heading_wrapper(element: &ElementRef<'_>) -> bool {
    element.value().classes().any(|class| class == "mw-heading")
}

/// The element whose siblings make up a heading's section: the wrapper div when
/// present, otherwise the heading itself.
pub(crate) fn heading_anchor<'a>(heading: ElementRef<'a>) -> ElementRef<'a> {
    heading
        .parent()
        .and_then(ElementRef::wrap)
        .filter(is_heading_wrapper)
        .unwrap_or(heading)
}

/// Returns the heading element carried by a sibling, looking inside heading wrappers.
pub(crate) fn sibling_heading<'a>(sibling: ElementRef<'a>) -> Option<ElementRef<'a>> {
    if is_heading(&sibling) {
        return Some(sibling);
    }
    if is_heading_wrapper(&sibling) {
        return sibling
            .children()
            .filter_map(ElementRef::wrap)
            .find(is_heading);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_body_without_content_div() {
        let document = Html::parse_document("<body><p>Body text</p></body>");
        assert_eq!(select_content_root(&document).value().name(), "body");
    }

    #[test]
    fn visible_text_skips_chrome() {
        let document = Html::parse_document(
            r#"<div id="mw-content-text"><p>Keep<sup>[1]</sup> this<span class="mw-editsection">[edit]</span><br>next</p></div>"#,
        );
        let root = select_content_root(&document);
        assert_eq!(visible_text(root), "Keep this\nnext");
    }

    #[test]
    fn anchors_wrapped_headings() {
        let document = Html::parse_document(
            r#"<div id="mw-content-text"><div class="mw-heading mw-heading3"><h3>The Pen</h3></div><ul><li>x</li></ul></div>"#,
        );
        let selector = Selector::parse("h3").expect("selector");
        let heading = document.select(&selector).next().expect("heading");
        let anchor = heading_anchor(heading);
        assert!(is_heading_wrapper(&anchor));
        assert_eq!(sibling_heading(anchor).map(|h| h.value().name()), Some("h3"));
    }
}
