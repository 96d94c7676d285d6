use scraper::{Html, Node};

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "blockquote", "pre", "table",
];

/// Reduces an HTML fragment to plain text, one line per block element, with
/// whitespace collapsed.
pub fn strip_html(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return collapse_whitespace(fragment);
    }

    let parsed = Html::parse_fragment(fragment);
    let mut text = String::with_capacity(fragment.len());
    for node in parsed.root_element().descendants() {
        match node.value() {
            Node::Text(chunk) => text.push_str(chunk),
            Node::Element(element) if BLOCK_TAGS.contains(&element.name()) => text.push('\n'),
            _ => {}
        }
    }
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_elements_become_lines() {
        let html = "<p>Write <b>API</b> docs.</p><ul><li>Remote</li><li>Full-time</li></ul>";
        assert_eq!(strip_html(html), "Write API docs.\nRemote\nFull-time");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(strip_html("Docs &amp; tutorials&nbsp;team"), "Docs & tutorials team");
    }

    #[test]
    fn plain_text_is_only_trimmed() {
        assert_eq!(strip_html("  Senior   writer\n\n remote "), "Senior writer\nremote");
    }
}
