//! HTML 文本处理
//!
//! 接口返回的标题带有实体编码，错误页需要转为纯文本提示。

use scraper::{Html, Node};

/// 会另起一行的元素
const LINE_BREAKS: &[&str] = &[
    "br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// 不输出文本的元素
const SKIPPED: &[&str] = &["head", "script", "style", "noscript"];

/// 解码 HTML 实体，未知实体原样保留
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    Html::parse_fragment(input).root_element().text().collect()
}

/// 将一段 HTML 转为可读纯文本
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(el) if LINE_BREAKS.contains(&el.name()) => raw.push('\n'),
            Node::Text(text) => {
                let skipped = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|el| SKIPPED.contains(&el.name()))
                });
                if !skipped {
                    raw.push_str(text);
                }
            }
            _ => {}
        }
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
