use crate::ast::{Node, NodeKind};

/// Render an inline subtree back to equivalent Markdown text.
pub fn inline_text(node: &Node) -> String {
    let mut out = String::new();
    push_inline(node, &mut out);
    out
}

/// Render a run of sibling nodes.
pub fn inline_text_of(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        push_inline(node, &mut out);
    }
    out
}

fn push_inline(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Emphasis => wrap("_", node, out),
        NodeKind::Strong => wrap("**", node, out),
        NodeKind::Strikethrough => wrap("~~", node, out),
        NodeKind::Code(code) => {
            out.push('`');
            out.push_str(code);
            out.push('`');
        }
        NodeKind::SoftBreak | NodeKind::HardBreak => out.push('\n'),
        NodeKind::Link { url } => {
            out.push('[');
            push_children(node, out);
            out.push_str("](");
            out.push_str(url);
            out.push(')');
        }
        NodeKind::Image { url, .. } => {
            out.push_str("![");
            push_children(node, out);
            out.push_str("](");
            out.push_str(url);
            out.push(')');
        }
        NodeKind::InlineHtml(raw) => out.push_str(raw),
        NodeKind::FootnoteReference(label) => {
            out.push_str("[^");
            out.push_str(label);
            out.push(']');
        }
        _ => push_children(node, out),
    }
}

fn wrap(marker: &str, node: &Node, out: &mut String) {
    out.push_str(marker);
    push_children(node, out);
    out.push_str(marker);
}

fn push_children(node: &Node, out: &mut String) {
    for child in &node.children {
        push_inline(child, out);
    }
}
