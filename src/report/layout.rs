// ABOUTME: Rectangular tree layout and inline SVG rendering
// ABOUTME: Leaf rows, branch-length x positions, support-colored nodes

use std::fmt::Write as _;

use super::newick::Tree;

const ROW_HEIGHT: f64 = 18.0;
const TREE_WIDTH: f64 = 560.0;
const LABEL_GUTTER: f64 = 8.0;
const MARGIN: f64 = 12.0;

/// Computed positions for every node, in SVG user units.
struct Placement {
    x: Vec<f64>,
    y: Vec<f64>,
}

/// Render the tree as a self-contained SVG fragment. Leaf labels carry
/// `data-id` attributes so the report's search box can highlight them.
pub fn render_svg(tree: &Tree) -> String {
    let placement = place(tree);
    let rows = tree.leaf_count().max(1);
    let height = rows as f64 * ROW_HEIGHT + 2.0 * MARGIN;
    let label_space = longest_label(tree) as f64 * 7.5 + LABEL_GUTTER;
    let width = TREE_WIDTH + label_space + 2.0 * MARGIN;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg class="tree" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {:.0} {:.0}" width="{:.0}" height="{:.0}">"#,
        width, height, width, height
    );

    render_edges(tree, &placement, tree.root, &mut svg);
    render_nodes(tree, &placement, &mut svg);

    svg.push_str("</svg>");
    svg
}

fn place(tree: &Tree) -> Placement {
    let mut x = vec![0.0; tree.nodes.len()];
    let mut y = vec![0.0; tree.nodes.len()];

    // x: cumulative branch length, scaled into TREE_WIDTH
    let mut max_depth: f64 = 0.0;
    for index in 0..tree.nodes.len() {
        x[index] = tree.depth(index);
        max_depth = max_depth.max(x[index]);
    }
    // a tree without branch lengths degenerates to unit depths
    if max_depth <= f64::EPSILON {
        assign_unit_depths(tree, tree.root, 0.0, &mut x);
        max_depth = x.iter().cloned().fold(0.0, f64::max).max(1.0);
    }
    for value in x.iter_mut() {
        *value = MARGIN + *value / max_depth * TREE_WIDTH;
    }

    // y: leaves in drawing order, internals centered over their children
    let mut next_row = 0usize;
    assign_rows(tree, tree.root, &mut next_row, &mut y);
    Placement { x, y }
}

fn assign_unit_depths(tree: &Tree, index: usize, depth: f64, x: &mut [f64]) {
    x[index] = depth;
    for &child in &tree.nodes[index].children {
        assign_unit_depths(tree, child, depth + 1.0, x);
    }
}

fn assign_rows(tree: &Tree, index: usize, next_row: &mut usize, y: &mut [f64]) -> f64 {
    let node = &tree.nodes[index];
    if node.is_leaf() {
        let row = *next_row;
        *next_row += 1;
        y[index] = MARGIN + (row as f64 + 0.5) * ROW_HEIGHT;
        return y[index];
    }
    let child_ys: Vec<f64> = node
        .children
        .iter()
        .map(|&child| assign_rows(tree, child, next_row, y))
        .collect();
    y[index] = child_ys.iter().sum::<f64>() / child_ys.len() as f64;
    y[index]
}

fn render_edges(tree: &Tree, placement: &Placement, index: usize, svg: &mut String) {
    let node = &tree.nodes[index];
    for &child in &node.children {
        // elbow connector: vertical at the parent's x, then horizontal
        let _ = write!(
            svg,
            r#"<path class="edge" d="M{:.1} {:.1} V{:.1} H{:.1}" fill="none"/>"#,
            placement.x[index], placement.y[index], placement.y[child], placement.x[child]
        );
        render_edges(tree, placement, child, svg);
    }
}

fn render_nodes(tree: &Tree, placement: &Placement, svg: &mut String) {
    for (index, node) in tree.nodes.iter().enumerate() {
        let x = placement.x[index];
        let y = placement.y[index];

        if node.is_leaf() {
            let name = node.name.as_deref().unwrap_or("");
            let _ = write!(
                svg,
                r#"<text class="leaf" data-id="{}" x="{:.1}" y="{:.1}">{}</text>"#,
                escape(name),
                x + LABEL_GUTTER,
                y + 4.0,
                escape(name)
            );
        } else if let Some(support) = node.support {
            let _ = write!(
                svg,
                r#"<circle class="node {}" cx="{:.1}" cy="{:.1}" r="3.5"><title>support {:.0}</title></circle>"#,
                support_class(support),
                x,
                y,
                support
            );
        }
    }
}

fn support_class(support: f64) -> &'static str {
    if support >= 90.0 {
        "strong"
    } else if support >= 70.0 {
        "moderate"
    } else {
        "weak"
    }
}

fn longest_label(tree: &Tree) -> usize {
    tree.leaf_names().iter().map(|n| n.len()).max().unwrap_or(0)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svg_contains_leaves_and_edges() {
        let tree = Tree::parse("((A:0.1,B:0.2)95:0.05,C:0.3);").unwrap();
        let svg = render_svg(&tree);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(r#"data-id="A""#));
        assert!(svg.contains(r#"data-id="C""#));
        assert!(svg.contains(r#"class="node strong""#));
        assert_eq!(svg.matches("<path").count(), 4);
    }

    #[test]
    fn test_support_classes() {
        assert_eq!(support_class(97.0), "strong");
        assert_eq!(support_class(75.0), "moderate");
        assert_eq!(support_class(12.0), "weak");
    }

    #[test]
    fn test_lengthless_tree_still_renders() {
        let tree = Tree::parse("((A,B),C);").unwrap();
        let svg = render_svg(&tree);
        assert!(svg.contains(r#"data-id="B""#));
    }

    #[test]
    fn test_labels_are_escaped() {
        let tree = Tree::parse("('A<1>':0.1,B:0.2);").unwrap();
        let svg = render_svg(&tree);
        assert!(svg.contains("A&lt;1&gt;"));
        assert!(!svg.contains("A<1>"));
    }
}
