// ABOUTME: Recursive-descent Newick parser for support-annotated trees
// ABOUTME: Handles quoted labels, branch lengths, and integer support values

use super::error::{ReportError, Result};

/// One node of a parsed tree. Children index into `Tree::nodes`.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: Option<String>,
    pub length: f64,
    /// Branch support in percent, as written by raxml-ng --support.
    pub support: Option<f64>,
    pub children: Vec<usize>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub root: usize,
}

impl Tree {
    pub fn parse(text: &str) -> Result<Self> {
        Parser::new(text).parse()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn leaf_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_leaves(self.root, &mut names);
        names
    }

    fn collect_leaves<'a>(&'a self, index: usize, names: &mut Vec<&'a str>) {
        let node = &self.nodes[index];
        if node.is_leaf() {
            if let Some(ref name) = node.name {
                names.push(name);
            }
        }
        for &child in &node.children {
            self.collect_leaves(child, names);
        }
    }

    /// Cumulative branch length from the root to this node.
    pub fn depth(&self, index: usize) -> f64 {
        // parent pointers are not stored; recompute by walking down
        fn walk(tree: &Tree, current: usize, target: usize, acc: f64) -> Option<f64> {
            let node = &tree.nodes[current];
            let here = acc + node.length;
            if current == target {
                return Some(here);
            }
            node.children
                .iter()
                .find_map(|&child| walk(tree, child, target, here))
        }
        walk(self, self.root, index, 0.0).unwrap_or(0.0)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Tree> {
        self.skip_whitespace();
        let root = self.parse_subtree()?;
        self.skip_whitespace();
        if self.peek() != Some(b';') {
            return Err(self.error("expected ';' at end of tree"));
        }
        Ok(Tree {
            nodes: self.nodes,
            root,
        })
    }

    fn parse_subtree(&mut self) -> Result<usize> {
        self.skip_whitespace();
        let mut node = Node::default();

        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                let child = self.parse_subtree()?;
                node.children.push(child);
                self.skip_whitespace();
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                    }
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')' in subtree")),
                }
            }
            // internal labels from --support runs are support values
            if let Some(label) = self.parse_label()? {
                match label.parse::<f64>() {
                    Ok(value) => node.support = Some(value),
                    Err(_) => node.name = Some(label),
                }
            }
        } else {
            node.name = match self.parse_label()? {
                Some(label) if !label.is_empty() => Some(label),
                _ => return Err(self.error("expected a leaf label")),
            };
        }

        if self.peek() == Some(b':') {
            self.pos += 1;
            node.length = self.parse_number()?;
        }
        // raxml-ng can also attach support as [xx] comments
        if self.peek() == Some(b'[') {
            let start = self.pos;
            while let Some(byte) = self.peek() {
                self.pos += 1;
                if byte == b']' {
                    break;
                }
            }
            let comment = &self.bytes[start + 1..self.pos.saturating_sub(1)];
            if let Ok(value) = std::str::from_utf8(comment).unwrap_or("").parse::<f64>() {
                node.support = Some(value);
            }
        }

        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    fn parse_label(&mut self) -> Result<Option<String>> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'\'') => {
                self.pos += 1;
                let start = self.pos;
                while let Some(byte) = self.peek() {
                    if byte == b'\'' {
                        break;
                    }
                    self.pos += 1;
                }
                if self.peek() != Some(b'\'') {
                    return Err(self.error("unterminated quoted label"));
                }
                let label = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.pos += 1;
                Ok(Some(label))
            }
            Some(byte) if !b"(),:;[".contains(&byte) => {
                let start = self.pos;
                while let Some(byte) = self.peek() {
                    if b"(),:;[".contains(&byte) || byte.is_ascii_whitespace() {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(Some(
                    String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned(),
                ))
            }
            _ => Ok(None),
        }
    }

    fn parse_number(&mut self) -> Result<f64> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_digit() || b".-+eE".contains(&byte) {
                self.pos += 1;
            } else {
                break;
            }
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("expected a branch length"))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(byte) if byte.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> ReportError {
        ReportError::NewickError {
            position: self.pos,
            message: message.to_string(),
        }
    }
}
