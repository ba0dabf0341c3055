use serde::{Deserialize, Serialize};

/// Index path from the root to a node: the child position taken at each level.
pub type NodePath = Vec<usize>;

/// An ordered tree. Sibling order is significant; siblings are told apart by their slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode<T> {
    pub value: T,
    pub children: Vec<TreeNode<T>>,
}

impl<T> TreeNode<T> {
    pub fn new(value: T, children: Vec<TreeNode<T>>) -> Self {
        Self { value, children }
    }

    pub fn leaf(value: T) -> Self {
        Self::new(value, Vec::new())
    }

    pub fn node(&self, path: &[usize]) -> Option<&TreeNode<T>> {
        let mut node = self;
        for &idx in path {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode<T>> {
        let mut node = self;
        for &idx in path {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }

    /// Values from the root down to the node at `path`, inclusive.
    pub fn path_from_root(&self, path: &[usize]) -> Vec<&T> {
        let mut out = Vec::with_capacity(path.len() + 1);
        let mut node = self;
        out.push(&node.value);
        for &idx in path {
            match node.children.get(idx) {
                Some(child) => {
                    node = child;
                    out.push(&node.value);
                }
                None => break,
            }
        }
        out
    }

    /// Pre-order walk.
    pub fn for_each<'a>(&'a self, f: &mut impl FnMut(&'a T)) {
        f(&self.value);
        for child in &self.children {
            child.for_each(f);
        }
    }

    pub fn map<U>(&self, f: &mut impl FnMut(&T) -> U) -> TreeNode<U> {
        TreeNode {
            value: f(&self.value),
            children: self.children.iter().map(|c| c.map(f)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_lookup() {
        let tree = TreeNode::new(
            "root",
            vec![
                TreeNode::new("a", vec![TreeNode::leaf("a1")]),
                TreeNode::leaf("b"),
            ],
        );

        assert_eq!(tree.node(&[0, 0]).map(|n| n.value), Some("a1"));
        assert!(tree.node(&[1, 0]).is_none());
        assert_eq!(tree.path_from_root(&[0, 0]), vec![&"root", &"a", &"a1"]);

        let mut seen = Vec::new();
        tree.for_each(&mut |v| seen.push(*v));
        assert_eq!(seen, vec!["root", "a", "a1", "b"]);
    }
}
