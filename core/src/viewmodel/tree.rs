//! Flattened projection of a directory tree for UI tree widgets.

use std::collections::HashMap;

use crate::explorer::{DirPath, Directory, File, State};

/// Id of the root node.
pub const ROOT_ID: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Root {
        opened: bool,
    },
    Directory {
        path: DirPath,
        name: String,
        loading: bool,
        opened: bool,
    },
    File(File),
}

impl Node {
    /// Node id: `/` for the root, the path for directories, the full path
    /// for files.
    pub fn id(&self) -> String {
        match self {
            Node::Root { .. } => ROOT_ID.to_string(),
            Node::Directory { path, .. } => path.to_string(),
            Node::File(file) => file.full_path(),
        }
    }

    pub fn is_branch(&self) -> bool {
        !matches!(self, Node::File(_))
    }
}

/// Parent-to-children map keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    nodes: HashMap<String, Node>,
    children: HashMap<String, Vec<String>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project `root` and every loaded descendant.
    pub fn from_root(root: &Directory) -> Self {
        let mut tree = Self::new();
        tree.nodes.insert(
            ROOT_ID.to_string(),
            Node::Root {
                opened: root.is_opened(),
            },
        );
        tree.add_children(ROOT_ID, root);
        tree
    }

    fn add_children(&mut self, parent_id: &str, directory: &Directory) {
        let (Ok(sub_directories), Ok(files)) = (directory.sub_directories(), directory.files())
        else {
            return;
        };
        let mut ids = Vec::with_capacity(sub_directories.len() + files.len());

        for sub in sub_directories {
            let node = Node::Directory {
                path: sub.path().clone(),
                name: sub.name().to_string(),
                loading: matches!(sub.state(), State::Loading),
                opened: sub.is_opened(),
            };
            let id = node.id();
            self.nodes.insert(id.clone(), node);
            self.add_children(&id, sub);
            ids.push(id);
        }
        for file in files {
            let node = Node::File(file.clone());
            let id = node.id();
            self.nodes.insert(id.clone(), node);
            ids.push(id);
        }
        self.children.insert(parent_id.to_string(), ids);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Child ids of `id`, directories first. Empty for unloaded or unknown
    /// nodes.
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `id` has been loaded and so has a (possibly empty) child
    /// list.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.children.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::ConnectionId;
    use crate::explorer::Listing;

    #[test]
    fn projects_loaded_directories_only() {
        let id = ConnectionId::new();
        let mut root = Directory::root(id);
        root.load().unwrap();
        root.set_loaded(Some(Listing::new())).unwrap();
        root.open().unwrap();
        root.new_sub_directory("docs").unwrap();
        root.new_file("readme.md").unwrap();

        let docs = root.find_mut(&DirPath::new("/docs/")).unwrap();
        docs.load().unwrap();
        docs.set_loaded(Some(Listing::new())).unwrap();
        docs.new_file("a.txt").unwrap();
        root.new_sub_directory("empty").unwrap();

        let tree = Tree::from_root(&root);
        assert_eq!(tree.node(ROOT_ID), Some(&Node::Root { opened: true }));
        assert_eq!(tree.children(ROOT_ID), ["/docs/", "/empty/", "/readme.md"]);
        assert_eq!(tree.children("/docs/"), ["/docs/a.txt"]);
        assert!(tree.is_loaded("/docs/"));
        assert!(!tree.is_loaded("/empty/"));
        assert!(tree.children("/empty/").is_empty());
        assert!(matches!(tree.node("/docs/a.txt"), Some(Node::File(_))));
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn unloaded_root_has_no_children() {
        let tree = Tree::from_root(&Directory::root(ConnectionId::new()));
        assert_eq!(tree.len(), 1);
        assert!(!tree.is_loaded(ROOT_ID));
    }
}
