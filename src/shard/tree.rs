use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::key::{ShardAddress, ShardKey};
use crate::error::{Error, Result};

/// Name of the directory holding the leaves inside a compilation.
pub const DATA_DIR: &str = "data";

/// A leaf file and the address it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLeaf {
    pub address: ShardAddress,
    pub path: PathBuf,
}

/// In-memory model of the shard tree: a leaf file, or a prefix directory
/// whose children are keyed by the next byte class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(PathBuf),
    Internal(Vec<(ShardKey, Node)>),
}

impl Node {
    /// Read the directory at `dir` into a node tree. Entries whose names are
    /// not a valid key (stale temp or run files, stray notes) are skipped.
    pub fn scan(dir: &Path) -> Result<Node> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(|e| Error::unreadable(dir, e))?
            .collect::<std::io::Result<_>>()
            .map_err(|e| Error::unreadable(dir, e))?;
        entries.sort_by_key(|e| e.file_name());

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(ShardKey::from_file_name) else {
                warn!("ignoring non-leaf entry {}", path.display());
                continue;
            };
            let file_type = entry.file_type().map_err(|e| Error::unreadable(&path, e))?;
            let child = if file_type.is_dir() {
                Node::scan(&path)?
            } else {
                Node::Leaf(path)
            };
            children.push((key, child));
        }
        Ok(Node::Internal(children))
    }

    /// Depth-first list of every leaf below this node.
    pub fn leaves(&self) -> Vec<ShardLeaf> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_leaves(&mut prefix, &mut out);
        out
    }

    fn collect_leaves(&self, prefix: &mut Vec<ShardKey>, out: &mut Vec<ShardLeaf>) {
        match self {
            Node::Leaf(path) => out.push(ShardLeaf {
                address: ShardAddress::new(prefix.clone()),
                path: path.clone(),
            }),
            Node::Internal(children) => {
                for (key, child) in children {
                    prefix.push(*key);
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
        }
    }

    /// Follow `record`'s bytes down the tree to the leaf that owns it.
    pub fn locate(&self, record: &[u8]) -> Option<ShardLeaf> {
        let mut node = self;
        let mut keys = Vec::new();
        loop {
            match node {
                Node::Leaf(path) => {
                    return Some(ShardLeaf {
                        address: ShardAddress::new(keys),
                        path: path.clone(),
                    });
                }
                Node::Internal(children) => {
                    let &byte = record.get(keys.len())?;
                    let (key, child) = children.iter().find(|(k, _)| k.accepts(byte))?;
                    keys.push(*key);
                    node = child;
                }
            }
        }
    }
}

/// Resolve where the leaves live: `<compilation>/data`, unless the path
/// already names the data directory.
pub fn resolve_data_dir(compilation: &Path) -> PathBuf {
    if compilation.file_name().is_some_and(|n| n == DATA_DIR) {
        compilation.to_path_buf()
    } else {
        compilation.join(DATA_DIR)
    }
}

/// Prefix-sharded directory of leaf files.
#[derive(Debug, Clone)]
pub struct ShardTree {
    root: PathBuf,
}

impl ShardTree {
    /// Open the tree at `root`, creating the directory and one empty leaf
    /// per key if it does not exist yet. An existing directory is trusted
    /// as-is.
    pub fn bootstrap(root: impl Into<PathBuf>) -> Result<ShardTree> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| Error::disk(&root, e))?;
            for key in ShardKey::all() {
                let path = root.join(key.file_name());
                File::create(&path).map_err(|e| Error::disk(&path, e))?;
            }
            info!("created shard tree at {}", root.display());
        }
        Ok(ShardTree { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> Result<Node> {
        Node::scan(&self.root)
    }

    /// Every leaf currently on disk, depth-first.
    pub fn enumerate_leaves(&self) -> Result<Vec<ShardLeaf>> {
        Ok(self.scan()?.leaves())
    }

    pub fn locate(&self, record: &[u8]) -> Result<Option<ShardLeaf>> {
        Ok(self.scan()?.locate(record))
    }
}
