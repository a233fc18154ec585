//! Reverse index from tag id to the nodes carrying it, built incrementally
//! as the store registers nodes.

use std::collections::HashMap;

use crate::model::id::Id;
use crate::model::node::NodeInfo;

#[derive(Default)]
pub struct TagsIndex {
    by_tag: HashMap<Id, Vec<Id>>,
}

impl TagsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&mut self, node: &dyn NodeInfo) {
        for tag in node.tags() {
            self.by_tag.entry(tag.tag_id.clone()).or_default().push(node.id().clone());
        }
    }

    pub fn nodes_with_tag(&self, tag_id: &str) -> &[Id] {
        self.by_tag.get(tag_id).map_or(&[], Vec::as_slice)
    }
}
