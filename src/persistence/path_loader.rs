// Copyright 2025 Cowboy AI, LLC.

//! Path-based deep loading
//!
//! Paths are dot-separated steps such as `board.posts[*].owner`. A step
//! ending in `[*]` expands every element of a list field. Paths that share
//! a prefix are merged into one [`PathTree`] so that each reference along
//! the way is fetched once per call.
//!
//! Walking the tree:
//!
//! - an unloaded reference is fetched before the walk descends into it
//! - a reference named by the last step of a path is always fetched, so
//!   loading a path refreshes its target
//! - nested models and embedded objects are descended into, never fetched
//! - null values end the walk for their branch
//!
//! Sibling branches and list elements are loaded concurrently.

use futures::future::{try_join_all, BoxFuture, FutureExt};
use indexmap::IndexMap;

use super::datastore::Datastore;
use crate::errors::{OdmError, OdmResult};
use crate::field::FieldSet;
use crate::schema::FieldType;
use crate::value::Value;

const EXPAND: &str = "[*]";

/// Parsed set of load paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTree {
    children: IndexMap<String, PathNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PathNode {
    expand: bool,
    children: PathTree,
}

impl PathTree {
    /// Parse and merge paths
    pub fn parse<S: AsRef<str>>(paths: &[S]) -> OdmResult<Self> {
        let mut tree = PathTree::default();
        for path in paths {
            tree.insert(path.as_ref())?;
        }
        Ok(tree)
    }

    fn insert(&mut self, path: &str) -> OdmResult<()> {
        let mut level = self;
        for step in path.split('.') {
            let (name, expand) = match step.strip_suffix(EXPAND) {
                Some(name) => (name, true),
                None => (step, false),
            };
            if name.is_empty() {
                return Err(OdmError::path(path, "empty step"));
            }
            if name.contains(['[', ']']) {
                return Err(OdmError::path(
                    path,
                    format!("'{step}' is not a field name; only '[*]' may follow one"),
                ));
            }

            let node = level
                .children
                .entry(name.to_string())
                .or_insert_with(|| PathNode {
                    expand,
                    children: PathTree::default(),
                });
            if node.expand != expand {
                return Err(OdmError::path(
                    path,
                    format!("'{name}' is used both with and without '[*]'"),
                ));
            }
            level = &mut node.children;
        }
        Ok(())
    }

    /// Whether there is nothing to load
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Top-level field names
    pub fn heads(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Render back into paths, one per leaf
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, node) in &self.children {
            let head = if node.expand {
                format!("{name}{EXPAND}")
            } else {
                name.clone()
            };
            if node.children.is_empty() {
                out.push(head);
            } else {
                out.extend(
                    node.children
                        .paths()
                        .into_iter()
                        .map(|rest| format!("{head}.{rest}")),
                );
            }
        }
        out
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Walk `tree` over the fields of one model or embedded object
pub(crate) fn load_fields<'a>(
    fields: &'a mut FieldSet,
    tree: &'a PathTree,
    store: &'a Datastore,
    prefix: &'a str,
) -> BoxFuture<'a, OdmResult<()>> {
    async move {
        if let Some(missing) = tree.heads().find(|name| !fields.contains(name)) {
            return Err(OdmError::path(
                &join(prefix, missing),
                format!("{} has no field '{missing}'", fields.owner()),
            ));
        }

        let work = fields.fields_mut().filter_map(|(name, field)| {
            let node = tree.children.get(name)?;
            let (field_type, value) = field.parts_mut();
            Some(load_node(field_type, value, node, store, join(prefix, name)))
        });
        try_join_all(work).await?;
        Ok(())
    }
    .boxed()
}

fn load_node<'a>(
    field_type: &'a FieldType,
    value: &'a mut Value,
    node: &'a PathNode,
    store: &'a Datastore,
    path: String,
) -> BoxFuture<'a, OdmResult<()>> {
    async move {
        if !node.expand {
            return load_target(field_type, value, &node.children, true, store, path).await;
        }

        let path = format!("{path}{EXPAND}");
        let (element_type, items) = match (field_type.element(), value) {
            (_, Value::Null) => return Ok(()),
            (Some(element_type), Value::List(items)) => (element_type, items),
            _ => return Err(OdmError::path(&path, "'[*]' applies to list fields only")),
        };
        try_join_all(items.iter_mut().enumerate().map(|(index, item)| {
            load_target(
                element_type,
                item,
                &node.children,
                false,
                store,
                format!("{path}.{index}"),
            )
        }))
        .await?;
        Ok(())
    }
    .boxed()
}

fn load_target<'a>(
    field_type: &'a FieldType,
    value: &'a mut Value,
    children: &'a PathTree,
    named: bool,
    store: &'a Datastore,
    path: String,
) -> BoxFuture<'a, OdmResult<()>> {
    async move {
        match value {
            Value::Null => Ok(()),
            Value::Model(model) => {
                if field_type.is_reference() {
                    let refresh = named && children.is_empty();
                    if refresh || !model.loaded() {
                        store.fetch_into(model).await?;
                    }
                }
                if !children.is_empty() {
                    load_fields(model.fields_mut(), children, store, &path).await?;
                }
                Ok(())
            }
            Value::Object(set) => {
                if !children.is_empty() {
                    load_fields(set, children, store, &path).await?;
                }
                Ok(())
            }
            Value::List(_) => Err(OdmError::path(
                &path,
                "expand list fields with '[*]' to load their elements",
            )),
            other => Err(OdmError::path(
                &path,
                format!("cannot load into {}", other.kind_name()),
            )),
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths_merge_into_one_tree() {
        let tree = PathTree::parse(&[
            "posts[*].owner",
            "posts[*].owner.email",
            "posts[*].board",
            "creator",
        ])
        .unwrap();
        assert_eq!(tree.heads().collect::<Vec<_>>(), vec!["posts", "creator"]);
        assert_eq!(
            tree.paths(),
            vec!["posts[*].owner.email", "posts[*].board", "creator"]
        );
    }

    #[test]
    fn test_empty_input_is_an_empty_tree() {
        assert!(PathTree::parse::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_paths_are_rejected() {
        for bad in ["", "a..b", "a.", "[*]", "a[0]", "a[*"] {
            let err = PathTree::parse(&[bad]).unwrap_err();
            assert!(err.is_path_error(), "{bad} gave {err:?}");
        }
    }

    #[test]
    fn test_expand_flag_must_agree() {
        let err = PathTree::parse(&["posts[*].owner", "posts.owner"]).unwrap_err();
        assert!(matches!(err, OdmError::Path { path, .. } if path == "posts.owner"));
    }
}
