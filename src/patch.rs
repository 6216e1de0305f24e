use std::collections::HashMap;

use anyhow::{anyhow, Result};
use kuchiki::traits::*;
use kuchiki::{parse_html, NodeRef};

/// Decides, for an existing node and its incoming replacement, whether the
/// existing node must be left exactly as it is.
pub type SkipPredicate<'a> = &'a dyn Fn(&NodeRef, &NodeRef) -> bool;

/// Structural sync of a subtree towards new markup.
pub trait DomPatcher {
    /// Make the children of `root` match `markup`. Nodes for which
    /// `should_skip(existing, incoming)` holds are neither updated nor
    /// replaced.
    fn patch(&self, root: &NodeRef, markup: &str, should_skip: SkipPredicate<'_>) -> Result<()>;
}

/// Patcher over a `kuchiki` tree. Children with an `id` are paired by id,
/// the rest by position. A pair is updated in place when both sides are the
/// same kind of node with the same tag, otherwise the old node is replaced.
/// A skipped node stays as it is and never displaces incoming siblings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreePatcher;

impl DomPatcher for TreePatcher {
    fn patch(&self, root: &NodeRef, markup: &str, should_skip: SkipPredicate<'_>) -> Result<()> {
        let incoming = parse_fragment(markup)?;
        patch_children(root, &incoming, should_skip);
        Ok(())
    }
}

fn parse_fragment(markup: &str) -> Result<NodeRef> {
    let document = parse_html().one(format!("<html><head></head><body>{markup}</body></html>"));
    let body = document
        .select_first("body")
        .map_err(|_| anyhow!("parsed markup has no body"))?;
    Ok(body.as_node().clone())
}

// Elements with an `id` pair with the existing element of the same id;
// everything else pairs by position among the existing nodes without one.
// Existing nodes left unpaired are removed at the end.
fn patch_children(existing_parent: &NodeRef, incoming_parent: &NodeRef, should_skip: SkipPredicate<'_>) {
    let existing: Vec<NodeRef> = existing_parent.children().collect();
    let incoming: Vec<NodeRef> = incoming_parent.children().collect();

    let mut keyed: HashMap<String, usize> = HashMap::new();
    let mut unkeyed = Vec::new();
    for (index, node) in existing.iter().enumerate() {
        match element_id(node) {
            Some(id) => {
                keyed.entry(id).or_insert(index);
            }
            None => unkeyed.push(index),
        }
    }
    let mut unkeyed = unkeyed.into_iter().peekable();
    let mut kept = vec![false; existing.len()];
    let mut cursor: Option<NodeRef> = None;

    for new_node in &incoming {
        let (candidate, positional) = match element_id(new_node) {
            Some(id) => (keyed.remove(&id), false),
            None => (unkeyed.peek().copied(), true),
        };

        let placed = match candidate {
            Some(index) => {
                let old_node = &existing[index];
                let skip = should_skip(old_node, new_node);
                let same = same_node(old_node, new_node);
                if skip && !same && positional {
                    // The protected node may still pair with a later sibling.
                    new_node.clone()
                } else {
                    if positional {
                        unkeyed.next();
                    }
                    if skip {
                        kept[index] = true;
                        old_node.clone()
                    } else if same {
                        update_node(old_node, new_node, should_skip);
                        kept[index] = true;
                        old_node.clone()
                    } else {
                        new_node.clone()
                    }
                }
            }
            None => new_node.clone(),
        };

        place_after(existing_parent, cursor.as_ref(), &placed);
        cursor = Some(placed);
    }

    for (index, node) in existing.iter().enumerate() {
        if !kept[index] {
            node.detach();
        }
    }
}

fn element_id(node: &NodeRef) -> Option<String> {
    let element = node.as_element()?;
    let id = element.attributes.borrow().get("id").map(str::to_string);
    id
}

// Move `node` directly after `previous`, or to the front when there is none.
fn place_after(parent: &NodeRef, previous: Option<&NodeRef>, node: &NodeRef) {
    let slot = match previous {
        Some(previous) => previous.next_sibling(),
        None => parent.first_child(),
    };
    if slot.as_ref() == Some(node) {
        return;
    }
    node.detach();
    match slot {
        Some(slot) => slot.insert_before(node.clone()),
        None => parent.append(node.clone()),
    }
}

fn same_node(old_node: &NodeRef, new_node: &NodeRef) -> bool {
    match (old_node.as_element(), new_node.as_element()) {
        (Some(old), Some(new)) => {
            old.name == new.name
                && old.attributes.borrow().get("id") == new.attributes.borrow().get("id")
        }
        (None, None) => {
            (old_node.as_text().is_some() && new_node.as_text().is_some())
                || (old_node.as_comment().is_some() && new_node.as_comment().is_some())
        }
        _ => false,
    }
}

fn update_node(old_node: &NodeRef, new_node: &NodeRef, should_skip: SkipPredicate<'_>) {
    if let (Some(old), Some(new)) = (old_node.as_text(), new_node.as_text()) {
        if *old.borrow() != *new.borrow() {
            old.replace(new.borrow().clone());
        }
        return;
    }
    if let (Some(old), Some(new)) = (old_node.as_comment(), new_node.as_comment()) {
        if *old.borrow() != *new.borrow() {
            old.replace(new.borrow().clone());
        }
        return;
    }

    if let (Some(old), Some(new)) = (old_node.as_element(), new_node.as_element()) {
        let wanted = new.attributes.borrow().map.clone();
        let mut attributes = old.attributes.borrow_mut();
        attributes.map.retain(|name, _| wanted.contains_key(name));
        for (name, value) in wanted {
            if attributes.map.get(&name) != Some(&value) {
                attributes.map.insert(name, value);
            }
        }
        drop(attributes);
    }

    patch_children(old_node, new_node, should_skip);
}
