//! Field table merging and reference validation.
//!
//! Merging follows the overlay rule: a field in the overlay replaces the base
//! field of the same name in place, new fields are appended in overlay order.

use super::BoundField;
use crate::error::{ConfigError, Result};
use std::collections::HashMap;

/// Merge `overlay` into `base`, with `overlay` taking precedence.
pub(crate) fn merge_fields(
    mut base: Vec<BoundField>,
    overlay: impl IntoIterator<Item = BoundField>,
) -> Vec<BoundField> {
    for field in overlay {
        match base.iter_mut().find(|existing| existing.name == field.name) {
            Some(slot) => *slot = field,
            None => base.push(field),
        }
    }
    base
}

/// Merge several tables in order, with later tables taking precedence.
pub(crate) fn merge_all(tables: impl IntoIterator<Item = Vec<BoundField>>) -> Vec<BoundField> {
    tables.into_iter().fold(Vec::new(), merge_fields)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Check that every reference default names a declared field and that no
/// chain of references loops back on itself.
pub(crate) fn validate_references(fields: &[BoundField]) -> Result<()> {
    let edges: HashMap<&str, Vec<&str>> = fields
        .iter()
        .map(|f| (f.name.as_str(), f.declaration.references()))
        .collect();

    for field in fields {
        for target in &edges[field.name.as_str()] {
            if !edges.contains_key(target) {
                return Err(ConfigError::UnknownReference {
                    field: field.name.clone(),
                    target: target.to_string(),
                });
            }
        }
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    for field in fields {
        visit(field.name.as_str(), &edges, &mut marks, &mut stack)?;
    }
    Ok(())
}

fn visit<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Result<()> {
    match marks.get(node) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| *n == node).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            path.push(node.to_string());
            return Err(ConfigError::ReferenceCycle { path });
        }
        None => {}
    }

    marks.insert(node, Mark::Visiting);
    stack.push(node);
    for &next in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
        visit(next, edges, marks, stack)?;
    }
    stack.pop();
    marks.insert(node, Mark::Done);
    Ok(())
}
