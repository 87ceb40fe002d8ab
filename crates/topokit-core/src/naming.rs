//! Node name expansion.
//!
//! Every provider expands groups through this module so all backends agree
//! on names and on the global node order that port and offset math uses.

use std::collections::HashMap;

use crate::error::TopologyError;
use crate::node::ExpandedNode;
use crate::topology::NodeGroupSpec;

/// Placeholder replaced by the node ordinal in a name pattern.
pub const NAME_PLACEHOLDER: char = '$';

/// Expands `pattern` into `count` node names numbered from `offset + 1`.
///
/// The first `$` in the pattern is replaced by the ordinal. A pattern
/// without a placeholder is used verbatim for a single node and gets the
/// ordinal appended when it has to name more than one.
///
/// # Examples
///
/// ```
/// use topokit_core::expand_name;
///
/// assert_eq!(expand_name("node_$", 3, 0), vec!["node_1", "node_2", "node_3"]);
/// assert_eq!(expand_name("db.$.local", 1, 4), vec!["db.5.local"]);
/// assert_eq!(expand_name("single", 1, 0), vec!["single"]);
/// assert!(expand_name("node_$", 0, 0).is_empty());
/// ```
pub fn expand_name(pattern: &str, count: u32, offset: u32) -> Vec<String> {
    let has_placeholder = pattern.contains(NAME_PLACEHOLDER);

    (1..=count)
        .map(|n| {
            let ordinal = (u64::from(offset) + u64::from(n)).to_string();
            if has_placeholder {
                pattern.replacen(NAME_PLACEHOLDER, &ordinal, 1)
            } else if count == 1 {
                pattern.to_string()
            } else {
                format!("{pattern}{ordinal}")
            }
        })
        .collect()
}

/// Expands every group in declaration order.
///
/// Equivalent to [`expand_groups_from`] with a starting index of zero.
pub fn expand_groups(groups: &[NodeGroupSpec]) -> Result<Vec<ExpandedNode>, TopologyError> {
    expand_groups_from(groups, 0)
}

/// Expands every group, numbering nodes globally from `start`.
///
/// The running counter is threaded through all groups, so the i-th node of
/// the call always has `global_index == start + i`. Names must be unique
/// across the whole call.
pub fn expand_groups_from(
    groups: &[NodeGroupSpec],
    start: usize,
) -> Result<Vec<ExpandedNode>, TopologyError> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut nodes = Vec::new();
    let mut next_index = start;

    for (group_index, group) in groups.iter().enumerate() {
        group.validate()?;

        for name in group.names() {
            if let Some(&first_group) = seen.get(&name) {
                return Err(TopologyError::DuplicateNodeName {
                    name,
                    first_group,
                    second_group: group_index,
                });
            }
            seen.insert(name.clone(), group_index);

            nodes.push(ExpandedNode {
                services: group.services_for(&name).to_vec(),
                name,
                global_index: next_index,
                group_index,
            });
            next_index += 1;
        }
    }

    Ok(nodes)
}
