//! Legacy (v1.0) layer graph linearization.
//!
//! Modern Docker and OCI manifests list layers in order already; only the
//! legacy per-directory format links layers by parent id and needs sorting
//! into bottom-to-top order before anything else can be built from them.

use crate::error::{Error, Result};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyLayerDescriptor {
    pub layer_id: String,
    pub parent_id: Option<String>,
}

/// Sorts layers by parent-child relationship: index 0 is the bottom/root
/// layer, the last index is the top layer.
///
/// Repeatedly pops the front of a work queue and decides whether it extends
/// the sorted list on either end; if it can't be placed yet it goes to the
/// back of the queue. Bails out with [`Error::NonSortableLayers`] once the
/// number of requeues exceeds `n²`, which catches a parent chain that is
/// cyclic or has more than one root.
pub fn sort_legacy_layers(
    layers: Vec<LegacyLayerDescriptor>,
) -> Result<Vec<LegacyLayerDescriptor>> {
    if layers.is_empty() {
        return Ok(layers);
    }

    let max_cycles = layers.len() * layers.len();
    let mut cycles = 0usize;
    let mut sorted: VecDeque<LegacyLayerDescriptor> = VecDeque::new();
    let mut to_sort: VecDeque<LegacyLayerDescriptor> = layers.into_iter().collect();

    while let Some(current) = to_sort.pop_front() {
        cycles += 1;
        if sorted.is_empty() {
            sorted.push_back(current);
        } else if current.parent_id.as_deref() == sorted.back().map(|l| l.layer_id.as_str()) {
            sorted.push_back(current);
        } else if Some(current.layer_id.as_str())
            == sorted.front().and_then(|l| l.parent_id.as_deref())
        {
            sorted.push_front(current);
        } else {
            to_sort.push_back(current);
            if cycles > max_cycles {
                return Err(Error::NonSortableLayers {
                    cycles,
                    max_cycles,
                    remaining: to_sort.len(),
                });
            }
        }
    }

    Ok(sorted.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(id: &str, parent: Option<&str>) -> LegacyLayerDescriptor {
        LegacyLayerDescriptor {
            layer_id: id.to_string(),
            parent_id: parent.map(str::to_string),
        }
    }

    #[test]
    fn sorts_linear_chain_regardless_of_input_order() {
        let layers = vec![d("c", Some("b")), d("a", None), d("b", Some("a"))];
        let sorted = sort_legacy_layers(layers).unwrap();
        let ids: Vec<_> = sorted.iter().map(|l| l.layer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn single_layer_sorts_trivially() {
        let sorted = sort_legacy_layers(vec![d("only", None)]).unwrap();
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(sort_legacy_layers(vec![]).unwrap().is_empty());
    }

    #[test]
    fn disconnected_layers_fail_with_non_sortable() {
        // two separate roots, neither chain ever links to the other
        let layers = vec![d("a", None), d("b", Some("a")), d("x", None), d("y", Some("x"))];
        let err = sort_legacy_layers(layers).unwrap_err();
        assert!(matches!(err, Error::NonSortableLayers { .. }));
    }
}
