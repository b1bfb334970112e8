//! Windows and pane-arrangement trees.
//!
//! A window arranges its panes by a [`LayoutNode`] tree: containers
//! split their area among children by percentage, leaves name a pane.
//! Layouts are immutable values; every change replaces the tree and is
//! broadcast to all clients as a structural event.
//!
//! Named templates (loaded from the config file, see
//! [`crate::config::load_layout_templates`]) are ordinary trees whose
//! leaf "pane ids" are slot indices `0..n`; [`LayoutNode::instantiate`]
//! substitutes real pane ids.

// Rust guideline compliant 2026-03

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::pane::PaneId;

/// Split direction of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Children are laid out left to right.
    Row,
    /// Children are laid out top to bottom.
    Column,
}

/// One node of a window's layout tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayoutNode {
    /// Interior node splitting its area among children.
    #[serde(rename_all = "camelCase")]
    Container {
        /// Split direction.
        direction: Direction,
        /// Percentage share per child; same length as `children`.
        sizes: Vec<u8>,
        /// Child nodes.
        children: Vec<LayoutNode>,
    },
    /// Leaf holding one pane.
    #[serde(rename_all = "camelCase")]
    Pane {
        /// Pane id (slot index in templates).
        pane: PaneId,
    },
}

impl LayoutNode {
    /// Number of pane leaves in this tree.
    #[must_use]
    pub fn slots(&self) -> usize {
        match self {
            LayoutNode::Pane { .. } => 1,
            LayoutNode::Container { children, .. } => children.iter().map(Self::slots).sum(),
        }
    }

    /// Pane ids in layout order (left-to-right, top-to-bottom).
    #[must_use]
    pub fn pane_ids(&self) -> Vec<PaneId> {
        match self {
            LayoutNode::Pane { pane } => vec![*pane],
            LayoutNode::Container { children, .. } => {
                children.iter().flat_map(Self::pane_ids).collect()
            }
        }
    }

    /// Structural validity: containers are non-empty and size lists
    /// match their children.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        match self {
            LayoutNode::Pane { .. } => Ok(()),
            LayoutNode::Container { sizes, children, .. } => {
                if children.is_empty() {
                    bail!("layout container has no children");
                }
                if sizes.len() != children.len() {
                    bail!(
                        "layout container has {} sizes for {} children",
                        sizes.len(),
                        children.len()
                    );
                }
                for child in children {
                    child.validate()?;
                }
                Ok(())
            }
        }
    }

    /// Substitute template slot indices with real pane ids.
    ///
    /// # Errors
    ///
    /// Returns an error when the pane count does not match the
    /// template's slot count.
    pub fn instantiate(&self, panes: &[PaneId]) -> Result<LayoutNode> {
        if panes.len() != self.slots() {
            bail!(
                "template needs {} panes, got {}",
                self.slots(),
                panes.len()
            );
        }
        let mut next = 0usize;
        Ok(self.fill(panes, &mut next))
    }

    fn fill(&self, panes: &[PaneId], next: &mut usize) -> LayoutNode {
        match self {
            LayoutNode::Pane { .. } => {
                let pane = panes[*next];
                *next += 1;
                LayoutNode::Pane { pane }
            }
            LayoutNode::Container {
                direction,
                sizes,
                children,
            } => LayoutNode::Container {
                direction: *direction,
                sizes: sizes.clone(),
                children: children.iter().map(|c| c.fill(panes, next)).collect(),
            },
        }
    }

    /// Remove a pane leaf, collapsing single-child containers.
    ///
    /// Returns `None` when the tree becomes empty. The removed leaf's
    /// share is redistributed to its siblings implicitly by renormalizing
    /// at render time; stored sizes just drop the entry.
    #[must_use]
    pub fn remove_pane(&self, pane: PaneId) -> Option<LayoutNode> {
        match self {
            LayoutNode::Pane { pane: p } => {
                if *p == pane {
                    None
                } else {
                    Some(self.clone())
                }
            }
            LayoutNode::Container {
                direction,
                sizes,
                children,
            } => {
                let mut new_sizes = Vec::new();
                let mut new_children = Vec::new();
                for (size, child) in sizes.iter().zip(children) {
                    if let Some(kept) = child.remove_pane(pane) {
                        new_sizes.push(*size);
                        new_children.push(kept);
                    }
                }
                match new_children.len() {
                    0 => None,
                    1 => Some(new_children.pop().expect("len checked")),
                    _ => Some(LayoutNode::Container {
                        direction: *direction,
                        sizes: new_sizes,
                        children: new_children,
                    }),
                }
            }
        }
    }
}

/// A window: a titled, ordered group of panes under one layout tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    /// Window id.
    pub id: u16,
    /// Title (from the focused pane's OSC title, or unset).
    ///
    /// Absent from the wire when unset; the frame codec carries no null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Pane arrangement.
    pub layout: LayoutNode,
}

impl Window {
    /// Panes referenced by this window, in layout order.
    #[must_use]
    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.layout.pane_ids()
    }
}

/// Built-in layout templates, keyed by name.
///
/// Leaf pane ids are slot indices. Written to the layouts file on first
/// start; users edit that file to add their own.
#[must_use]
pub fn builtin_templates() -> Vec<(String, LayoutNode)> {
    use LayoutNode::{Container, Pane};
    let half = |a: LayoutNode, b: LayoutNode, direction| Container {
        direction,
        sizes: vec![50, 50],
        children: vec![a, b],
    };
    vec![
        ("single".to_string(), Pane { pane: 0 }),
        (
            "2-col".to_string(),
            half(Pane { pane: 0 }, Pane { pane: 1 }, Direction::Row),
        ),
        (
            "2-row".to_string(),
            half(Pane { pane: 0 }, Pane { pane: 1 }, Direction::Column),
        ),
        (
            "2x2".to_string(),
            half(
                half(Pane { pane: 0 }, Pane { pane: 1 }, Direction::Row),
                half(Pane { pane: 2 }, Pane { pane: 3 }, Direction::Row),
                Direction::Column,
            ),
        ),
        (
            "main-side".to_string(),
            Container {
                direction: Direction::Row,
                sizes: vec![70, 30],
                children: vec![Pane { pane: 0 }, Pane { pane: 1 }],
            },
        ),
    ]
}
