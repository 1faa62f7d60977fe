//! Node hierarchy flattening.
//!
//! The glTF node tree is collapsed once at load time: every node ends up with
//! its world transform and an empty child list. There is no runtime
//! re-parenting.

use glam::{Mat4, Quat, Vec3};

use crate::document::NodeDesc;
use crate::error::{Result, UmbraError};

/// Local transform of a node record.
///
/// An explicit `matrix` wins; otherwise scale, then rotation, then translation
/// are applied, with identity defaults for missing fields.
#[must_use]
pub fn local_transform(node: &NodeDesc) -> Mat4 {
    if let Some(m) = node.matrix {
        return Mat4::from_cols_array(&m);
    }
    let scale = node.scale.map_or(Vec3::ONE, Vec3::from_array);
    let rotation = node
        .rotation
        .map_or(Quat::IDENTITY, |r| Quat::from_array(r).normalize());
    let translation = node.translation.map_or(Vec3::ZERO, Vec3::from_array);
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// A node during and after flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Stable id, equal to the node's index in the source document.
    pub id: u32,
    pub name: String,
    pub mesh: Option<usize>,
    /// Local transform before flattening, world transform after.
    pub transform: Mat4,
    pub children: Vec<usize>,
}

impl SceneNode {
    /// Builds an unflattened node from its document record.
    #[must_use]
    pub fn from_desc(index: usize, desc: &NodeDesc) -> Self {
        Self {
            id: index as u32,
            name: desc
                .name
                .clone()
                .unwrap_or_else(|| format!("node{index}")),
            mesh: desc.mesh,
            transform: local_transform(desc),
            children: desc.children.clone(),
        }
    }
}

/// Premultiplies every node's transform by its ancestors' and clears all
/// child lists.
///
/// Roots are the nodes no other node lists as a child. A node reached twice,
/// or never reached because it sits on a cycle, fails with a format error and
/// leaves `nodes` untouched.
pub fn flatten_nodes(nodes: &mut [SceneNode]) -> Result<()> {
    let n = nodes.len();
    let mut is_child = vec![false; n];
    for (parent, node) in nodes.iter().enumerate() {
        for &child in &node.children {
            if child >= n {
                return Err(UmbraError::format(format!(
                    "node {parent} lists child {child}, but there are only {n} nodes"
                )));
            }
            is_child[child] = true;
        }
    }

    let mut world = vec![None; n];
    // Pre-order: (node, parent world transform).
    let mut stack: Vec<(usize, Mat4)> = (0..n)
        .rev()
        .filter(|&i| !is_child[i])
        .map(|i| (i, Mat4::IDENTITY))
        .collect();

    while let Some((index, parent)) = stack.pop() {
        if world[index].is_some() {
            return Err(UmbraError::format(format!(
                "node {index} is reachable from more than one parent"
            )));
        }
        let transform = parent * nodes[index].transform;
        world[index] = Some(transform);
        for &child in nodes[index].children.iter().rev() {
            stack.push((child, transform));
        }
    }

    if let Some(orphan) = world.iter().position(Option::is_none) {
        return Err(UmbraError::format(format!(
            "node {orphan} is part of a cycle in the node hierarchy"
        )));
    }

    for (node, transform) in nodes.iter_mut().zip(world) {
        if let Some(transform) = transform {
            node.transform = transform;
        }
        node.children.clear();
    }
    log::debug!("flattened {n} nodes");
    Ok(())
}
