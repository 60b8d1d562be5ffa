// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Quadtree of a single section, used to quickly find the cells that may be hit by a ray.
//!
//! Nodes are kept in a flat arena, children always have greater indices than their parent. Both
//! construction and traversal use explicit stacks.

use crate::core::{
    algebra::{Vector2, Vector3},
    math::{aabb::AxisAlignedBoundingBox, ray::Ray},
};

#[derive(Debug, Clone, PartialEq)]
pub enum QuadTreeNodeKind {
    Leaf,
    Branch { children: [usize; 4] },
}

/// Node of the tree. Covers cells `[position; position + size)`, the height range includes every
/// corner point of these cells.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadTreeNode {
    pub position: Vector2<u32>,
    pub size: Vector2<u32>,
    pub min_height: f32,
    pub max_height: f32,
    pub kind: QuadTreeNodeKind,
}

impl QuadTreeNode {
    /// Bounding box of the node in world space, `origin` is the world position of the first
    /// point of the section.
    pub fn aabb(&self, origin: Vector2<f32>, scale: f32) -> AxisAlignedBoundingBox {
        AxisAlignedBoundingBox::from_min_max(
            Vector3::new(
                origin.x + self.position.x as f32 * scale,
                self.min_height,
                origin.y + self.position.y as f32 * scale,
            ),
            Vector3::new(
                origin.x + (self.position.x + self.size.x) as f32 * scale,
                self.max_height,
                origin.y + (self.position.y + self.size.y) as f32 * scale,
            ),
        )
    }
}

/// See module docs.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadTree {
    nodes: Vec<QuadTreeNode>,
    /// Modification count of the height data the tree was built from.
    pub(crate) built_from: u64,
}

impl Default for QuadTree {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            built_from: u64::MAX,
        }
    }
}

impl QuadTree {
    /// Builds the tree over `cells x cells` cells. `heights` is a row-major array of
    /// `(cells + 1)^2` points. Nodes are split until both sides fit in `block_size`.
    pub fn new(heights: &[f32], cells: u32, block_size: u32) -> Self {
        let block_size = block_size.max(1);
        let stride = cells as usize + 1;
        let mut nodes = Vec::new();

        if cells == 0 || heights.len() < stride * stride {
            return Self {
                nodes,
                built_from: 0,
            };
        }

        let mut stack = vec![(Vector2::new(0u32, 0u32), Vector2::new(cells, cells))];
        // Parent index and child slot of each pending node.
        let mut parents = vec![None::<(usize, usize)>];

        while let (Some((position, size)), Some(parent)) = (stack.pop(), parents.pop()) {
            let index = nodes.len();
            if let Some((parent, slot)) = parent {
                if let QuadTreeNodeKind::Branch { ref mut children } =
                    nodes[parent].kind
                {
                    children[slot] = index;
                }
            }

            let kind = if size.x <= block_size && size.y <= block_size {
                QuadTreeNodeKind::Leaf
            } else {
                let half = Vector2::new(size.x.div_ceil(2), size.y.div_ceil(2));
                let quadrants = [
                    (position, half),
                    (
                        Vector2::new(position.x + half.x, position.y),
                        Vector2::new(size.x - half.x, half.y),
                    ),
                    (
                        position + half,
                        Vector2::new(size.x - half.x, size.y - half.y),
                    ),
                    (
                        Vector2::new(position.x, position.y + half.y),
                        Vector2::new(half.x, size.y - half.y),
                    ),
                ];
                for (slot, (child_position, child_size)) in quadrants.into_iter().enumerate() {
                    if child_size.x > 0 && child_size.y > 0 {
                        stack.push((child_position, child_size));
                        parents.push(Some((index, slot)));
                    }
                }
                // Empty quadrants (odd sizes of one cell) point back to the parent and are
                // skipped on traversal.
                QuadTreeNodeKind::Branch {
                    children: [index; 4],
                }
            };

            let (min_height, max_height) = if kind == QuadTreeNodeKind::Leaf {
                let mut min_height = f32::MAX;
                let mut max_height = f32::MIN;
                for y in position.y..=(position.y + size.y) {
                    for x in position.x..=(position.x + size.x) {
                        let height = heights[y as usize * stride + x as usize];
                        min_height = min_height.min(height);
                        max_height = max_height.max(height);
                    }
                }
                (min_height, max_height)
            } else {
                (f32::MAX, f32::MIN)
            };

            nodes.push(QuadTreeNode {
                position,
                size,
                min_height,
                max_height,
                kind,
            });
        }

        // Children follow their parents, so a reverse pass sees every child before its parent.
        for i in (0..nodes.len()).rev() {
            if let QuadTreeNodeKind::Branch { children } = nodes[i].kind {
                let mut min_height = f32::MAX;
                let mut max_height = f32::MIN;
                for child in children {
                    if child != i {
                        min_height = min_height.min(nodes[child].min_height);
                        max_height = max_height.max(nodes[child].max_height);
                    }
                }
                nodes[i].min_height = min_height;
                nodes[i].max_height = max_height;
            }
        }

        Self {
            nodes,
            built_from: 0,
        }
    }

    pub fn nodes(&self) -> &[QuadTreeNode] {
        &self.nodes
    }

    pub fn root(&self) -> Option<&QuadTreeNode> {
        self.nodes.first()
    }

    /// Maximum depth of the tree, root has level 0.
    pub fn max_level(&self) -> u32 {
        let mut max_level = 0;
        let mut stack = Vec::new();
        if !self.nodes.is_empty() {
            stack.push((0usize, 0u32));
        }
        while let Some((index, level)) = stack.pop() {
            max_level = max_level.max(level);
            if let QuadTreeNodeKind::Branch { children } = self.nodes[index].kind {
                for child in children {
                    if child != index {
                        stack.push((child, level + 1));
                    }
                }
            }
        }
        max_level
    }

    /// Collects cells of the leaves whose bounds are intersected by the ray. `origin` is the
    /// world position of the first point of the section, `scale` is the world size of a cell.
    pub fn cells_intersecting_ray(
        &self,
        ray: &Ray,
        origin: Vector2<f32>,
        scale: f32,
        cells: &mut Vec<Vector2<u32>>,
    ) {
        let mut stack = Vec::new();
        if !self.nodes.is_empty() {
            stack.push(0usize);
        }

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if ray.aabb_intersection(&node.aabb(origin, scale)).is_none() {
                continue;
            }

            match node.kind {
                QuadTreeNodeKind::Leaf => {
                    for y in node.position.y..node.position.y + node.size.y {
                        for x in node.position.x..node.position.x + node.size.x {
                            cells.push(Vector2::new(x, y));
                        }
                    }
                }
                QuadTreeNodeKind::Branch { children } => {
                    stack.extend(children.into_iter().filter(|child| *child != index));
                }
            }
        }
    }
}
