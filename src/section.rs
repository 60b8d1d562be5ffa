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

//! A section is a square tile of the terrain, it owns `S x S` points and keeps a mirrored copy of
//! the first row and column of its north and east neighbors, so it stores `(S + 1)^2` points.

use crate::{
    core::{
        algebra::Vector2,
        parking_lot::{Mutex, MutexGuard},
    },
    error::TerrainError,
    layers::PointLayers,
    params::TerrainParameters,
    quadtree::QuadTree,
};
use std::fmt::{Debug, Formatter};

/// Outcome of a layer write into a single point of a section.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LayersWrite {
    /// Weights of the point were actually modified.
    pub modified: bool,
    /// Layers that appeared in the section for the first time.
    pub new_layers: u32,
}

/// See module docs.
pub struct Section {
    coord: Vector2<i32>,
    size: u32,
    block_size: u32,
    heights: Vec<f32>,
    layers: Vec<PointLayers>,
    /// Bit mask of every layer that was ever written into the section.
    used_layers: u32,
    changed: bool,
    modifications_count: u64,
    quad_tree: Mutex<QuadTree>,
}

impl Debug for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section")
            .field("coord", &self.coord)
            .field("size", &self.size)
            .field("used_layers", &self.used_layers)
            .field("changed", &self.changed)
            .field("modifications_count", &self.modifications_count)
            .finish()
    }
}

impl Section {
    /// Creates a blank section filled with the given height and layer.
    pub fn new(
        coord: Vector2<i32>,
        params: &TerrainParameters,
        height: f32,
        layer: Option<u8>,
    ) -> Self {
        let count = params.points_per_section();
        let point_layers = layer.map(PointLayers::single).unwrap_or_default();
        let used_layers = point_layers.mask();
        Self::from_parts_unchecked(
            coord,
            params,
            vec![params.clamp_height(height); count],
            vec![point_layers; count],
            used_layers,
        )
    }

    /// Assembles a section from persisted data. Fails if the arrays do not match the section size
    /// of the parameters.
    pub fn from_parts(
        coord: Vector2<i32>,
        params: &TerrainParameters,
        heights: Vec<f32>,
        layers: Vec<PointLayers>,
    ) -> Result<Self, TerrainError> {
        let count = params.points_per_section();
        if heights.len() != count || layers.len() != count {
            return Err(TerrainError::CorruptSection {
                section: coord,
                reason: format!(
                    "expected {count} points, got {} heights and {} layer lists",
                    heights.len(),
                    layers.len()
                ),
            });
        }
        if let Some(height) = heights.iter().find(|h| !h.is_finite()) {
            return Err(TerrainError::CorruptSection {
                section: coord,
                reason: format!("height {height} is not finite"),
            });
        }
        let used_layers = layers.iter().fold(0, |mask, l| mask | l.mask());
        Ok(Self::from_parts_unchecked(
            coord,
            params,
            heights,
            layers,
            used_layers,
        ))
    }

    fn from_parts_unchecked(
        coord: Vector2<i32>,
        params: &TerrainParameters,
        heights: Vec<f32>,
        layers: Vec<PointLayers>,
        used_layers: u32,
    ) -> Self {
        let size = params.section_size;
        let block_size = params.block_size();
        let quad_tree = QuadTree::new(&heights, size, block_size);
        Self {
            coord,
            size,
            block_size,
            heights,
            layers,
            used_layers,
            changed: false,
            modifications_count: 0,
            quad_tree: Mutex::new(quad_tree),
        }
    }

    #[inline]
    pub fn coord(&self) -> Vector2<i32> {
        self.coord
    }

    /// Section size, the amount of stored points per edge is one more.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Amount of height modifications since the section was constructed.
    #[inline]
    pub fn modifications_count(&self) -> u64 {
        self.modifications_count
    }

    #[inline]
    pub fn used_layers(&self) -> u32 {
        self.used_layers
    }

    /// Row-major heights, `(size + 1)^2` values.
    #[inline]
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Row-major weights, `(size + 1)^2` lists.
    #[inline]
    pub fn layers(&self) -> &[PointLayers] {
        &self.layers
    }

    /// Index of the point in the storage arrays.
    pub fn index(&self, offset: Vector2<u32>) -> Result<usize, TerrainError> {
        if offset.x > self.size || offset.y > self.size {
            Err(TerrainError::OffsetOutOfRange {
                offset,
                section_size: self.size,
            })
        } else {
            Ok(offset.y as usize * (self.size as usize + 1) + offset.x as usize)
        }
    }

    pub fn height(&self, offset: Vector2<u32>) -> Result<f32, TerrainError> {
        Ok(self.heights[self.index(offset)?])
    }

    /// Writes the height, returns `true` if the stored value was different. Non-finite heights
    /// are rejected.
    pub fn set_height(&mut self, offset: Vector2<u32>, height: f32) -> Result<bool, TerrainError> {
        if !height.is_finite() {
            return Err(TerrainError::NotFinite(height));
        }
        let index = self.index(offset)?;
        let stored = &mut self.heights[index];
        if *stored == height {
            return Ok(false);
        }
        *stored = height;
        self.changed = true;
        self.modifications_count += 1;
        Ok(true)
    }

    pub fn point_layers(&self, offset: Vector2<u32>) -> Result<&PointLayers, TerrainError> {
        Ok(&self.layers[self.index(offset)?])
    }

    /// Replaces the weights of the point if they differ from the stored ones.
    pub fn set_point_layers(
        &mut self,
        offset: Vector2<u32>,
        layers: &PointLayers,
    ) -> Result<LayersWrite, TerrainError> {
        let index = self.index(offset)?;
        let stored = &mut self.layers[index];
        if stored == layers {
            return Ok(LayersWrite::default());
        }
        stored.clone_from(layers);
        self.changed = true;
        let mask = layers.mask();
        let new_layers = mask & !self.used_layers;
        self.used_layers |= mask;
        Ok(LayersWrite {
            modified: true,
            new_layers,
        })
    }

    /// Returns the quadtree, rebuilding it first if the heights were modified since the last
    /// build.
    pub fn quad_tree(&self) -> MutexGuard<'_, QuadTree> {
        let mut quad_tree = self.quad_tree.lock();
        if quad_tree.built_from != self.modifications_count {
            *quad_tree = QuadTree::new(&self.heights, self.size, self.block_size);
            quad_tree.built_from = self.modifications_count;
        }
        quad_tree
    }

    /// Forces the quadtree to match current heights.
    pub fn update_quad_tree(&self) {
        drop(self.quad_tree());
    }

    /// Returns `true` if the quadtree is built from the current heights.
    pub fn is_quad_tree_valid(&self) -> bool {
        self.quad_tree.lock().built_from == self.modifications_count
    }
}
