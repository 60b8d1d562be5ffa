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

//! Blend layers of the terrain. The palette of layers is shared by the whole store, every point
//! keeps a sparse list of weights of the layers that affect it.

use crate::{core::arrayvec::ArrayVec, error::TerrainError};
use serde::{Deserialize, Serialize};

/// Maximum amount of layers in a palette.
pub const MAX_LAYERS: usize = 8;

/// Weights below this value are treated as zero when normalizing.
pub const WEIGHT_EPSILON: f32 = 1.0e-6;

/// Fixed-size palette of named layer slots.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainLayers {
    slots: [Option<String>; MAX_LAYERS],
}

impl TerrainLayers {
    /// Creates a palette with a single layer at slot 0.
    pub fn with_default_layer<S: Into<String>>(name: S) -> Self {
        let mut layers = Self::default();
        layers.slots[0] = Some(name.into());
        layers
    }

    /// Takes the lowest free slot and returns its index.
    pub fn allocate<S: Into<String>>(&mut self, name: S) -> Result<usize, TerrainError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(TerrainError::LayerPaletteFull)?;
        self.slots[index] = Some(name.into());
        Ok(index)
    }

    /// Frees the slot and returns the name of the layer that was there. Weights of the layer that
    /// are already stored in sections are not touched.
    pub fn free(&mut self, index: usize) -> Result<String, TerrainError> {
        self.slots
            .get_mut(index)
            .and_then(|slot| slot.take())
            .ok_or(TerrainError::LayerNotAllocated(index))
    }

    /// Renames the allocated layer.
    pub fn rename<S: Into<String>>(&mut self, index: usize, name: S) -> Result<(), TerrainError> {
        match self.slots.get_mut(index) {
            Some(Some(slot)) => {
                *slot = name.into();
                Ok(())
            }
            _ => Err(TerrainError::LayerNotAllocated(index)),
        }
    }

    #[inline]
    pub fn is_allocated(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.slots.get(index).and_then(|slot| slot.as_deref())
    }

    /// Searches for the first layer with the given name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_deref() == Some(name))
    }

    /// The lowest allocated slot. Normalization of a point without weights assigns the whole
    /// weight to this layer.
    pub fn default_layer(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_some())
    }

    /// Iterates over `(index, name)` pairs of allocated layers.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_deref().map(|name| (i, name)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.default_layer().is_none()
    }
}

/// Weight of a single layer at a point.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeight {
    pub layer: u8,
    pub weight: f32,
}

/// Sparse weights of a point, sorted by layer index. Every stored weight is in `(0; 1]` range. A
/// non-empty list produced by a normalizing operation sums to one.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLayers {
    weights: ArrayVec<LayerWeight, MAX_LAYERS>,
}

impl PointLayers {
    /// Creates weights with the whole weight assigned to the given layer.
    pub fn single(layer: u8) -> Self {
        let mut weights = ArrayVec::new();
        weights.push(LayerWeight { layer, weight: 1.0 });
        Self { weights }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[LayerWeight] {
        &self.weights
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerWeight> {
        self.weights.iter()
    }

    pub fn clear(&mut self) {
        self.weights.clear();
    }

    /// Weight of the layer, zero if the layer does not affect the point.
    pub fn weight(&self, layer: u8) -> f32 {
        self.weights
            .iter()
            .find(|w| w.layer == layer)
            .map_or(0.0, |w| w.weight)
    }

    pub fn sum(&self) -> f32 {
        self.weights.iter().map(|w| w.weight).sum()
    }

    /// Bit mask of layers present at the point.
    pub fn mask(&self) -> u32 {
        self.weights
            .iter()
            .fold(0, |mask, w| mask | (1u32 << w.layer))
    }

    /// Writes the weight as is. Weights that are not positive remove the layer from the point.
    pub fn set_raw(&mut self, layer: u8, weight: f32) {
        match self.weights.binary_search_by_key(&layer, |w| w.layer) {
            Ok(i) => {
                if weight > 0.0 {
                    self.weights[i].weight = weight;
                } else {
                    self.weights.remove(i);
                }
            }
            Err(i) => {
                // Layer indices are below MAX_LAYERS, so the insertion never overflows.
                if weight > 0.0 && (layer as usize) < MAX_LAYERS {
                    self.weights.insert(i, LayerWeight { layer, weight });
                }
            }
        }
    }

    /// Sets the weight of the layer, clamped to `[0; 1]`. With `renormalize`, the other layers are
    /// scaled so that the whole list sums to one while the new weight stays as requested.
    pub fn set_weight(&mut self, layer: u8, weight: f32, renormalize: bool, default_layer: Option<u8>) {
        let weight = weight.clamp(0.0, 1.0);

        if !renormalize {
            self.set_raw(layer, weight);
            return;
        }

        let others = self.sum() - self.weight(layer);
        if others > WEIGHT_EPSILON && weight < 1.0 {
            let k = (1.0 - weight) / others;
            for w in self.weights.iter_mut() {
                if w.layer != layer {
                    w.weight *= k;
                }
            }
            self.set_raw(layer, weight);
            self.weights.retain(|w| w.weight > 0.0);
        } else if weight > 0.0 {
            self.weights.clear();
            self.set_raw(layer, 1.0);
        } else {
            self.set_raw(layer, 0.0);
            self.normalize(default_layer);
        }
    }

    /// Makes the weights sum to one. Points without any weight get the whole weight assigned to
    /// the default layer, or stay empty if there is no default layer. Weights that already sum to
    /// one are left as is, so the operation is idempotent.
    pub fn normalize(&mut self, default_layer: Option<u8>) {
        let sum = self.sum();
        if self.weights.is_empty() || sum <= WEIGHT_EPSILON {
            self.weights.clear();
            if let Some(default_layer) = default_layer {
                self.set_raw(default_layer, 1.0);
            }
        } else if (sum - 1.0).abs() > WEIGHT_EPSILON {
            for w in self.weights.iter_mut() {
                w.weight /= sum;
            }
        }
    }

    /// Drops weights below the threshold. If `normalize` is set, the rest is normalized.
    pub fn remove_below(&mut self, threshold: f32, normalize: bool, default_layer: Option<u8>) {
        self.weights.retain(|w| w.weight >= threshold);
        if normalize {
            self.normalize(default_layer);
        }
    }
}
