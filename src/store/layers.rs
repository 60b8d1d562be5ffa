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

//! Editing of per-point layer weights.

use super::{edge::PointWrite, SectionStore};
use crate::{
    core::{algebra::Vector2, warn},
    error::TerrainError,
    layers::PointLayers,
};

impl SectionStore {
    /// Weights of the global point. The point must be stored in a loaded section.
    pub fn point_layers(&self, point: Vector2<i32>) -> Result<&PointLayers, TerrainError> {
        let (section, offset) = self.loaded_holder(point)?;
        section.point_layers(offset)
    }

    fn check_weight(weight: f32) -> Result<f32, TerrainError> {
        if weight.is_finite() {
            Ok(weight)
        } else {
            warn!("Layer weight {weight} is not finite.");
            Err(TerrainError::NotFinite(weight))
        }
    }

    fn check_layer(&self, layer: usize) -> Result<u8, TerrainError> {
        if self.layers.is_allocated(layer) {
            Ok(layer as u8)
        } else {
            warn!("Layer {layer} is not allocated.");
            Err(TerrainError::LayerNotAllocated(layer))
        }
    }

    /// Reads the weights of the point, lets `func` modify them and writes the result back.
    fn modify_point_layers<F>(&mut self, point: Vector2<i32>, func: F) -> Result<(), TerrainError>
    where
        F: FnOnce(&mut PointLayers, Option<u8>),
    {
        let mut layers = self.point_layers_for_edit(point)?;
        func(&mut layers, self.default_layer());
        let mut events = Vec::new();
        let result = self.write_point(point, &PointWrite::Layers(layers), &mut events);
        self.notify(events);
        result
    }

    /// Sets the weight of the layer at the global point. The weight is clamped to `[0; 1]`. With
    /// `renormalize`, other layers of the point are scaled to keep the sum equal to one.
    pub fn set_point_layer_weight(
        &mut self,
        point: Vector2<i32>,
        layer: usize,
        weight: f32,
        renormalize: bool,
    ) -> Result<(), TerrainError> {
        let layer = self.check_layer(layer)?;
        let weight = Self::check_weight(weight)?;
        self.modify_point_layers(point, |layers, default_layer| {
            layers.set_weight(layer, weight, renormalize, default_layer)
        })
    }

    /// Adds `delta` to the weight of the layer at the global point.
    pub fn add_point_layer_weight(
        &mut self,
        point: Vector2<i32>,
        layer: usize,
        delta: f32,
        renormalize: bool,
    ) -> Result<(), TerrainError> {
        let layer = self.check_layer(layer)?;
        let delta = Self::check_weight(delta)?;
        self.modify_point_layers(point, |layers, default_layer| {
            let weight = (layers.weight(layer) + delta).clamp(0.0, 1.0);
            layers.set_weight(layer, weight, renormalize, default_layer)
        })
    }

    /// Makes the weights of the point sum to one. A point without weights gets the default layer
    /// of the palette.
    pub fn normalize_point_layer_weights(&mut self, point: Vector2<i32>) -> Result<(), TerrainError> {
        self.modify_point_layers(point, |layers, default_layer| layers.normalize(default_layer))
    }

    /// Removes weights below `threshold` from the point.
    pub fn remove_point_layer_weights(
        &mut self,
        point: Vector2<i32>,
        threshold: f32,
        normalize_after_remove: bool,
    ) -> Result<(), TerrainError> {
        self.modify_point_layers(point, |layers, default_layer| {
            layers.remove_below(threshold, normalize_after_remove, default_layer)
        })
    }

    /// Global points of the section including its mirrored border.
    fn section_points(
        &mut self,
        coord: Vector2<i32>,
    ) -> Result<impl Iterator<Item = Vector2<i32>>, TerrainError> {
        if !self.is_available(coord) {
            warn!("Unable to edit section ({}; {}), it is not available.", coord.x, coord.y);
            return Err(TerrainError::SectionUnavailable(coord));
        }
        self.ensure_adjacent_sections_loaded(coord)?;

        let size = self.params.section_size;
        let origin = self
            .params
            .point_for_section_and_offset(coord, Vector2::new(0, 0));
        Ok((0..=size as i32).flat_map(move |y| {
            (0..=size as i32).map(move |x| origin + Vector2::new(x, y))
        }))
    }

    /// [`Self::set_point_layer_weight`] for every point of the section.
    pub fn set_section_layer_weight(
        &mut self,
        coord: Vector2<i32>,
        layer: usize,
        weight: f32,
        renormalize: bool,
    ) -> Result<(), TerrainError> {
        self.check_layer(layer)?;
        Self::check_weight(weight)?;
        for point in self.section_points(coord)? {
            self.set_point_layer_weight(point, layer, weight, renormalize)?;
        }
        Ok(())
    }

    /// [`Self::normalize_point_layer_weights`] for every point of the section.
    pub fn normalize_section_layer_weights(&mut self, coord: Vector2<i32>) -> Result<(), TerrainError> {
        for point in self.section_points(coord)? {
            self.normalize_point_layer_weights(point)?;
        }
        Ok(())
    }

    /// [`Self::remove_point_layer_weights`] for every point of the section.
    pub fn remove_section_layer_weights(
        &mut self,
        coord: Vector2<i32>,
        threshold: f32,
        normalize_after_remove: bool,
    ) -> Result<(), TerrainError> {
        for point in self.section_points(coord)? {
            self.remove_point_layer_weights(point, threshold, normalize_after_remove)?;
        }
        Ok(())
    }
}
