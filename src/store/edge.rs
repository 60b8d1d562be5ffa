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

//! Border consistency. A point with a zero offset along X or Y is stored by up to four sections:
//! the owner and its west, south and south-west neighbors, where it occupies the last column, the
//! last row or the last corner. Writes go to the owner and are mirrored into the neighbors, never
//! in the opposite direction.

use super::SectionStore;
use crate::{
    core::{algebra::Vector2, arrayvec::ArrayVec, warn},
    error::TerrainError,
    layers::PointLayers,
    params::TerrainParameters,
};

/// Change made by an edit, reported to the callbacks once the edit is complete.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum EditEvent {
    Height {
        section: Vector2<i32>,
        offset: Vector2<u32>,
    },
    Layers {
        section: Vector2<i32>,
        offset: Vector2<u32>,
    },
    SectionLayers {
        section: Vector2<i32>,
        layers: u32,
    },
}

pub(crate) enum PointWrite {
    Height(f32),
    Layers(PointLayers),
}

/// Sections that store the global point together with its offset in each of them. The owner is
/// always first, then go the west, south and south-west neighbors.
pub(crate) fn point_holders(
    params: &TerrainParameters,
    point: Vector2<i32>,
) -> ArrayVec<(Vector2<i32>, Vector2<u32>), 4> {
    let (owner, offset) = params.section_and_offset_for_point(point);
    let size = params.section_size;
    // No section may exist past the edge of the coordinate space.
    let west = owner.x.checked_sub(1).filter(|_| offset.x == 0);
    let south = owner.y.checked_sub(1).filter(|_| offset.y == 0);
    let mut holders = ArrayVec::new();
    holders.push((owner, offset));
    if let Some(x) = west {
        holders.push((Vector2::new(x, owner.y), Vector2::new(size, offset.y)));
    }
    if let Some(y) = south {
        holders.push((Vector2::new(owner.x, y), Vector2::new(offset.x, size)));
    }
    if let (Some(x), Some(y)) = (west, south) {
        holders.push((Vector2::new(x, y), Vector2::new(size, size)));
    }
    holders
}

/// Offsets of the outer ring of points of a section.
fn border_offsets(size: u32) -> impl Iterator<Item = Vector2<u32>> {
    (0..=size).flat_map(move |y| {
        (0..=size)
            .filter(move |x| y == 0 || y == size || *x == 0 || *x == size)
            .map(move |x| Vector2::new(x, y))
    })
}

impl SectionStore {
    fn apply_write(
        &mut self,
        coord: Vector2<i32>,
        offset: Vector2<u32>,
        write: &PointWrite,
        events: &mut Vec<EditEvent>,
    ) -> Result<(), TerrainError> {
        let section = self.loaded_section_mut(coord)?;
        match write {
            PointWrite::Height(height) => {
                if section.set_height(offset, *height)? {
                    events.push(EditEvent::Height {
                        section: coord,
                        offset,
                    });
                }
            }
            PointWrite::Layers(layers) => {
                let result = section.set_point_layers(offset, layers)?;
                if result.modified {
                    events.push(EditEvent::Layers {
                        section: coord,
                        offset,
                    });
                }
                if result.new_layers != 0 {
                    events.push(EditEvent::SectionLayers {
                        section: coord,
                        layers: result.new_layers,
                    });
                }
            }
        }
        Ok(())
    }

    /// Copies height and weights of a point from one loaded section into another.
    fn copy_point(
        &mut self,
        source: Vector2<i32>,
        source_offset: Vector2<u32>,
        target: Vector2<i32>,
        target_offset: Vector2<u32>,
        events: &mut Vec<EditEvent>,
    ) -> Result<(), TerrainError> {
        let section = self
            .section(source)
            .ok_or(TerrainError::SectionNotLoaded(source))?;
        let height = section.height(source_offset)?;
        let layers = section.point_layers(source_offset)?.clone();

        self.apply_write(target, target_offset, &PointWrite::Height(height), events)?;
        self.apply_write(target, target_offset, &PointWrite::Layers(layers), events)
    }

    /// Mirrors the point of the section into the loaded west, south and south-west neighbors.
    /// Points that are not on the first row or column are not shared with those neighbors.
    pub(crate) fn propagate_point(
        &mut self,
        coord: Vector2<i32>,
        offset: Vector2<u32>,
        events: &mut Vec<EditEvent>,
    ) -> Result<(), TerrainError> {
        if offset.x != 0 && offset.y != 0 {
            return Ok(());
        }

        let point = self.params.point_for_section_and_offset(coord, offset);
        for (neighbor, neighbor_offset) in point_holders(&self.params, point).into_iter().skip(1) {
            if self.is_loaded(neighbor) {
                self.copy_point(coord, offset, neighbor, neighbor_offset, events)?;
            }
        }

        Ok(())
    }

    /// Writes the global point. If the owner of the point exists, it is written and the value is
    /// mirrored to the neighbors. Otherwise the value is written into every available section that
    /// stores the point. Touched sections are loaded on demand.
    pub(crate) fn write_point(
        &mut self,
        point: Vector2<i32>,
        write: &PointWrite,
        events: &mut Vec<EditEvent>,
    ) -> Result<(), TerrainError> {
        let holders = point_holders(&self.params, point);
        let (owner, offset) = holders[0];

        if self.is_available(owner) {
            if offset.x == 0 || offset.y == 0 {
                self.ensure_adjacent_sections_loaded(owner)?;
            } else {
                self.load_section(owner)?;
            }
            self.apply_write(owner, offset, write, events)?;
            return self.propagate_point(owner, offset, events);
        }

        let mut written = false;
        for (coord, offset) in holders.into_iter().skip(1) {
            if self.is_available(coord) {
                self.load_section(coord)?;
                self.apply_write(coord, offset, write, events)?;
                written = true;
            }
        }

        if written {
            Ok(())
        } else {
            warn!(
                "Unable to edit point ({}; {}), it is not stored in any section.",
                point.x, point.y
            );
            Err(TerrainError::SectionUnavailable(owner))
        }
    }

    /// Fills the border of a just created section with values of its neighbors, then makes sure
    /// the neighbors mirror the border the new section owns. The neighbors must be loaded.
    pub(crate) fn pull_borders(
        &mut self,
        coord: Vector2<i32>,
        events: &mut Vec<EditEvent>,
    ) -> Result<(), TerrainError> {
        let size = self.params.section_size;
        // The section is new, there is nobody to notify about its own points.
        let mut pulled = Vec::new();

        for offset in border_offsets(size) {
            let point = self.params.point_for_section_and_offset(coord, offset);
            let source = point_holders(&self.params, point)
                .into_iter()
                .find(|(holder, _)| *holder != coord && self.is_loaded(*holder));
            if let Some((source, source_offset)) = source {
                self.copy_point(source, source_offset, coord, offset, &mut pulled)?;
            }
        }

        for offset in border_offsets(size) {
            self.propagate_point(coord, offset, events)?;
        }

        Ok(())
    }

    /// Resets the points a section shares with its loaded neighbors to the base height with
    /// empty weights. The section itself is not touched.
    pub(crate) fn backfill_borders(
        &mut self,
        coord: Vector2<i32>,
        events: &mut Vec<EditEvent>,
    ) -> Result<(), TerrainError> {
        let base = PointWrite::Height(self.params.clamp_height(self.params.base_height as f32));
        let empty = PointWrite::Layers(PointLayers::default());

        for offset in border_offsets(self.params.section_size) {
            let point = self.params.point_for_section_and_offset(coord, offset);
            for (holder, holder_offset) in point_holders(&self.params, point) {
                if holder != coord && self.is_loaded(holder) {
                    self.apply_write(holder, holder_offset, &base, events)?;
                    self.apply_write(holder, holder_offset, &empty, events)?;
                }
            }
        }

        Ok(())
    }
}
