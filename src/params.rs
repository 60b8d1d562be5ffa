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

//! Terrain parameters and the coordinate model of the section grid.
//!
//! ## Coordinate Spaces
//!
//! - **Global point:** 2D `i32` coordinates of a height sample across the whole level.
//! - **Section coordinate:** 2D `i32` position of a section within the grid of sections. Section
//! `(sx, sy)` owns global points `[sx * S; sx * S + S)` along X (and the same along Y), where `S` is
//! [`TerrainParameters::section_size`].
//! - **Offset:** 2D `u32` coordinates of a point inside a section, in `[0; S]` range. Sections store
//! `S + 1` points per edge, the last row and column are mirrors of the first row and column of the
//! north and east neighbors.
//! - **World position:** 3D `f32` coordinates. The terrain is an XZ oriented surface with Y being
//! the height, global point X maps to world X and global point Y maps to world Z, both multiplied
//! by [`TerrainParameters::scale`].

use crate::{
    core::{
        algebra::{Vector2, Vector3},
        floor_div,
        math::aabb::AxisAlignedBoundingBox,
    },
    error::TerrainError,
};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path};

/// Largest supported amount of points along the edge of a section. Keeps every global point
/// representable as `i32` for any sane grid size.
pub const MAX_SECTION_SIZE: u32 = 4096;

/// Defines how heights are kept in the persisted representation of a section. In memory, heights
/// are always `f32`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeightFormat {
    /// Full precision.
    #[default]
    Float32,
    /// Heights are quantized into 65536 steps over `[min_height; max_height]` range.
    Unorm16,
}

/// Immutable configuration of a terrain, set once when the store is created or opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParameters {
    /// Storage format of the heights.
    pub height_format: HeightFormat,
    /// Lowest possible height, heights are clamped to it.
    pub min_height: i32,
    /// Highest possible height, heights are clamped to it.
    pub max_height: i32,
    /// Height of newly created sections and of border points left behind by deleted sections.
    pub base_height: i32,
    /// World units per point.
    pub scale: u32,
    /// Points per section edge (not counting the mirrored border point).
    pub section_size: u32,
    /// Amount of render LODs, also defines the depth of the per-section quadtrees.
    pub render_lod_count: u32,
}

impl Default for TerrainParameters {
    fn default() -> Self {
        Self {
            height_format: HeightFormat::Float32,
            min_height: 0,
            max_height: 1000,
            base_height: 0,
            scale: 1,
            section_size: 64,
            render_lod_count: 4,
        }
    }
}

impl TerrainParameters {
    /// Reads parameters from a RON file and validates them.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        let file = File::open(path)?;
        let parameters: Self = ron::de::from_reader(file)?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Writes parameters to a RON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TerrainError> {
        let file = File::create(path)?;
        ron::ser::to_writer_pretty(file, self, PrettyConfig::default())?;
        Ok(())
    }

    /// Checks the parameters for consistency. Must pass before any section exists.
    pub fn validate(&self) -> Result<(), TerrainError> {
        fn invalid(msg: String) -> Result<(), TerrainError> {
            Err(TerrainError::InvalidParameters(msg))
        }

        if self.section_size == 0 || self.section_size > MAX_SECTION_SIZE {
            return invalid(format!(
                "section size must be in [1; {MAX_SECTION_SIZE}] range, got {}",
                self.section_size
            ));
        }
        if self.scale == 0 {
            return invalid("scale must be positive".to_string());
        }
        if self.render_lod_count == 0 {
            return invalid("render LOD count must be positive".to_string());
        }
        if self.min_height > self.max_height {
            return invalid(format!(
                "min height {} is greater than max height {}",
                self.min_height, self.max_height
            ));
        }
        if !(self.min_height..=self.max_height).contains(&self.base_height) {
            return invalid(format!(
                "base height {} is outside of [{}; {}] range",
                self.base_height, self.min_height, self.max_height
            ));
        }
        Ok(())
    }

    /// Same as [`Self::validate`], but also checks that a region of `region_size` world units is
    /// covered by a whole number of sections.
    pub fn validate_for_region(&self, region_size: u32) -> Result<(), TerrainError> {
        self.validate()?;
        match self.section_size.checked_mul(self.scale) {
            Some(section_world_size) if region_size % section_world_size == 0 => Ok(()),
            Some(section_world_size) => Err(TerrainError::InvalidParameters(format!(
                "region size {region_size} is not a multiple of section world size \
                {section_world_size}"
            ))),
            None => Err(TerrainError::InvalidParameters(
                "section size multiplied by scale overflows".to_string(),
            )),
        }
    }

    /// Amount of points stored along each edge of a section, including the mirrored border.
    #[inline]
    pub fn points_per_edge(&self) -> u32 {
        self.section_size + 1
    }

    /// Total amount of points stored in a section.
    #[inline]
    pub fn points_per_section(&self) -> usize {
        let n = self.points_per_edge() as usize;
        n * n
    }

    /// Size of the section along X and Z in world units.
    #[inline]
    pub fn section_world_size(&self) -> f32 {
        (self.section_size * self.scale) as f32
    }

    /// Size of the quadtree leaf blocks, in cells. Each render LOD halves the block.
    pub fn block_size(&self) -> u32 {
        let shift = (self.render_lod_count - 1).min(31);
        (self.section_size >> shift).max(1)
    }

    /// Clamps the height to the `[min_height; max_height]` range.
    #[inline]
    pub fn clamp_height(&self, height: f32) -> f32 {
        height.clamp(self.min_height as f32, self.max_height as f32)
    }

    /// Largest absolute section coordinate supported by these parameters. Every point of such a
    /// section and of its neighbors fits into `i32`.
    #[inline]
    pub fn max_section_coordinate(&self) -> i32 {
        i32::MAX / self.section_size.max(1) as i32 - 2
    }

    /// Checks whether the section coordinate is within [`Self::max_section_coordinate`].
    #[inline]
    pub fn is_section_in_range(&self, section: Vector2<i32>) -> bool {
        let limit = self.max_section_coordinate().unsigned_abs();
        section.x.unsigned_abs() <= limit && section.y.unsigned_abs() <= limit
    }

    /// Returns the section that owns the given global point.
    #[inline]
    pub fn section_for_point(&self, point: Vector2<i32>) -> Vector2<i32> {
        let size = self.section_size as i32;
        Vector2::new(floor_div(point.x, size), floor_div(point.y, size))
    }

    /// Returns the section that owns the given global point together with the point offset inside
    /// of that section. The offset is always in `[0; section_size)` range, the mirrored offset
    /// `section_size` is never produced since mirrored points are owned by the next section.
    #[inline]
    pub fn section_and_offset_for_point(&self, point: Vector2<i32>) -> (Vector2<i32>, Vector2<u32>) {
        let size = self.section_size as i32;
        let section = self.section_for_point(point);
        let offset = Vector2::new(
            point.x.rem_euclid(size) as u32,
            point.y.rem_euclid(size) as u32,
        );
        (section, offset)
    }

    /// Inverse of [`Self::section_and_offset_for_point`]. Accepts offsets in `[0; section_size]`
    /// range, so a mirrored offset maps to the first point of the next section. The section must
    /// be in range, see [`Self::is_section_in_range`].
    #[inline]
    pub fn point_for_section_and_offset(
        &self,
        section: Vector2<i32>,
        offset: Vector2<u32>,
    ) -> Vector2<i32> {
        let size = self.section_size as i32;
        Vector2::new(
            section.x * size + offset.x as i32,
            section.y * size + offset.y as i32,
        )
    }

    /// Planar (XZ) world position of the global point.
    #[inline]
    pub fn position_for_point(&self, point: Vector2<i32>) -> Vector2<f32> {
        let scale = self.scale as f32;
        Vector2::new(point.x as f32 * scale, point.y as f32 * scale)
    }

    /// World position of the global point with the given height.
    #[inline]
    pub fn world_position(&self, point: Vector2<i32>, height: f32) -> Vector3<f32> {
        let p = self.position_for_point(point);
        Vector3::new(p.x, height, p.y)
    }

    /// Global point whose cell contains the given planar world position.
    #[inline]
    pub fn point_for_position(&self, position: Vector2<f32>) -> Vector2<i32> {
        let scale = self.scale as f32;
        Vector2::new(
            (position.x / scale).floor() as i32,
            (position.y / scale).floor() as i32,
        )
    }

    /// Section that contains the given planar world position.
    #[inline]
    pub fn section_for_position(&self, position: Vector2<f32>) -> Vector2<i32> {
        let size = self.section_world_size();
        Vector2::new(
            (position.x / size).floor() as i32,
            (position.y / size).floor() as i32,
        )
    }

    /// World-space bounding box of the section. The vertical extent spans the whole allowed
    /// height range.
    pub fn section_bounding_box(&self, section: Vector2<i32>) -> AxisAlignedBoundingBox {
        let size = self.section_world_size();
        AxisAlignedBoundingBox::from_min_max(
            Vector3::new(
                section.x as f32 * size,
                self.min_height as f32,
                section.y as f32 * size,
            ),
            Vector3::new(
                section.x as f32 * size + size,
                self.max_height as f32,
                section.y as f32 * size + size,
            ),
        )
    }
}
