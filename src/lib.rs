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

//! Sparse, pageable grid of terrain sections.
//!
//! The terrain of a level is split into square sections that are created, loaded, saved and
//! deleted independently. Together they form one continuous field of heights and blend layer
//! weights. Points on the shared border of adjacent sections are duplicated in each section, and
//! every edit made through [`SectionStore`] keeps these duplicates identical.
//!
//! Besides editing, the store supports ray casting against the loaded sections and bulk import of
//! heightmap images.

#![allow(clippy::too_many_arguments)]

pub mod archive;
pub mod callbacks;
pub mod codec;
pub mod error;
pub mod heightmap;
pub mod layers;
pub mod params;
pub mod quadtree;
pub mod raycast;
pub mod section;
pub mod store;

#[cfg(test)]
mod test_support;

pub use fxhash;
pub use image;

#[doc(inline)]
pub use terrain_core as core;

pub use crate::{
    archive::{FsArchive, MemoryArchive, SectionArchive},
    callbacks::{NoEditCallbacks, NoProgress, ProgressReporter, TerrainEditCallbacks},
    codec::{BinarySectionSerializer, SectionSerializer},
    error::TerrainError,
    heightmap::{HeightImage, HeightmapImportOptions, HeightmapSpan},
    layers::{LayerWeight, PointLayers, TerrainLayers, MAX_LAYERS},
    params::{HeightFormat, TerrainParameters},
    raycast::TerrainRayCastResult,
    section::Section,
    store::{SectionStore, SectionStoreBuilder},
};

/// Defines a builder's `with_xxx` method.
#[macro_export]
macro_rules! define_with {
    ($(#[$attr:meta])* fn $name:ident($field:ident: $ty:ty)) => {
        $(#[$attr])*
        pub fn $name(mut self, value: $ty) -> Self {
            self.$field = value;
            self
        }
    };
}
