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

//! Section store is a sparse, growable grid of terrain sections. See [`SectionStore`] docs for
//! more info.

mod edge;
mod layers;

pub(crate) use edge::point_holders;

use crate::{
    archive::{MemoryArchive, SectionArchive},
    callbacks::{NoEditCallbacks, NoProgress, ProgressReporter, TerrainEditCallbacks},
    codec::{storage_key, BinarySectionSerializer, SectionSerializer, MANIFEST_ENTRY},
    core::{algebra::Vector2, err, info, log::Log, warn},
    define_with,
    error::TerrainError,
    layers::{PointLayers, TerrainLayers},
    params::TerrainParameters,
    section::Section,
};
use edge::{EditEvent, PointWrite};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

/// Persistent description of a store, kept in the archive next to the sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoreManifest {
    parameters: TerrainParameters,
    layers: TerrainLayers,
    min: (i32, i32),
    max: (i32, i32),
    available: Vec<(i32, i32)>,
}

/// Configures and creates a [`SectionStore`].
pub struct SectionStoreBuilder {
    params: TerrainParameters,
    layers: TerrainLayers,
    archive: Box<dyn SectionArchive>,
    serializer: Box<dyn SectionSerializer>,
    callbacks: Box<dyn TerrainEditCallbacks>,
    progress: Box<dyn ProgressReporter>,
    create_height: Option<f32>,
    create_layer: Option<Option<u8>>,
    bounds: (Vector2<i32>, Vector2<i32>),
}

impl Default for SectionStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionStoreBuilder {
    pub fn new() -> Self {
        Self {
            params: Default::default(),
            layers: Default::default(),
            archive: Box::new(MemoryArchive::new()),
            serializer: Box::new(BinarySectionSerializer),
            callbacks: Box::new(NoEditCallbacks),
            progress: Box::new(NoProgress),
            create_height: None,
            create_layer: None,
            bounds: (Vector2::new(0, 0), Vector2::new(0, 0)),
        }
    }

    define_with!(
        /// Parameters of the new store. Ignored by [`Self::open`], which takes them from the
        /// archive.
        fn with_parameters(params: TerrainParameters)
    );

    define_with!(
        /// Layer palette of the new store.
        fn with_layers(layers: TerrainLayers)
    );

    pub fn with_archive<A: SectionArchive + 'static>(mut self, archive: A) -> Self {
        self.archive = Box::new(archive);
        self
    }

    pub fn with_serializer<S: SectionSerializer + 'static>(mut self, serializer: S) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    pub fn with_callbacks<C: TerrainEditCallbacks + 'static>(mut self, callbacks: C) -> Self {
        self.callbacks = Box::new(callbacks);
        self
    }

    pub fn with_progress<P: ProgressReporter + 'static>(mut self, progress: P) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Height of newly created sections. Base height of the parameters is used by default.
    pub fn with_create_height(mut self, height: f32) -> Self {
        self.create_height = Some(height);
        self
    }

    /// Layer that fully covers newly created sections. The default layer of the palette is used
    /// by default, `None` creates sections without weights.
    pub fn with_create_layer(mut self, layer: Option<u8>) -> Self {
        self.create_layer = Some(layer);
        self
    }

    /// Initial inclusive bounds of the grid.
    pub fn with_bounds(mut self, min: Vector2<i32>, max: Vector2<i32>) -> Self {
        self.bounds = (min, max);
        self
    }

    /// Creates an empty store.
    pub fn build(self) -> Result<SectionStore, TerrainError> {
        self.params.validate()?;
        let (min, max) = self.bounds;
        let count =
            grid_len(&self.params, min, max).ok_or(TerrainError::InvalidGridBounds { min, max })?;
        if let Some(layer) = self.create_layer.flatten() {
            if !self.layers.is_allocated(layer as usize) {
                return Err(TerrainError::LayerNotAllocated(layer as usize));
            }
        }

        let create_height = self
            .params
            .clamp_height(self.create_height.unwrap_or(self.params.base_height as f32));
        let create_layer = self
            .create_layer
            .unwrap_or_else(|| self.layers.default_layer().map(|l| l as u8));

        Ok(SectionStore {
            params: self.params,
            layers: self.layers,
            min,
            max,
            available: vec![false; count],
            sections: (0..count).map(|_| None).collect(),
            loaded: Vec::new(),
            deleted: Vec::new(),
            archive: self.archive,
            serializer: self.serializer,
            callbacks: self.callbacks,
            progress: self.progress,
            create_height,
            create_layer,
        })
    }

    /// Reopens a store from the manifest in the archive. Parameters, layers and bounds are taken
    /// from the manifest, sections stay unloaded until requested.
    pub fn open(mut self) -> Result<SectionStore, TerrainError> {
        let bytes = self.archive.read_entry(MANIFEST_ENTRY)?;
        let manifest: StoreManifest = ron::de::from_bytes(&bytes)?;
        self.params = manifest.parameters;
        self.layers = manifest.layers;
        self.bounds = (
            Vector2::new(manifest.min.0, manifest.min.1),
            Vector2::new(manifest.max.0, manifest.max.1),
        );

        let mut store = self.build()?;
        for (x, y) in manifest.available {
            let coord = Vector2::new(x, y);
            match store.index(coord) {
                Some(index) => store.available[index] = true,
                None => {
                    return Err(TerrainError::Config(format!(
                        "available section ({x}; {y}) is outside of the grid bounds"
                    )))
                }
            }
        }

        info!(
            "Opened terrain store with {} available sections.",
            store.available.iter().filter(|a| **a).count()
        );

        Ok(store)
    }
}

/// Largest amount of cells (available or not) the grid may have.
pub const MAX_GRID_SECTIONS: usize = 1 << 24;

/// Amount of cells of the grid with the given inclusive bounds. `None` if the bounds are inverted,
/// exceed the coordinate range of the parameters or make the grid too large.
fn grid_len(params: &TerrainParameters, min: Vector2<i32>, max: Vector2<i32>) -> Option<usize> {
    if min.x > max.x
        || min.y > max.y
        || !params.is_section_in_range(min)
        || !params.is_section_in_range(max)
    {
        return None;
    }
    let width = (max.x as i64 - min.x as i64 + 1) as u64;
    let height = (max.y as i64 - min.y as i64 + 1) as u64;
    width
        .checked_mul(height)
        .filter(|count| *count <= MAX_GRID_SECTIONS as u64)
        .map(|count| count as usize)
}

/// Sparse grid of terrain sections.
///
/// Every coordinate within the inclusive `[min; max]` rectangle of the grid is legal. A legal
/// coordinate may be available (the section exists in the level) and an available section may be
/// loaded (resident in memory). Sections are created, loaded, unloaded and deleted independently,
/// the grid grows automatically when a section is created outside of it.
///
/// Points on the shared border of adjacent sections are stored in each of them. Every edit keeps
/// these copies identical across loaded sections: a write to the first row or column of a section
/// is mirrored into the last row or column of its west, south and south-west neighbors.
pub struct SectionStore {
    params: TerrainParameters,
    layers: TerrainLayers,
    min: Vector2<i32>,
    max: Vector2<i32>,
    available: Vec<bool>,
    sections: Vec<Option<Box<Section>>>,
    loaded: Vec<Vector2<i32>>,
    deleted: Vec<Vector2<i32>>,
    archive: Box<dyn SectionArchive>,
    serializer: Box<dyn SectionSerializer>,
    callbacks: Box<dyn TerrainEditCallbacks>,
    progress: Box<dyn ProgressReporter>,
    create_height: f32,
    create_layer: Option<u8>,
}

impl SectionStore {
    /// Shortcut for [`SectionStoreBuilder`] with the given parameters and default collaborators.
    pub fn new(params: TerrainParameters) -> Result<Self, TerrainError> {
        SectionStoreBuilder::new().with_parameters(params).build()
    }

    /// Reopens a store previously saved into the archive.
    pub fn open<A: SectionArchive + 'static>(archive: A) -> Result<Self, TerrainError> {
        SectionStoreBuilder::new().with_archive(archive).open()
    }

    #[inline]
    pub fn parameters(&self) -> &TerrainParameters {
        &self.params
    }

    #[inline]
    pub fn layers(&self) -> &TerrainLayers {
        &self.layers
    }

    /// Layer palette. Freeing a layer does not remove its weights from the sections.
    #[inline]
    pub fn layers_mut(&mut self) -> &mut TerrainLayers {
        &mut self.layers
    }

    /// Inclusive bounds of the grid.
    #[inline]
    pub fn bounds(&self) -> (Vector2<i32>, Vector2<i32>) {
        (self.min, self.max)
    }

    #[inline]
    pub fn is_legal(&self, coord: Vector2<i32>) -> bool {
        coord.x >= self.min.x && coord.y >= self.min.y && coord.x <= self.max.x && coord.y <= self.max.y
    }

    fn index(&self, coord: Vector2<i32>) -> Option<usize> {
        if self.is_legal(coord) {
            let width = (self.max.x - self.min.x + 1) as usize;
            Some((coord.y - self.min.y) as usize * width + (coord.x - self.min.x) as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_available(&self, coord: Vector2<i32>) -> bool {
        self.index(coord).is_some_and(|i| self.available[i])
    }

    #[inline]
    pub fn is_loaded(&self, coord: Vector2<i32>) -> bool {
        self.index(coord).is_some_and(|i| self.sections[i].is_some())
    }

    /// Loaded sections in the order they were loaded.
    pub fn loaded_sections(&self) -> &[Vector2<i32>] {
        &self.loaded
    }

    /// Sections deleted since the last save.
    pub fn deleted_sections(&self) -> &[Vector2<i32>] {
        &self.deleted
    }

    /// Every available section in row-major order.
    pub fn available_sections(&self) -> Vec<Vector2<i32>> {
        let width = self.max.x - self.min.x + 1;
        self.available
            .iter()
            .enumerate()
            .filter(|(_, available)| **available)
            .map(|(i, _)| {
                let i = i as i32;
                Vector2::new(self.min.x + i % width, self.min.y + i / width)
            })
            .collect()
    }

    pub fn section(&self, coord: Vector2<i32>) -> Option<&Section> {
        self.index(coord)
            .and_then(|i| self.sections[i].as_deref())
    }

    pub(crate) fn section_mut(&mut self, coord: Vector2<i32>) -> Option<&mut Section> {
        self.index(coord)
            .and_then(|i| self.sections[i].as_deref_mut())
    }

    fn loaded_section_mut(&mut self, coord: Vector2<i32>) -> Result<&mut Section, TerrainError> {
        self.section_mut(coord)
            .ok_or(TerrainError::SectionNotLoaded(coord))
    }

    /// Grows the grid to the new inclusive bounds. The new bounds must contain the current ones,
    /// stay within [`TerrainParameters::max_section_coordinate`] and must not make the grid larger
    /// than [`MAX_GRID_SECTIONS`]. Loaded sections are moved into the new grid as is.
    pub fn resize_grid(
        &mut self,
        new_min: Vector2<i32>,
        new_max: Vector2<i32>,
    ) -> Result<(), TerrainError> {
        let grows = new_min.x <= self.min.x
            && new_min.y <= self.min.y
            && new_max.x >= self.max.x
            && new_max.y >= self.max.y;
        let Some(count) = grid_len(&self.params, new_min, new_max).filter(|_| grows) else {
            warn!(
                "Unable to resize the terrain grid to ({}; {}) - ({}; {}).",
                new_min.x, new_min.y, new_max.x, new_max.y
            );
            return Err(TerrainError::InvalidGridBounds {
                min: new_min,
                max: new_max,
            });
        };

        if new_min == self.min && new_max == self.max {
            return Ok(());
        }

        let new_width = (new_max.x - new_min.x + 1) as usize;
        let mut available = vec![false; count];
        let mut sections = (0..count).map(|_| None).collect::<Vec<_>>();

        for y in self.min.y..=self.max.y {
            for x in self.min.x..=self.max.x {
                let coord = Vector2::new(x, y);
                if let Some(old_index) = self.index(coord) {
                    let new_index =
                        (y - new_min.y) as usize * new_width + (x - new_min.x) as usize;
                    available[new_index] = self.available[old_index];
                    sections[new_index] = self.sections[old_index].take();
                }
            }
        }

        self.min = new_min;
        self.max = new_max;
        self.available = available;
        self.sections = sections;

        Ok(())
    }

    /// Creates a blank section. The grid grows if the coordinate is outside of it. Existing
    /// neighbors are loaded first and border points of the new section take their values. If a
    /// neighbor fails to load, the section is not created.
    pub fn create_section(&mut self, coord: Vector2<i32>) -> Result<(), TerrainError> {
        if self.is_available(coord) {
            warn!("Section ({}; {}) already exists.", coord.x, coord.y);
            return Err(TerrainError::SectionAlreadyExists(coord));
        }

        if !self.is_legal(coord) {
            self.resize_grid(self.min.inf(&coord), self.max.sup(&coord))?;
        }

        if let Err(e) = self.ensure_adjacent_sections_loaded(coord) {
            err!("Unable to create section ({}; {}). Reason: {}", coord.x, coord.y, e);
            return Err(e);
        }

        let mut section = Section::new(coord, &self.params, self.create_height, self.create_layer);
        section.set_changed(true);

        let index = self
            .index(coord)
            .ok_or(TerrainError::SectionUnavailable(coord))?;
        self.sections[index] = Some(Box::new(section));
        self.available[index] = true;
        self.loaded.push(coord);
        self.deleted.retain(|c| *c != coord);

        self.callbacks.on_section_created(coord);
        self.callbacks.on_section_loaded(coord);

        let mut events = Vec::new();
        self.pull_borders(coord, &mut events)?;
        self.notify(events);

        Ok(())
    }

    /// Reads the section from the archive. Does nothing if the section is already loaded. On
    /// failure, the store is left untouched.
    pub fn load_section(&mut self, coord: Vector2<i32>) -> Result<(), TerrainError> {
        if self.is_loaded(coord) {
            return Ok(());
        }

        let Some(index) = self.index(coord).filter(|i| self.available[*i]) else {
            warn!("Unable to load section ({}; {}), it is not available.", coord.x, coord.y);
            return Err(TerrainError::SectionUnavailable(coord));
        };

        let section = self
            .archive
            .read_entry(&storage_key(coord))
            .map_err(TerrainError::from)
            .and_then(|bytes| {
                self.serializer
                    .load_section(coord, &mut bytes.as_slice(), &self.params)
            });

        match section {
            Ok(section) => {
                self.sections[index] = Some(Box::new(section));
                self.loaded.push(coord);
                self.callbacks.on_section_loaded(coord);
                Ok(())
            }
            Err(e) => {
                err!("Unable to load section ({}; {}). Reason: {}", coord.x, coord.y, e);
                Err(e)
            }
        }
    }

    /// Releases the section. Unsaved changes are lost. Does nothing if the section is not loaded.
    pub fn unload_section(&mut self, coord: Vector2<i32>) -> Result<(), TerrainError> {
        let Some(index) = self.index(coord) else {
            warn!("Unable to unload section ({}; {}), it is not available.", coord.x, coord.y);
            return Err(TerrainError::SectionUnavailable(coord));
        };

        let Some(section) = self.sections[index].as_ref() else {
            return Ok(());
        };

        if section.is_changed() {
            warn!(
                "Section ({}; {}) is unloaded with unsaved changes, the changes are lost.",
                coord.x, coord.y
            );
        }

        self.callbacks.on_section_unloaded(coord);
        self.sections[index] = None;
        self.loaded.retain(|c| *c != coord);

        Ok(())
    }

    /// Deletes the section from the level. Remaining neighbors get their shared border reset to
    /// the base height with empty weights.
    pub fn delete_section(&mut self, coord: Vector2<i32>) -> Result<(), TerrainError> {
        if !self.is_available(coord) {
            err!("Unable to delete section ({}; {}), it is not available.", coord.x, coord.y);
            return Err(TerrainError::SectionUnavailable(coord));
        }

        if let Err(e) = self.ensure_adjacent_sections_loaded(coord) {
            err!("Unable to delete section ({}; {}). Reason: {}", coord.x, coord.y, e);
            return Err(e);
        }

        let mut events = Vec::new();
        self.backfill_borders(coord, &mut events)?;

        if let Some(index) = self.index(coord) {
            self.sections[index] = None;
            self.available[index] = false;
        }
        self.loaded.retain(|c| *c != coord);
        if !self.deleted.contains(&coord) {
            self.deleted.push(coord);
        }

        self.notify(events);
        self.callbacks.on_section_deleted(coord);

        Ok(())
    }

    /// Deletes every section of the batch. Failures are logged and do not stop the batch.
    pub fn delete_sections(&mut self, coords: &[Vector2<i32>]) -> Result<(), TerrainError> {
        let errors = coords
            .iter()
            .filter_map(|coord| self.delete_section(*coord).err())
            .collect::<Vec<_>>();
        TerrainError::from_many(errors).map_or(Ok(()), Err)
    }

    /// Loads the section and its eight neighbors, if they are available.
    pub fn ensure_adjacent_sections_loaded(
        &mut self,
        coord: Vector2<i32>,
    ) -> Result<(), TerrainError> {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (Some(x), Some(y)) = (coord.x.checked_add(dx), coord.y.checked_add(dy)) else {
                    continue;
                };
                let neighbor = Vector2::new(x, y);
                if self.is_available(neighbor) && !self.is_loaded(neighbor) {
                    self.load_section(neighbor)
                        .map_err(|e| TerrainError::NeighborLoadFailed {
                            section: coord,
                            source: Box::new(e),
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Loads every available section. Progress is reported, the operation is not cancellable.
    pub fn load_all_sections(&mut self) -> Result<(), TerrainError> {
        let coords = self.available_sections();

        self.progress.set_cancellable(false);
        self.progress.set_status("Loading terrain sections");
        self.progress.set_range(0, coords.len() as u32);

        let mut errors = Vec::new();
        for (i, coord) in coords.iter().enumerate() {
            if let Err(e) = self.load_section(*coord) {
                errors.push(e);
            }
            self.progress.set_value(i as u32 + 1);
        }

        info!(
            "Loaded {} terrain sections, {} failed.",
            coords.len() - errors.len(),
            errors.len()
        );

        TerrainError::from_many(errors).map_or(Ok(()), Err)
    }

    pub fn unload_all_sections(&mut self) {
        for coord in self.loaded.clone() {
            Log::verify(self.unload_section(coord));
        }
    }

    /// Writes the loaded section into the archive and clears its changed flag.
    pub fn save_section(&mut self, coord: Vector2<i32>) -> Result<(), TerrainError> {
        let result = match self.section(coord) {
            Some(section) => {
                let mut bytes = Vec::new();
                self.serializer
                    .save_section(section, &mut bytes, &self.params)
                    .and_then(|_| {
                        self.archive
                            .write_entry(&storage_key(coord), &bytes)
                            .map_err(TerrainError::from)
                    })
            }
            None => Err(TerrainError::SectionNotLoaded(coord)),
        };

        match result {
            Ok(()) => {
                self.loaded_section_mut(coord)?.set_changed(false);
                Ok(())
            }
            Err(e) => {
                err!("Unable to save section ({}; {}). Reason: {}", coord.x, coord.y, e);
                Err(e)
            }
        }
    }

    /// Saves every changed section, purges deleted sections from the archive and writes the
    /// manifest.
    pub fn save_all_sections(&mut self) -> Result<(), TerrainError> {
        let mut errors: Vec<TerrainError> = Vec::new();

        let deleted = std::mem::take(&mut self.deleted);
        for coord in deleted {
            if let Err(e) = self.archive.delete_entry(&storage_key(coord)) {
                err!("Unable to purge section ({}; {}). Reason: {}", coord.x, coord.y, e);
                self.deleted.push(coord);
                errors.push(e.into());
            }
        }

        let mut saved = 0;
        for coord in self.loaded.clone() {
            if self.section(coord).is_some_and(|s| s.is_changed()) {
                match self.save_section(coord) {
                    Ok(()) => saved += 1,
                    Err(e) => errors.push(e),
                }
            }
        }

        if let Err(e) = self.save_manifest() {
            err!("Unable to save terrain manifest. Reason: {}", e);
            errors.push(e);
        }

        info!("Saved {saved} terrain sections.");

        TerrainError::from_many(errors).map_or(Ok(()), Err)
    }

    fn save_manifest(&self) -> Result<(), TerrainError> {
        let manifest = StoreManifest {
            parameters: self.params.clone(),
            layers: self.layers.clone(),
            min: (self.min.x, self.min.y),
            max: (self.max.x, self.max.y),
            available: self
                .available_sections()
                .into_iter()
                .map(|c| (c.x, c.y))
                .collect(),
        };
        let text = ron::ser::to_string_pretty(&manifest, PrettyConfig::default())?;
        self.archive
            .write_entry(MANIFEST_ENTRY, text.as_bytes())?;
        Ok(())
    }

    /// Height at the global point. The point must be stored in a loaded section.
    pub fn point_height(&self, point: Vector2<i32>) -> Result<f32, TerrainError> {
        let (section, offset) = self.loaded_holder(point)?;
        section.height(offset)
    }

    /// Height at the point of a loaded section. Offsets are in `[0; section_size]` range.
    pub fn section_point_height(
        &self,
        coord: Vector2<i32>,
        offset: Vector2<u32>,
    ) -> Result<f32, TerrainError> {
        self.section(coord)
            .ok_or(TerrainError::SectionNotLoaded(coord))?
            .height(offset)
    }

    /// Sets the height of the global point. The height is clamped to the allowed range, sections
    /// that store the point are loaded if needed. NaN and infinite heights are rejected.
    pub fn set_point_height(&mut self, point: Vector2<i32>, height: f32) -> Result<(), TerrainError> {
        if !height.is_finite() {
            warn!("Unable to set height of point ({}; {}) to {height}.", point.x, point.y);
            return Err(TerrainError::NotFinite(height));
        }
        let height = self.params.clamp_height(height);
        let mut events = Vec::new();
        let result = self.write_point(point, &PointWrite::Height(height), &mut events);
        self.notify(events);
        result
    }

    /// Adds `delta` to the height of the global point.
    pub fn add_point_height(&mut self, point: Vector2<i32>, delta: f32) -> Result<(), TerrainError> {
        self.load_point(point)?;
        let height = self.point_height(point)?;
        self.set_point_height(point, height + delta)
    }

    /// Sets the height of the point of the section. Writes at a mirrored offset are redirected to
    /// the section that owns the point, if it exists.
    pub fn set_section_point_height(
        &mut self,
        coord: Vector2<i32>,
        offset: Vector2<u32>,
        height: f32,
    ) -> Result<(), TerrainError> {
        let point = self.section_point(coord, offset)?;
        self.set_point_height(point, height)
    }

    /// Validates section-local addressing and converts it into a global point.
    fn section_point(
        &self,
        coord: Vector2<i32>,
        offset: Vector2<u32>,
    ) -> Result<Vector2<i32>, TerrainError> {
        if !self.is_available(coord) {
            warn!("Unable to edit section ({}; {}), it is not available.", coord.x, coord.y);
            return Err(TerrainError::SectionUnavailable(coord));
        }
        let size = self.params.section_size;
        if offset.x > size || offset.y > size {
            warn!("Point offset ({}; {}) is out of range.", offset.x, offset.y);
            return Err(TerrainError::OffsetOutOfRange {
                offset,
                section_size: size,
            });
        }
        Ok(self.params.point_for_section_and_offset(coord, offset))
    }

    /// Returns the first loaded section that stores the point, the owner is preferred.
    fn loaded_holder(&self, point: Vector2<i32>) -> Result<(&Section, Vector2<u32>), TerrainError> {
        let holders = point_holders(&self.params, point);
        for (coord, offset) in holders.iter() {
            if let Some(section) = self.section(*coord) {
                return Ok((section, *offset));
            }
        }
        let owner = holders[0].0;
        if holders.iter().any(|(coord, _)| self.is_available(*coord)) {
            Err(TerrainError::SectionNotLoaded(owner))
        } else {
            Err(TerrainError::SectionUnavailable(owner))
        }
    }

    /// Loads the owner of the point or, if there is no owner, every available section that stores
    /// the point.
    fn load_point(&mut self, point: Vector2<i32>) -> Result<(), TerrainError> {
        let holders = point_holders(&self.params, point);
        let (owner, _) = holders[0];
        if self.is_available(owner) {
            return self.load_section(owner);
        }
        let mut any = false;
        for (coord, _) in holders.iter().skip(1) {
            if self.is_available(*coord) {
                self.load_section(*coord)?;
                any = true;
            }
        }
        if any {
            Ok(())
        } else {
            warn!("Point ({}; {}) is not stored in any section.", point.x, point.y);
            Err(TerrainError::SectionUnavailable(owner))
        }
    }

    fn notify(&mut self, events: Vec<EditEvent>) {
        for event in events {
            match event {
                EditEvent::Height { section, offset } => self
                    .callbacks
                    .on_section_point_height_modified(section, offset),
                EditEvent::Layers { section, offset } => self
                    .callbacks
                    .on_section_point_layers_modified(section, offset),
                EditEvent::SectionLayers { section, layers } => {
                    self.callbacks.on_section_layers_modified(section, layers)
                }
            }
        }
    }

    pub(crate) fn default_layer(&self) -> Option<u8> {
        self.layers.default_layer().map(|l| l as u8)
    }

    pub(crate) fn point_layers_for_edit(
        &mut self,
        point: Vector2<i32>,
    ) -> Result<PointLayers, TerrainError> {
        self.load_point(point)?;
        Ok(self.point_layers(point)?.clone())
    }

    pub(crate) fn progress_mut(&mut self) -> &mut dyn ProgressReporter {
        &mut *self.progress
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        core::{
            algebra::Vector3,
            log::{Log, MessageKind},
            math::ray::Ray,
        },
        heightmap::{HeightImage, HeightmapImportOptions, HeightmapSpan},
        layers::MAX_LAYERS,
        test_support::*,
    };
    use std::sync::mpsc::channel;

    const EPS: f32 = 1.0e-4;

    fn v(x: i32, y: i32) -> Vector2<i32> {
        Vector2::new(x, y)
    }

    fn o(x: u32, y: u32) -> Vector2<u32> {
        Vector2::new(x, y)
    }

    fn pair() -> Fixture {
        let mut f = fixture();
        f.store.create_section(v(0, 0)).unwrap();
        f.store.create_section(v(1, 0)).unwrap();
        f.callbacks.take();
        f
    }

    #[test]
    fn test_create_section() {
        let mut f = fixture();
        f.store.create_section(v(0, 0)).unwrap();
        assert_eq!(
            f.callbacks.take(),
            vec![Recorded::Created(v(0, 0)), Recorded::Loaded(v(0, 0))]
        );
        assert!(f.store.is_available(v(0, 0)));
        assert!(f.store.is_loaded(v(0, 0)));
        assert!(f.store.section(v(0, 0)).unwrap().is_changed());
        assert_eq!(f.store.loaded_sections(), &[v(0, 0)]);

        assert!(matches!(
            f.store.create_section(v(0, 0)),
            Err(TerrainError::SectionAlreadyExists(_))
        ));

        // Out of bounds creation grows the grid.
        f.store.create_section(v(3, -2)).unwrap();
        assert_eq!(f.store.bounds(), (v(0, -2), v(3, 0)));
        assert!(f.store.is_loaded(v(0, 0)));
        assert!(f.store.is_legal(v(2, -1)));
        assert!(!f.store.is_available(v(2, -1)));
        assert_eq!(f.store.available_sections(), vec![v(3, -2), v(0, 0)]);
    }

    #[test]
    fn test_new_sections_use_create_height_and_layer() {
        let mut store = SectionStoreBuilder::new()
            .with_parameters(test_parameters())
            .with_layers(test_layers())
            .with_create_height(12.0)
            .with_create_layer(Some(2))
            .build()
            .unwrap();
        store.create_section(v(0, 0)).unwrap();
        assert_eq!(store.point_height(v(3, 3)).unwrap(), 12.0);
        assert_eq!(store.point_layers(v(3, 3)).unwrap(), &PointLayers::single(2));

        let result = SectionStoreBuilder::new()
            .with_layers(test_layers())
            .with_create_layer(Some(7))
            .build();
        assert!(matches!(result, Err(TerrainError::LayerNotAllocated(7))));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let params = TerrainParameters {
            section_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            SectionStore::new(params),
            Err(TerrainError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_west_neighbor_mirrors_border_write() {
        let mut f = pair();
        f.store
            .set_section_point_height(v(1, 0), o(0, 5), 42.0)
            .unwrap();
        assert_eq!(f.store.section_point_height(v(0, 0), o(16, 5)).unwrap(), 42.0);
        assert_eq!(f.store.section_point_height(v(1, 0), o(0, 5)).unwrap(), 42.0);

        // Write first, then propagation, then notification.
        assert_eq!(
            f.callbacks.take(),
            vec![
                Recorded::Height(v(1, 0), o(0, 5)),
                Recorded::Height(v(0, 0), o(16, 5)),
            ]
        );
    }

    #[test]
    fn test_no_east_propagation() {
        let mut f = pair();
        // Interior point of (0, 0) next to the border is not shared.
        f.store.set_point_height(v(15, 5), 3.0).unwrap();
        assert_eq!(f.store.section_point_height(v(1, 0), o(0, 5)).unwrap(), 0.0);
        assert_eq!(
            f.callbacks.take(),
            vec![Recorded::Height(v(0, 0), o(15, 5))]
        );
    }

    #[test]
    fn test_mirror_write_is_redirected_to_owner() {
        let mut f = pair();
        f.store
            .set_section_point_height(v(0, 0), o(16, 5), 7.0)
            .unwrap();
        assert_eq!(f.store.section_point_height(v(1, 0), o(0, 5)).unwrap(), 7.0);
        assert_eq!(f.store.section_point_height(v(0, 0), o(16, 5)).unwrap(), 7.0);
        assert_eq!(
            f.callbacks.take(),
            vec![
                Recorded::Height(v(1, 0), o(0, 5)),
                Recorded::Height(v(0, 0), o(16, 5)),
            ]
        );
    }

    #[test]
    fn test_mirror_without_owner_is_written_in_place() {
        let mut f = fixture();
        f.store.create_section(v(0, 0)).unwrap();
        f.store
            .set_section_point_height(v(0, 0), o(16, 5), 9.0)
            .unwrap();
        assert_eq!(f.store.section_point_height(v(0, 0), o(16, 5)).unwrap(), 9.0);
        assert_eq!(f.store.point_height(v(16, 5)).unwrap(), 9.0);

        // The new owner picks up the existing value instead of overwriting it.
        f.store.create_section(v(1, 0)).unwrap();
        assert_eq!(f.store.section_point_height(v(1, 0), o(0, 5)).unwrap(), 9.0);
        assert_eq!(f.store.section_point_height(v(0, 0), o(16, 5)).unwrap(), 9.0);
        assert_borders_consistent(&f.store);
    }

    #[test]
    fn test_create_picks_up_all_neighbors() {
        let mut f = fixture();
        for coord in [v(0, 0), v(1, 0), v(0, 1)] {
            f.store.create_section(coord).unwrap();
        }
        // Point (16; 16) is owned by the missing section (1; 1).
        f.store.set_point_height(v(16, 16), 5.0).unwrap();
        f.store.set_point_height(v(20, 16), 6.0).unwrap();
        f.store.set_point_height(v(16, 30), 8.0).unwrap();

        f.store.create_section(v(1, 1)).unwrap();
        assert_eq!(f.store.section_point_height(v(1, 1), o(0, 0)).unwrap(), 5.0);
        assert_eq!(f.store.section_point_height(v(1, 1), o(4, 0)).unwrap(), 6.0);
        assert_eq!(f.store.section_point_height(v(1, 1), o(0, 14)).unwrap(), 8.0);
        assert_borders_consistent(&f.store);
    }

    #[test]
    fn test_unchanged_values_do_not_dirty_sections() {
        let mut f = pair();
        f.store
            .set_section_point_height(v(1, 0), o(0, 5), 42.0)
            .unwrap();
        f.store.save_all_sections().unwrap();
        assert!(!f.store.section(v(0, 0)).unwrap().is_changed());

        f.store
            .set_section_point_height(v(1, 0), o(0, 5), 42.0)
            .unwrap();
        assert!(!f.store.section(v(0, 0)).unwrap().is_changed());
        assert!(!f.store.section(v(1, 0)).unwrap().is_changed());

        f.store.set_point_height(v(20, 5), 1.0).unwrap();
        assert!(!f.store.section(v(0, 0)).unwrap().is_changed());
        assert!(f.store.section(v(1, 0)).unwrap().is_changed());
    }

    #[test]
    fn test_propagation_skips_unloaded_neighbors() {
        let mut f = pair();
        f.store.save_all_sections().unwrap();
        f.store.unload_section(v(0, 0)).unwrap();

        f.store
            .section_mut(v(1, 0))
            .unwrap()
            .set_height(o(0, 5), 3.0)
            .unwrap();
        let mut events = Vec::new();
        f.store
            .propagate_point(v(1, 0), o(0, 5), &mut events)
            .unwrap();
        assert!(events.is_empty());
        assert!(!f.store.is_loaded(v(0, 0)));
    }

    #[test]
    fn test_border_edits_load_neighbors() {
        let mut f = pair();
        f.store.save_all_sections().unwrap();
        f.store.unload_all_sections();
        assert!(f.store.loaded_sections().is_empty());

        f.store.set_point_height(v(16, 5), 11.0).unwrap();
        assert!(f.store.is_loaded(v(0, 0)));
        assert!(f.store.is_loaded(v(1, 0)));
        assert_eq!(f.store.section_point_height(v(0, 0), o(16, 5)).unwrap(), 11.0);
    }

    #[test]
    fn test_height_accessors() {
        let mut f = pair();
        f.store.add_point_height(v(3, 3), 5.0).unwrap();
        f.store.add_point_height(v(3, 3), 5.0).unwrap();
        assert_eq!(f.store.point_height(v(3, 3)).unwrap(), 10.0);

        f.store.set_point_height(v(3, 3), 5000.0).unwrap();
        assert_eq!(f.store.point_height(v(3, 3)).unwrap(), 1000.0);
        f.store.set_point_height(v(3, 3), -5.0).unwrap();
        assert_eq!(f.store.point_height(v(3, 3)).unwrap(), 0.0);

        assert!(matches!(
            f.store.point_height(v(100, 100)),
            Err(TerrainError::SectionUnavailable(_))
        ));
        assert!(matches!(
            f.store.set_point_height(v(-5, 3), 1.0),
            Err(TerrainError::SectionUnavailable(_))
        ));
        assert!(matches!(
            f.store.set_section_point_height(v(0, 0), o(17, 0), 1.0),
            Err(TerrainError::OffsetOutOfRange { .. })
        ));

        f.store.save_all_sections().unwrap();
        f.store.unload_section(v(1, 0)).unwrap();
        assert!(matches!(
            f.store.point_height(v(20, 3)),
            Err(TerrainError::SectionNotLoaded(_))
        ));
        // Mirror of the unloaded owner is still readable.
        assert_eq!(f.store.point_height(v(16, 3)).unwrap(), 0.0);
    }

    #[test]
    fn test_delete_backfills_neighbor_border() {
        let mut f = pair();
        f.store
            .set_section_point_height(v(1, 0), o(0, 3), 50.0)
            .unwrap();
        f.store.set_point_height(v(16, 16), 20.0).unwrap();
        f.store.set_point_layer_weight(v(16, 3), 1, 1.0, true).unwrap();
        f.callbacks.take();

        f.store.delete_section(v(0, 0)).unwrap();

        for y in 0..=16 {
            assert_eq!(f.store.section_point_height(v(1, 0), o(0, y)).unwrap(), 0.0);
            assert!(f
                .store
                .section(v(1, 0))
                .unwrap()
                .point_layers(o(0, y))
                .unwrap()
                .is_empty());
        }
        // Interior is untouched.
        assert_eq!(
            f.store.point_layers(v(20, 3)).unwrap(),
            &PointLayers::single(0)
        );

        assert!(!f.store.is_available(v(0, 0)));
        assert!(!f.store.is_loaded(v(0, 0)));
        assert_eq!(f.store.loaded_sections(), &[v(1, 0)]);
        assert_eq!(f.store.deleted_sections(), &[v(0, 0)]);

        let events = f.callbacks.take();
        assert_eq!(events.last(), Some(&Recorded::Deleted(v(0, 0))));
        assert!(events.contains(&Recorded::Height(v(1, 0), o(0, 3))));
        assert!(events.contains(&Recorded::Layers(v(1, 0), o(0, 0))));

        // Re-creation removes the section from the deleted list.
        f.store.create_section(v(0, 0)).unwrap();
        assert!(f.store.deleted_sections().is_empty());
    }

    #[test]
    fn test_batch_delete_continues_after_failure() {
        let mut f = pair();
        let result = f.store.delete_sections(&[v(5, 5), v(0, 0), v(0, 0)]);
        assert!(matches!(result, Err(TerrainError::Multiple(ref errors)) if errors.len() == 2));
        assert!(!f.store.is_available(v(0, 0)));
        assert_eq!(f.store.deleted_sections(), &[v(0, 0)]);
    }

    #[test]
    fn test_resize_grid() {
        let mut f = pair();
        f.store.set_point_height(v(20, 5), 13.0).unwrap();

        f.store.resize_grid(v(-2, -1), v(3, 4)).unwrap();
        assert_eq!(f.store.bounds(), (v(-2, -1), v(3, 4)));
        assert_eq!(f.store.point_height(v(20, 5)).unwrap(), 13.0);
        assert!(f.store.is_available(v(0, 0)) && f.store.is_available(v(1, 0)));
        assert_eq!(f.store.available_sections().len(), 2);

        assert!(matches!(
            f.store.resize_grid(v(-1, -1), v(3, 4)),
            Err(TerrainError::InvalidGridBounds { .. })
        ));
        assert!(matches!(
            f.store.resize_grid(v(5, 5), v(4, 4)),
            Err(TerrainError::InvalidGridBounds { .. })
        ));
        assert_eq!(f.store.bounds(), (v(-2, -1), v(3, 4)));
    }

    #[test]
    fn test_save_and_reload() {
        let mut f = pair();
        f.store.set_point_height(v(20, 5), 13.0).unwrap();
        f.store.set_point_layer_weight(v(3, 3), 2, 0.5, true).unwrap();
        f.store.save_all_sections().unwrap();

        assert!(f.archive.has_entry("section_0_0.sec"));
        assert!(f.archive.has_entry("section_1_0.sec"));
        assert!(f.archive.has_entry(MANIFEST_ENTRY));
        assert!(f
            .store
            .loaded_sections()
            .iter()
            .all(|c| !f.store.section(*c).unwrap().is_changed()));

        f.store.unload_all_sections();
        f.callbacks.take();
        f.store.load_section(v(1, 0)).unwrap();
        f.store.load_section(v(1, 0)).unwrap();
        assert_eq!(f.callbacks.take(), vec![Recorded::Loaded(v(1, 0))]);
        assert_eq!(f.store.point_height(v(20, 5)).unwrap(), 13.0);

        // Deleted sections are purged from the archive on save.
        f.store.delete_section(v(0, 0)).unwrap();
        f.store.save_all_sections().unwrap();
        assert!(!f.archive.has_entry("section_0_0.sec"));
        assert!(f.store.deleted_sections().is_empty());
    }

    #[test]
    fn test_open_from_archive() {
        let mut f = pair();
        f.store.set_point_layer_weight(v(3, 3), 2, 0.5, true).unwrap();
        f.store.save_all_sections().unwrap();

        let mut reopened = SectionStore::open(f.archive.clone()).unwrap();
        assert_eq!(reopened.parameters(), f.store.parameters());
        assert_eq!(reopened.layers(), f.store.layers());
        assert_eq!(reopened.bounds(), f.store.bounds());
        assert_eq!(reopened.available_sections(), vec![v(0, 0), v(1, 0)]);
        assert!(reopened.loaded_sections().is_empty());

        reopened.load_all_sections().unwrap();
        let weight = reopened.point_layers(v(3, 3)).unwrap().weight(2);
        assert!((weight - 0.5).abs() < EPS);

        assert!(SectionStore::open(MemoryArchive::new()).is_err());
    }

    #[test]
    fn test_failed_load_leaves_state_untouched() {
        let mut f = pair();
        f.store.save_all_sections().unwrap();
        f.store.unload_section(v(0, 0)).unwrap();
        f.archive.write_entry("section_0_0.sec", b"garbage").unwrap();

        assert!(f.store.load_section(v(0, 0)).is_err());
        assert!(!f.store.is_loaded(v(0, 0)));
        assert!(f.store.is_available(v(0, 0)));
        assert_eq!(f.store.loaded_sections(), &[v(1, 0)]);

        assert!(matches!(
            f.store.ensure_adjacent_sections_loaded(v(1, 0)),
            Err(TerrainError::NeighborLoadFailed { .. })
        ));
        assert!(matches!(
            f.store.load_section(v(7, 7)),
            Err(TerrainError::SectionUnavailable(_))
        ));
    }

    #[test]
    fn test_ensure_adjacent_sections_loaded() {
        let mut f = fixture();
        for y in 0..3 {
            for x in 0..3 {
                f.store.create_section(v(x, y)).unwrap();
            }
        }
        f.store.save_all_sections().unwrap();
        f.store.unload_all_sections();

        f.store.ensure_adjacent_sections_loaded(v(0, 0)).unwrap();
        assert_eq!(f.store.loaded_sections().len(), 4);

        f.store.ensure_adjacent_sections_loaded(v(1, 1)).unwrap();
        assert_eq!(f.store.loaded_sections().len(), 9);
    }

    #[test]
    fn test_load_all_reports_progress() {
        let mut f = pair();
        f.store.create_section(v(0, 1)).unwrap();
        f.store.save_all_sections().unwrap();
        f.store.unload_all_sections();

        f.store.load_all_sections().unwrap();
        assert_eq!(f.store.loaded_sections().len(), 3);

        let state = f.progress.state.lock().clone();
        assert_eq!(state.range, (0, 3));
        assert_eq!(state.value, 3);
        assert_eq!(state.cancellable, Some(false));
    }

    #[test]
    fn test_unload_with_changes_warns() {
        let (tx, rx) = channel();
        Log::add_listener(tx);

        let mut f = pair();
        f.store.unload_section(v(1, 0)).unwrap();
        assert_eq!(f.callbacks.take(), vec![Recorded::Unloaded(v(1, 0))]);
        assert!(f.store.is_available(v(1, 0)));
        assert!(!f.store.is_loaded(v(1, 0)));

        assert!(rx.try_iter().any(|m| m.kind == MessageKind::Warning
            && m.content.contains("(1; 0)")
            && m.content.contains("unsaved changes")));
    }

    #[test]
    fn test_layer_weight_editing() {
        let mut f = pair();
        f.store.set_point_layer_weight(v(5, 5), 1, 0.3, true).unwrap();
        let layers = f.store.point_layers(v(5, 5)).unwrap();
        assert!((layers.weight(1) - 0.3).abs() < EPS);
        assert!((layers.weight(0) - 0.7).abs() < EPS);
        assert!((layers.sum() - 1.0).abs() < EPS);
        assert_eq!(
            f.callbacks.take(),
            vec![
                Recorded::Layers(v(0, 0), o(5, 5)),
                Recorded::SectionLayers(v(0, 0), 0b10),
            ]
        );

        // The layer is already known to the section.
        f.store.set_point_layer_weight(v(6, 5), 1, 0.3, true).unwrap();
        assert_eq!(
            f.callbacks.take(),
            vec![Recorded::Layers(v(0, 0), o(6, 5))]
        );

        f.store.add_point_layer_weight(v(5, 5), 1, 0.2, true).unwrap();
        let layers = f.store.point_layers(v(5, 5)).unwrap();
        assert!((layers.weight(1) - 0.5).abs() < EPS);
        assert!((layers.sum() - 1.0).abs() < EPS);

        assert!(matches!(
            f.store.set_point_layer_weight(v(5, 5), 5, 0.3, true),
            Err(TerrainError::LayerNotAllocated(5))
        ));
        assert!(matches!(
            f.store.set_point_layer_weight(v(5, 5), MAX_LAYERS + 3, 0.3, true),
            Err(TerrainError::LayerNotAllocated(_))
        ));
    }

    #[test]
    fn test_layer_weights_without_renormalize() {
        let mut f = pair();
        f.store.set_point_layer_weight(v(5, 5), 2, 0.4, false).unwrap();
        let layers = f.store.point_layers(v(5, 5)).unwrap();
        assert!((layers.sum() - 1.4).abs() < EPS);

        f.store.normalize_point_layer_weights(v(5, 5)).unwrap();
        let normalized = f.store.point_layers(v(5, 5)).unwrap().clone();
        assert!((normalized.sum() - 1.0).abs() < EPS);

        f.callbacks.take();
        f.store.normalize_point_layer_weights(v(5, 5)).unwrap();
        assert_eq!(f.store.point_layers(v(5, 5)).unwrap(), &normalized);
        assert!(f.callbacks.take().is_empty());
    }

    #[test]
    fn test_remove_point_layer_weights() {
        let mut f = pair();
        f.store.set_point_layer_weight(v(5, 5), 1, 0.95, true).unwrap();
        f.store.remove_point_layer_weights(v(5, 5), 0.1, true).unwrap();
        assert_eq!(f.store.point_layers(v(5, 5)).unwrap(), &PointLayers::single(1));

        // Removing everything falls back to the default layer.
        f.store.remove_point_layer_weights(v(5, 5), 2.0, true).unwrap();
        assert_eq!(f.store.point_layers(v(5, 5)).unwrap(), &PointLayers::single(0));

        f.store.remove_point_layer_weights(v(5, 5), 2.0, false).unwrap();
        assert!(f.store.point_layers(v(5, 5)).unwrap().is_empty());
    }

    #[test]
    fn test_section_level_layer_operations() {
        let mut f = pair();
        f.store.set_section_layer_weight(v(0, 0), 2, 0.25, true).unwrap();
        for y in 0..=16 {
            for x in 0..=16 {
                let layers = f.store.section(v(0, 0)).unwrap().point_layers(o(x, y)).unwrap();
                assert!((layers.weight(2) - 0.25).abs() < EPS);
                assert!((layers.sum() - 1.0).abs() < EPS);
            }
        }
        // Shared column of the east neighbor follows.
        let layers = f.store.section(v(1, 0)).unwrap().point_layers(o(0, 7)).unwrap();
        assert!((layers.weight(2) - 0.25).abs() < EPS);

        f.store.remove_section_layer_weights(v(0, 0), 0.5, true).unwrap();
        f.store.normalize_section_layer_weights(v(0, 0)).unwrap();
        let layers = f.store.point_layers(v(8, 8)).unwrap();
        assert_eq!(layers, &PointLayers::single(0));

        assert!(matches!(
            f.store.normalize_section_layer_weights(v(4, 4)),
            Err(TerrainError::SectionUnavailable(_))
        ));
        assert_borders_consistent(&f.store);
    }

    #[test]
    fn test_borders_stay_consistent_after_random_edits() {
        let mut f = fixture();
        for y in 0..3 {
            for x in 0..3 {
                f.store.create_section(v(x, y)).unwrap();
            }
        }

        let mut seed = 0x1234_5678u32;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 8
        };

        for _ in 0..2000 {
            // Bias towards border points.
            let pick = |n: u32| -> i32 {
                if n % 3 == 0 {
                    ((n / 3) % 4 * 16) as i32
                } else {
                    (n % 52) as i32 - 2
                }
            };
            let point = v(pick(next()), pick(next()));
            match next() % 4 {
                0 => {
                    let _ = f.store.set_point_height(point, (next() % 1000) as f32);
                }
                1 => {
                    let _ = f.store.set_point_layer_weight(
                        point,
                        (next() % 3) as usize,
                        (next() % 100) as f32 / 100.0,
                        true,
                    );
                }
                2 => {
                    let _ = f.store.add_point_layer_weight(point, 1, -0.1, false);
                }
                _ => {
                    let _ = f
                        .store
                        .set_section_point_height(v(1, 1), o(next() % 17, next() % 17), 1.5);
                }
            }
        }

        assert_borders_consistent(&f.store);
    }

    #[test]
    fn test_create_next_to_unloaded_neighbor() {
        let mut f = fixture();
        f.store.create_section(v(1, 0)).unwrap();
        f.store
            .set_section_point_height(v(1, 0), o(0, 5), 42.0)
            .unwrap();
        f.store.set_point_layer_weight(v(16, 6), 2, 1.0, true).unwrap();
        f.store.save_all_sections().unwrap();
        f.store.unload_section(v(1, 0)).unwrap();
        f.callbacks.take();

        f.store.create_section(v(0, 0)).unwrap();
        assert!(f.store.is_loaded(v(1, 0)));
        assert_eq!(f.store.section_point_height(v(0, 0), o(16, 5)).unwrap(), 42.0);
        assert_eq!(
            f.store.section(v(0, 0)).unwrap().point_layers(o(16, 6)).unwrap(),
            &PointLayers::single(2)
        );
        assert_borders_consistent(&f.store);

        let events = f.callbacks.take();
        assert_eq!(
            &events[..3],
            &[
                Recorded::Loaded(v(1, 0)),
                Recorded::Created(v(0, 0)),
                Recorded::Loaded(v(0, 0)),
            ]
        );
    }

    #[test]
    fn test_create_fails_if_neighbor_fails_to_load() {
        let mut f = fixture();
        f.store.create_section(v(1, 0)).unwrap();
        f.store.save_all_sections().unwrap();
        f.store.unload_section(v(1, 0)).unwrap();
        f.archive.write_entry("section_1_0.sec", b"garbage").unwrap();
        f.callbacks.take();

        assert!(matches!(
            f.store.create_section(v(0, 0)),
            Err(TerrainError::NeighborLoadFailed { .. })
        ));
        assert!(!f.store.is_available(v(0, 0)));
        assert!(f.store.loaded_sections().is_empty());
        assert!(f.callbacks.take().is_empty());
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let mut f = pair();
        f.store.save_all_sections().unwrap();

        for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                f.store.set_point_height(v(3, 3), value),
                Err(TerrainError::NotFinite(_))
            ));
            assert!(matches!(
                f.store.set_point_layer_weight(v(3, 3), 1, value, true),
                Err(TerrainError::NotFinite(_))
            ));
            assert!(matches!(
                f.store.add_point_layer_weight(v(3, 3), 1, value, false),
                Err(TerrainError::NotFinite(_))
            ));
            assert!(matches!(
                f.store.set_section_layer_weight(v(0, 0), 1, value, true),
                Err(TerrainError::NotFinite(_))
            ));
        }
        assert!(matches!(
            f.store.add_point_height(v(3, 3), f32::NAN),
            Err(TerrainError::NotFinite(_))
        ));

        assert_eq!(f.store.point_height(v(3, 3)).unwrap(), 0.0);
        assert!(!f.store.section(v(0, 0)).unwrap().is_changed());
        assert!(f.callbacks.take().is_empty());

        // Sections stay readable after a round trip through the archive.
        f.store.unload_all_sections();
        f.store.load_all_sections().unwrap();
        assert_eq!(f.store.point_height(v(3, 3)).unwrap(), 0.0);
    }

    #[test]
    fn test_coordinates_outside_of_range_are_rejected() {
        let mut f = fixture();
        let limit = f.store.parameters().max_section_coordinate();

        let result = SectionStoreBuilder::new()
            .with_parameters(test_parameters())
            .with_bounds(v(200_000_000, 0), v(200_000_000, 0))
            .build();
        assert!(matches!(result, Err(TerrainError::InvalidGridBounds { .. })));

        let mut far = SectionStoreBuilder::new()
            .with_parameters(test_parameters())
            .with_bounds(v(limit, -limit), v(limit, -limit))
            .build()
            .unwrap();
        far.create_section(v(limit, -limit)).unwrap();
        far.set_section_point_height(v(limit, -limit), o(16, 16), 3.0)
            .unwrap();
        assert_eq!(
            far.section_point_height(v(limit, -limit), o(16, 16)).unwrap(),
            3.0
        );
        assert!(matches!(
            far.create_section(v(limit + 1, -limit)),
            Err(TerrainError::InvalidGridBounds { .. })
        ));
        assert!(!far.is_available(v(limit + 1, -limit)));

        // The grid may not grow past the cell limit.
        assert!(matches!(
            f.store.create_section(v(limit, limit)),
            Err(TerrainError::InvalidGridBounds { .. })
        ));
        assert!(matches!(
            f.store.resize_grid(v(-5000, -5000), v(5000, 5000)),
            Err(TerrainError::InvalidGridBounds { .. })
        ));
        assert_eq!(f.store.bounds(), (v(0, 0), v(0, 0)));

        for point in [v(i32::MIN, i32::MIN), v(i32::MAX, i32::MAX), v(i32::MIN, 0)] {
            assert!(matches!(
                f.store.set_point_height(point, 1.0),
                Err(TerrainError::SectionUnavailable(_))
            ));
            assert!(f.store.point_height(point).is_err());
        }
        f.store
            .ensure_adjacent_sections_loaded(v(i32::MAX, i32::MIN))
            .unwrap();
    }

    #[test]
    fn test_borders_stay_consistent_with_paging() {
        let mut f = fixture();
        for y in 0..3 {
            for x in 0..3 {
                f.store.create_section(v(x, y)).unwrap();
            }
        }

        let mut seed = 0x0bad_cafeu32;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 8
        };

        for _ in 0..1500 {
            let pick = |n: u32| -> i32 {
                if n % 3 == 0 {
                    ((n / 3) % 4 * 16) as i32
                } else {
                    (n % 52) as i32 - 2
                }
            };
            let point = v(pick(next()), pick(next()));
            let coord = v((next() % 3) as i32, (next() % 3) as i32);
            match next() % 8 {
                0 | 1 => {
                    let _ = f.store.set_point_height(point, (next() % 1000) as f32);
                }
                2 => {
                    let _ = f.store.set_point_layer_weight(
                        point,
                        (next() % 3) as usize,
                        (next() % 100) as f32 / 100.0,
                        true,
                    );
                }
                3 | 4 => {
                    if f.store.is_loaded(coord) {
                        f.store.save_section(coord).unwrap();
                        f.store.unload_section(coord).unwrap();
                    }
                }
                5 => {
                    if f.store.is_available(coord) {
                        f.store.delete_section(coord).unwrap();
                    }
                }
                6 => {
                    if !f.store.is_available(coord) {
                        f.store.create_section(coord).unwrap();
                    }
                }
                _ => {
                    let _ = f.store.load_section(coord);
                }
            }
            assert_borders_consistent(&f.store);
        }

        f.store.load_all_sections().unwrap();
        assert_borders_consistent(&f.store);
    }

    #[test]
    fn test_raycast() {
        let mut f = pair();

        let down = Ray::from_two_points(
            Vector3::new(20.25, 100.0, 3.5),
            Vector3::new(20.25, -100.0, 3.5),
        );
        let hit = f.store.raycast(&down).unwrap();
        assert_eq!(hit.section, v(1, 0));
        assert_eq!(hit.cell, o(4, 3));
        assert!((hit.position - Vector3::new(20.25, 0.0, 3.5)).norm() < EPS);
        assert!((hit.normal - Vector3::y()).norm() < EPS);
        assert!((hit.toi - 0.5).abs() < EPS);

        // Two ridges across the ray path, the closest one wins.
        for y in 0..=16 {
            f.store.set_point_height(v(10, y), 10.0).unwrap();
            f.store.set_point_height(v(20, y), 10.0).unwrap();
        }
        let ray = Ray::from_two_points(
            Vector3::new(-1.0, 5.0, 3.25),
            Vector3::new(40.0, 5.0, 3.25),
        );
        let hit = f.store.raycast(&ray).unwrap();
        assert_eq!(hit.section, v(0, 0));
        assert!((hit.position - Vector3::new(9.5, 5.0, 3.25)).norm() < 1.0e-3);
        assert!((hit.toi - 10.5 / 41.0).abs() < 1.0e-3);
        assert!(hit.normal.y > 0.0);

        // Ray that misses everything.
        let miss = Ray::from_two_points(
            Vector3::new(100.0, 50.0, 100.0),
            Vector3::new(100.0, -50.0, 100.0),
        );
        assert!(f.store.raycast(&miss).is_none());

        // Unloaded sections are ignored.
        f.store.save_all_sections().unwrap();
        f.store.unload_section(v(1, 0)).unwrap();
        assert!(f.store.raycast(&down).is_none());
    }

    #[test]
    fn test_import_heightmap() {
        let mut f = fixture();
        f.store.create_section(v(5, 5)).unwrap();

        let mut pixels = vec![0u8; 32 * 32];
        pixels[0] = 255;
        pixels[32 * 32 - 1] = 51;
        let image = HeightImage::from_luma8(32, 32, pixels).unwrap();
        let options = HeightmapImportOptions {
            origin: v(0, 0),
            min_height: 0.0,
            max_height: 100.0,
            span: HeightmapSpan::OnePointPerPixel,
        };
        f.store.import_heightmap(&image, &options).unwrap();

        assert_eq!(
            f.store.available_sections(),
            vec![v(0, 0), v(1, 0), v(0, 1), v(1, 1)]
        );
        assert_eq!(f.store.deleted_sections(), &[v(5, 5)]);

        // Top left pixel lands in the top left corner of the northmost sections.
        assert!((f.store.point_height(v(0, 31)).unwrap() - 100.0).abs() < EPS);
        assert!((f.store.point_height(v(31, 0)).unwrap() - 20.0).abs() < EPS);
        assert_eq!(f.store.point_height(v(0, 0)).unwrap(), 0.0);
        assert!(f
            .store
            .loaded_sections()
            .iter()
            .all(|c| f.store.section(*c).unwrap().is_quad_tree_valid()));
        assert_borders_consistent(&f.store);

        let state = f.progress.state.lock().clone();
        assert_eq!(state.status, "Importing heightmap");
        assert_eq!(state.value, 32);
    }

    #[test]
    fn test_import_heightmap_spanning_sections() {
        let mut f = fixture();
        let image = HeightImage::from_luma8(4, 4, vec![255; 16]).unwrap();
        let options = HeightmapImportOptions {
            origin: v(-1, 2),
            span: HeightmapSpan::Sections { x: 1, y: 1 },
            ..Default::default()
        };
        f.store.import_heightmap(&image, &options).unwrap();

        assert_eq!(f.store.available_sections(), vec![v(-1, 2)]);
        for offset in [o(0, 0), o(8, 8), o(16, 16), o(16, 0)] {
            let height = f.store.section_point_height(v(-1, 2), offset).unwrap();
            assert!((height - 100.0).abs() < EPS);
        }

        let options = HeightmapImportOptions {
            span: HeightmapSpan::Sections { x: 0, y: 1 },
            ..Default::default()
        };
        assert!(f.store.import_heightmap(&image, &options).is_err());
    }

    #[test]
    fn test_import_heightmap_with_invalid_samples() {
        let mut f = fixture_with(TerrainParameters {
            base_height: 7,
            ..test_parameters()
        });
        f.store.create_section(v(0, 0)).unwrap();

        let mut pixels = vec![0.5f32; 16];
        pixels[0] = f32::NAN;
        let image = HeightImage::from_f32(4, 4, pixels).unwrap();

        // Placement past the coordinate range fails before anything is deleted.
        let limit = f.store.parameters().max_section_coordinate();
        let options = HeightmapImportOptions {
            origin: v(limit, 0),
            span: HeightmapSpan::Sections { x: 2, y: 1 },
            ..Default::default()
        };
        assert!(matches!(
            f.store.import_heightmap(&image, &options),
            Err(TerrainError::InvalidParameters(_))
        ));
        let options = HeightmapImportOptions {
            min_height: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            f.store.import_heightmap(&image, &options),
            Err(TerrainError::InvalidParameters(_))
        ));
        assert!(f.store.is_loaded(v(0, 0)));

        f.store
            .import_heightmap(&image, &HeightmapImportOptions::default())
            .unwrap();
        // Top left pixel of the image lands on the top row of the section.
        assert_eq!(f.store.point_height(v(0, 15)).unwrap(), 7.0);
        assert!((f.store.point_height(v(1, 15)).unwrap() - 50.0).abs() < EPS);
        assert!((f.store.point_height(v(3, 12)).unwrap() - 50.0).abs() < EPS);

        f.store.save_all_sections().unwrap();
        f.store.unload_all_sections();
        f.store.load_all_sections().unwrap();
        assert_eq!(f.store.point_height(v(0, 15)).unwrap(), 7.0);
    }
}
