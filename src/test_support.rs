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

//! Shared fixtures of the unit tests.

use crate::{
    archive::MemoryArchive,
    callbacks::{ProgressReporter, TerrainEditCallbacks},
    core::{algebra::Vector2, parking_lot::Mutex},
    layers::TerrainLayers,
    params::TerrainParameters,
    store::{SectionStore, SectionStoreBuilder},
};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Recorded {
    Created(Vector2<i32>),
    Loaded(Vector2<i32>),
    Unloaded(Vector2<i32>),
    Deleted(Vector2<i32>),
    Height(Vector2<i32>, Vector2<u32>),
    Layers(Vector2<i32>, Vector2<u32>),
    SectionLayers(Vector2<i32>, u32),
}

/// Callbacks that record every notification. Clones share the same record.
#[derive(Debug, Default, Clone)]
pub struct RecordingCallbacks {
    pub events: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingCallbacks {
    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl TerrainEditCallbacks for RecordingCallbacks {
    fn on_section_created(&mut self, section: Vector2<i32>) {
        self.events.lock().push(Recorded::Created(section));
    }

    fn on_section_loaded(&mut self, section: Vector2<i32>) {
        self.events.lock().push(Recorded::Loaded(section));
    }

    fn on_section_unloaded(&mut self, section: Vector2<i32>) {
        self.events.lock().push(Recorded::Unloaded(section));
    }

    fn on_section_deleted(&mut self, section: Vector2<i32>) {
        self.events.lock().push(Recorded::Deleted(section));
    }

    fn on_section_point_height_modified(&mut self, section: Vector2<i32>, offset: Vector2<u32>) {
        self.events.lock().push(Recorded::Height(section, offset));
    }

    fn on_section_point_layers_modified(&mut self, section: Vector2<i32>, offset: Vector2<u32>) {
        self.events.lock().push(Recorded::Layers(section, offset));
    }

    fn on_section_layers_modified(&mut self, section: Vector2<i32>, layers: u32) {
        self.events.lock().push(Recorded::SectionLayers(section, layers));
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProgressState {
    pub range: (u32, u32),
    pub value: u32,
    pub status: String,
    pub cancellable: Option<bool>,
}

/// Progress reporter that remembers the last reported state.
#[derive(Debug, Default, Clone)]
pub struct RecordingProgress {
    pub state: Arc<Mutex<ProgressState>>,
}

impl ProgressReporter for RecordingProgress {
    fn set_range(&mut self, min: u32, max: u32) {
        self.state.lock().range = (min, max);
    }

    fn set_value(&mut self, value: u32) {
        self.state.lock().value = value;
    }

    fn set_status(&mut self, status: &str) {
        self.state.lock().status = status.to_owned();
    }

    fn set_cancellable(&mut self, cancellable: bool) {
        self.state.lock().cancellable = Some(cancellable);
    }
}

/// Section size 16, scale 1, base height 0, heights in `[0; 1000]`.
pub fn test_parameters() -> TerrainParameters {
    TerrainParameters {
        section_size: 16,
        scale: 1,
        base_height: 0,
        min_height: 0,
        max_height: 1000,
        ..Default::default()
    }
}

/// Palette with layers "base", "grass" and "rock" at slots 0, 1 and 2.
pub fn test_layers() -> TerrainLayers {
    let mut layers = TerrainLayers::with_default_layer("base");
    let _ = layers.allocate("grass");
    let _ = layers.allocate("rock");
    layers
}

pub struct Fixture {
    pub store: SectionStore,
    pub archive: MemoryArchive,
    pub callbacks: RecordingCallbacks,
    pub progress: RecordingProgress,
}

pub fn fixture_with(params: TerrainParameters) -> Fixture {
    let archive = MemoryArchive::new();
    let callbacks = RecordingCallbacks::default();
    let progress = RecordingProgress::default();
    let store = SectionStoreBuilder::new()
        .with_parameters(params)
        .with_layers(test_layers())
        .with_archive(archive.clone())
        .with_callbacks(callbacks.clone())
        .with_progress(progress.clone())
        .build()
        .unwrap();
    Fixture {
        store,
        archive,
        callbacks,
        progress,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(test_parameters())
}

/// Panics if any pair of adjacent loaded sections disagree on a shared point.
pub fn assert_borders_consistent(store: &SectionStore) {
    let size = store.parameters().section_size;
    for coord in store.loaded_sections() {
        let Some(section) = store.section(*coord) else {
            continue;
        };
        for y in 0..=size {
            for x in 0..=size {
                if x != 0 && y != 0 && x != size && y != size {
                    continue;
                }
                let offset = Vector2::new(x, y);
                let point = store.parameters().point_for_section_and_offset(*coord, offset);
                for (other, other_offset) in crate::store::point_holders(store.parameters(), point)
                {
                    if let Some(other_section) = store.section(other) {
                        assert_eq!(
                            section.height(offset).unwrap(),
                            other_section.height(other_offset).unwrap(),
                            "height mismatch at {point:?} between {coord:?} and {other:?}"
                        );
                        assert_eq!(
                            section.point_layers(offset).unwrap(),
                            other_section.point_layers(other_offset).unwrap(),
                            "weights mismatch at {point:?} between {coord:?} and {other:?}"
                        );
                    }
                }
            }
        }
    }
}
