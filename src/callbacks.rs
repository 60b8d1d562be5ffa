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

//! Observers of the section store. Both traits have no-op default methods, implement only what
//! is needed.

use crate::core::algebra::Vector2;

/// Notifications about changes made to the store. Notifications are fire-and-forget, they are
/// sent after the change and its border propagation are complete.
#[allow(unused_variables)]
pub trait TerrainEditCallbacks {
    fn on_section_created(&mut self, section: Vector2<i32>) {}

    fn on_section_loaded(&mut self, section: Vector2<i32>) {}

    /// Sent right before the section is released.
    fn on_section_unloaded(&mut self, section: Vector2<i32>) {}

    fn on_section_deleted(&mut self, section: Vector2<i32>) {}

    /// Height of the point at `offset` of `section` has changed.
    fn on_section_point_height_modified(&mut self, section: Vector2<i32>, offset: Vector2<u32>) {}

    /// Layer weights of the point at `offset` of `section` have changed.
    fn on_section_point_layers_modified(&mut self, section: Vector2<i32>, offset: Vector2<u32>) {}

    /// A layer appeared in the section for the first time. `layers` is a bit mask of the new
    /// layers.
    fn on_section_layers_modified(&mut self, section: Vector2<i32>, layers: u32) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoEditCallbacks;

impl TerrainEditCallbacks for NoEditCallbacks {}

/// Receives progress of long operations (loading every section, heightmap import).
#[allow(unused_variables)]
pub trait ProgressReporter {
    fn set_range(&mut self, min: u32, max: u32) {}

    fn set_value(&mut self, value: u32) {}

    fn set_status(&mut self, status: &str) {}

    fn set_cancellable(&mut self, cancellable: bool) {}
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}
