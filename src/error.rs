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

//! Errors that may occur while working with the terrain section store.

use crate::core::algebra::Vector2;
use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Every fallible operation of the section store returns this error.
#[derive(Debug)]
pub enum TerrainError {
    /// An [std::io::Error] occurred while reading or writing an archive entry.
    Io(std::io::Error),
    /// Binary encoding or decoding of a section failed.
    Encoding(bincode::Error),
    /// Reading or writing of a RON document (parameters or store manifest) failed.
    Config(String),
    /// Heightmap image could not be read or decoded.
    Image(image::ImageError),
    /// Terrain parameters are malformed. The message describes the violated rule.
    InvalidParameters(String),
    /// The section does not exist in the level.
    SectionUnavailable(Vector2<i32>),
    /// Attempt to create a section that already exists.
    SectionAlreadyExists(Vector2<i32>),
    /// The section exists but is not resident in memory.
    SectionNotLoaded(Vector2<i32>),
    /// Section-local point offset is outside of `[0; section_size]` range.
    OffsetOutOfRange {
        /// Offending offset.
        offset: Vector2<u32>,
        /// Section size of the store.
        section_size: u32,
    },
    /// Height or weight is NaN or infinite.
    NotFinite(f32),
    /// The layer index does not refer to an allocated slot of the layer palette.
    LayerNotAllocated(usize),
    /// Every slot of the layer palette is taken.
    LayerPaletteFull,
    /// Requested grid bounds would shrink the grid or are inverted.
    InvalidGridBounds {
        /// Requested minimal section coordinate.
        min: Vector2<i32>,
        /// Requested maximal section coordinate.
        max: Vector2<i32>,
    },
    /// Persisted section data does not match the expectations of the store.
    CorruptSection {
        /// Coordinate of the section that was being loaded.
        section: Vector2<i32>,
        /// What exactly is wrong with the data.
        reason: String,
    },
    /// One of the sections adjacent to `section` failed to load.
    NeighborLoadFailed {
        /// The section whose neighborhood was being loaded.
        section: Vector2<i32>,
        /// The error of the neighbor that failed.
        source: Box<TerrainError>,
    },
    /// Batch operation failed for more than one section.
    Multiple(Vec<TerrainError>),
}

impl TerrainError {
    /// Merges a list of errors into one, returns `None` for an empty list.
    pub fn from_many(mut errors: Vec<TerrainError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl Error for TerrainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encoding(e) => Some(e),
            Self::Image(e) => Some(e),
            Self::NeighborLoadFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl Display for TerrainError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::Io(io) => write!(f, "io error: {io}"),
            Self::Encoding(e) => write!(f, "section encoding error: {e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Image(e) => write!(f, "heightmap image error: {e}"),
            Self::InvalidParameters(msg) => write!(f, "invalid terrain parameters: {msg}"),
            Self::SectionUnavailable(s) => {
                write!(f, "section ({}; {}) is not available", s.x, s.y)
            }
            Self::SectionAlreadyExists(s) => {
                write!(f, "section ({}; {}) already exists", s.x, s.y)
            }
            Self::SectionNotLoaded(s) => write!(f, "section ({}; {}) is not loaded", s.x, s.y),
            Self::OffsetOutOfRange {
                offset,
                section_size,
            } => write!(
                f,
                "point offset ({}; {}) is out of [0; {section_size}] range",
                offset.x, offset.y
            ),
            Self::NotFinite(value) => write!(f, "value {value} is not finite"),
            Self::LayerNotAllocated(index) => write!(f, "layer {index} is not allocated"),
            Self::LayerPaletteFull => write!(f, "layer palette is full"),
            Self::InvalidGridBounds { min, max } => write!(
                f,
                "invalid grid bounds ({}; {}) - ({}; {}), the grid can only grow",
                min.x, min.y, max.x, max.y
            ),
            Self::CorruptSection { section, reason } => write!(
                f,
                "section ({}; {}) data is corrupt: {reason}",
                section.x, section.y
            ),
            Self::NeighborLoadFailed { section, source } => write!(
                f,
                "unable to load neighbors of section ({}; {}): {source}",
                section.x, section.y
            ),
            Self::Multiple(errors) => {
                write!(f, "multiple errors:[")?;
                for err in errors {
                    write!(f, "{err};")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<std::io::Error> for TerrainError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<bincode::Error> for TerrainError {
    fn from(e: bincode::Error) -> Self {
        Self::Encoding(e)
    }
}

impl From<ron::Error> for TerrainError {
    fn from(e: ron::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ron::error::SpannedError> for TerrainError {
    fn from(e: ron::error::SpannedError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<image::ImageError> for TerrainError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}
