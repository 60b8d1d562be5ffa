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

//! Persistent representation of sections.
//!
//! The default format is a small header (magic + version) followed by a `bincode` body. The header
//! lets the store reject foreign or outdated data early with a readable error instead of a
//! decoding failure in the middle of the body.

use crate::{
    core::algebra::Vector2,
    error::TerrainError,
    layers::{PointLayers, MAX_LAYERS},
    params::{HeightFormat, TerrainParameters},
    section::Section,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    io::{Read, Write},
};

/// Name of the archive entry that holds the store manifest.
pub const MANIFEST_ENTRY: &str = "terrain.ron";

/// Deterministic name of the archive entry of a section.
pub fn storage_key(coord: Vector2<i32>) -> String {
    format!("section_{}_{}.sec", coord.x, coord.y)
}

/// Reads and writes single sections. Implementations must be able to read everything they write
/// with the same parameters.
pub trait SectionSerializer {
    fn load_section(
        &self,
        coord: Vector2<i32>,
        reader: &mut dyn Read,
        params: &TerrainParameters,
    ) -> Result<Section, TerrainError>;

    fn save_section(
        &self,
        section: &Section,
        writer: &mut dyn Write,
        params: &TerrainParameters,
    ) -> Result<(), TerrainError>;
}

#[derive(Serialize, Deserialize)]
enum HeightData<'a> {
    Float32(Cow<'a, [f32]>),
    Unorm16 { min: f32, max: f32, values: Vec<u16> },
}

impl<'a> HeightData<'a> {
    fn encode(heights: &'a [f32], params: &TerrainParameters) -> Self {
        match params.height_format {
            HeightFormat::Float32 => HeightData::Float32(Cow::Borrowed(heights)),
            HeightFormat::Unorm16 => {
                let min = params.min_height as f32;
                let max = params.max_height as f32;
                let range = max - min;
                let values = heights
                    .iter()
                    .map(|h| {
                        if range > 0.0 {
                            let k = ((h - min) / range).clamp(0.0, 1.0);
                            (k * u16::MAX as f32).round() as u16
                        } else {
                            0
                        }
                    })
                    .collect();
                HeightData::Unorm16 { min, max, values }
            }
        }
    }

    fn decode(self) -> Vec<f32> {
        match self {
            HeightData::Float32(heights) => heights.into_owned(),
            HeightData::Unorm16 { min, max, values } => values
                .into_iter()
                .map(|v| min + (v as f32 / u16::MAX as f32) * (max - min))
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SectionRecord<'a> {
    coord: [i32; 2],
    size: u32,
    heights: HeightData<'a>,
    layers: Cow<'a, [PointLayers]>,
}

/// Default serializer, see module docs.
#[derive(Debug, Default, Copy, Clone)]
pub struct BinarySectionSerializer;

impl BinarySectionSerializer {
    pub const MAGIC: [u8; 4] = *b"TSEC";
    pub const VERSION: u32 = 1;
}

fn corrupt(coord: Vector2<i32>, reason: String) -> TerrainError {
    TerrainError::CorruptSection {
        section: coord,
        reason,
    }
}

fn validate_layers(coord: Vector2<i32>, layers: &[PointLayers]) -> Result<(), TerrainError> {
    for point in layers {
        let mut previous = None;
        for w in point.iter() {
            if w.layer as usize >= MAX_LAYERS {
                return Err(corrupt(coord, format!("layer index {} is out of range", w.layer)));
            }
            if !(w.weight > 0.0 && w.weight <= 1.0) {
                return Err(corrupt(coord, format!("layer weight {} is out of range", w.weight)));
            }
            if previous.is_some_and(|p| p >= w.layer) {
                return Err(corrupt(coord, "layer weights are not sorted".to_string()));
            }
            previous = Some(w.layer);
        }
    }
    Ok(())
}

impl SectionSerializer for BinarySectionSerializer {
    fn load_section(
        &self,
        coord: Vector2<i32>,
        reader: &mut dyn Read,
        params: &TerrainParameters,
    ) -> Result<Section, TerrainError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(corrupt(coord, "not a terrain section".to_string()));
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version != Self::VERSION {
            return Err(corrupt(coord, format!("unsupported version {version}")));
        }

        let record: SectionRecord = bincode::deserialize_from(reader)?;
        if record.coord != [coord.x, coord.y] {
            return Err(corrupt(
                coord,
                format!(
                    "data belongs to section ({}; {})",
                    record.coord[0], record.coord[1]
                ),
            ));
        }
        if record.size != params.section_size {
            return Err(corrupt(
                coord,
                format!(
                    "section size {} does not match {}",
                    record.size, params.section_size
                ),
            ));
        }
        validate_layers(coord, &record.layers)?;

        Section::from_parts(
            coord,
            params,
            record.heights.decode(),
            record.layers.into_owned(),
        )
    }

    fn save_section(
        &self,
        section: &Section,
        writer: &mut dyn Write,
        params: &TerrainParameters,
    ) -> Result<(), TerrainError> {
        let coord = section.coord();
        let record = SectionRecord {
            coord: [coord.x, coord.y],
            size: section.size(),
            heights: HeightData::encode(section.heights(), params),
            layers: Cow::Borrowed(section.layers()),
        };

        let body = bincode::serialize(&record)?;
        writer.write_all(&Self::MAGIC)?;
        writer.write_u32::<LittleEndian>(Self::VERSION)?;
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }
}
