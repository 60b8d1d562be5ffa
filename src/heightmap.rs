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

//! Bulk import of heights from an image.

use crate::{
    core::{algebra::Vector2, info},
    error::TerrainError,
    store::{SectionStore, MAX_GRID_SECTIONS},
};
use image::{imageops::FilterType, ColorType, DynamicImage, ImageBuffer, Luma, Pixel};
use std::{borrow::Cow, path::Path};

/// Single channel height image. Integer pixels are normalized to `[0; 1]` range, float pixels are
/// expected to be normalized already and are clamped.
#[derive(Debug, Clone, PartialEq)]
pub enum HeightImage {
    Luma8 {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Luma16 {
        width: u32,
        height: u32,
        pixels: Vec<u16>,
    },
    Float32 {
        width: u32,
        height: u32,
        pixels: Vec<f32>,
    },
}

fn check_len(width: u32, height: u32, len: usize) -> Result<(), TerrainError> {
    if width as usize * height as usize == len {
        Ok(())
    } else {
        Err(TerrainError::InvalidParameters(format!(
            "heightmap of {width}x{height} pixels can't hold {len} values"
        )))
    }
}

fn resize_pixels<P>(
    width: u32,
    height: u32,
    pixels: &[P::Subpixel],
    new_width: u32,
    new_height: u32,
) -> Result<Vec<P::Subpixel>, TerrainError>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let image = ImageBuffer::<P, Vec<P::Subpixel>>::from_vec(width, height, pixels.to_vec())
        .ok_or_else(|| {
            TerrainError::InvalidParameters("heightmap size does not match its data".to_string())
        })?;
    Ok(image::imageops::resize(&image, new_width, new_height, FilterType::Triangle).into_raw())
}

impl HeightImage {
    pub fn from_luma8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, TerrainError> {
        check_len(width, height, pixels.len())?;
        Ok(Self::Luma8 {
            width,
            height,
            pixels,
        })
    }

    pub fn from_luma16(width: u32, height: u32, pixels: Vec<u16>) -> Result<Self, TerrainError> {
        check_len(width, height, pixels.len())?;
        Ok(Self::Luma16 {
            width,
            height,
            pixels,
        })
    }

    pub fn from_f32(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self, TerrainError> {
        check_len(width, height, pixels.len())?;
        Ok(Self::Float32 {
            width,
            height,
            pixels,
        })
    }

    /// Converts a decoded image into a height image. Color images are converted to luminance,
    /// the bit depth of the source is preserved.
    pub fn from_dynamic_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image.color() {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => Self::Luma8 {
                width,
                height,
                pixels: image.into_luma8().into_raw(),
            },
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                Self::Luma16 {
                    width,
                    height,
                    pixels: image.into_luma16().into_raw(),
                }
            }
            _ => Self::Float32 {
                width,
                height,
                pixels: image.to_luma32f().into_raw(),
            },
        }
    }

    /// Loads and decodes an image file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        Ok(Self::from_dynamic_image(image::open(path)?))
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Luma8 { width, .. } | Self::Luma16 { width, .. } | Self::Float32 { width, .. } => {
                *width
            }
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Luma8 { height, .. }
            | Self::Luma16 { height, .. }
            | Self::Float32 { height, .. } => *height,
        }
    }

    /// Normalized value of the pixel, `(0; 0)` is the top left corner of the image. NaN samples of
    /// float images are returned as is.
    pub fn value(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let i = y as usize * self.width() as usize + x as usize;
        match self {
            Self::Luma8 { pixels, .. } => pixels.get(i).map(|v| *v as f32 / u8::MAX as f32),
            Self::Luma16 { pixels, .. } => pixels.get(i).map(|v| *v as f32 / u16::MAX as f32),
            Self::Float32 { pixels, .. } => pixels.get(i).map(|v| v.clamp(0.0, 1.0)),
        }
    }

    /// Resamples the image with a triangle filter.
    pub fn resized(&self, new_width: u32, new_height: u32) -> Result<Self, TerrainError> {
        Ok(match self {
            Self::Luma8 {
                width,
                height,
                pixels,
            } => Self::Luma8 {
                width: new_width,
                height: new_height,
                pixels: resize_pixels::<Luma<u8>>(*width, *height, pixels, new_width, new_height)?,
            },
            Self::Luma16 {
                width,
                height,
                pixels,
            } => Self::Luma16 {
                width: new_width,
                height: new_height,
                pixels: resize_pixels::<Luma<u16>>(*width, *height, pixels, new_width, new_height)?,
            },
            Self::Float32 {
                width,
                height,
                pixels,
            } => Self::Float32 {
                width: new_width,
                height: new_height,
                pixels: resize_pixels::<Luma<f32>>(*width, *height, pixels, new_width, new_height)?,
            },
        })
    }
}

/// Defines how many sections the heightmap covers.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum HeightmapSpan {
    /// Every pixel is a point, the image covers as many sections as needed to fit it.
    #[default]
    OnePointPerPixel,
    /// The image is resampled to exactly cover the given amount of sections, including the far
    /// border points.
    Sections { x: u32, y: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeightmapImportOptions {
    /// Section that receives the bottom left corner of the image.
    pub origin: Vector2<i32>,
    /// Height of black pixels.
    pub min_height: f32,
    /// Height of white pixels.
    pub max_height: f32,
    pub span: HeightmapSpan,
}

impl Default for HeightmapImportOptions {
    fn default() -> Self {
        Self {
            origin: Vector2::new(0, 0),
            min_height: 0.0,
            max_height: 100.0,
            span: Default::default(),
        }
    }
}

impl SectionStore {
    /// Replaces the terrain with the heightmap. Every loaded section is deleted first, then
    /// sections covered by the image are created (or loaded, if they exist) and each pixel is
    /// written as a point height. The top row of the image ends up in the northmost row of
    /// sections.
    pub fn import_heightmap(
        &mut self,
        image: &HeightImage,
        options: &HeightmapImportOptions,
    ) -> Result<(), TerrainError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TerrainError::InvalidParameters(
                "heightmap is empty".to_string(),
            ));
        }
        if !options.min_height.is_finite() || !options.max_height.is_finite() {
            return Err(TerrainError::InvalidParameters(format!(
                "heightmap height range [{}; {}] is not finite",
                options.min_height, options.max_height
            )));
        }

        let size = self.parameters().section_size;
        let sections = match options.span {
            HeightmapSpan::OnePointPerPixel => {
                Vector2::new(image.width().div_ceil(size), image.height().div_ceil(size))
            }
            HeightmapSpan::Sections { x, y } => {
                if x == 0 || y == 0 {
                    return Err(TerrainError::InvalidParameters(
                        "heightmap must span at least one section".to_string(),
                    ));
                }
                Vector2::new(x, y)
            }
        };

        let limit = self.parameters().max_section_coordinate() as i64;
        let last = Vector2::new(
            options.origin.x as i64 + sections.x as i64 - 1,
            options.origin.y as i64 + sections.y as i64 - 1,
        );
        if !self.parameters().is_section_in_range(options.origin)
            || last.x > limit
            || last.y > limit
            || sections.x as u64 * sections.y as u64 > MAX_GRID_SECTIONS as u64
        {
            return Err(TerrainError::InvalidParameters(format!(
                "heightmap placed at section ({}; {}) does not fit into the coordinate range",
                options.origin.x, options.origin.y
            )));
        }

        let image = match options.span {
            HeightmapSpan::OnePointPerPixel => Cow::Borrowed(image),
            HeightmapSpan::Sections { x, y } => {
                let points = |sections: u32| sections.checked_mul(size)?.checked_add(1);
                let (Some(width), Some(height)) = (points(x), points(y)) else {
                    return Err(TerrainError::InvalidParameters(
                        "heightmap span is too large".to_string(),
                    ));
                };
                Cow::Owned(image.resized(width, height)?)
            }
        };

        let loaded = self.loaded_sections().to_vec();
        self.delete_sections(&loaded)?;

        let mut coords = Vec::new();
        for j in 0..sections.y as i32 {
            for i in 0..sections.x as i32 {
                let coord = options.origin + Vector2::new(i, j);
                if self.is_available(coord) {
                    self.load_section(coord)?;
                } else {
                    self.create_section(coord)?;
                }
                coords.push(coord);
            }
        }

        let rows = image.height();
        // Fits into `i32` only once added to the origin.
        let top = (sections.y as i64 * size as i64).max(rows as i64) - 1;
        let origin = self
            .parameters()
            .point_for_section_and_offset(options.origin, Vector2::new(0, 0));
        let range = options.max_height - options.min_height;
        let base_height = self.parameters().base_height as f32;

        let progress = self.progress_mut();
        progress.set_cancellable(false);
        progress.set_status("Importing heightmap");
        progress.set_range(0, rows);

        for py in 0..rows {
            for px in 0..image.width() {
                if let Some(value) = image.value(px, py) {
                    let point = Vector2::new(
                        origin.x + px as i32,
                        (origin.y as i64 + top - py as i64) as i32,
                    );
                    // Float images may carry NaN for missing samples.
                    let height = if value.is_nan() {
                        base_height
                    } else {
                        options.min_height + value * range
                    };
                    self.set_point_height(point, height)?;
                }
            }
            self.progress_mut().set_value(py + 1);
        }

        for coord in coords.iter() {
            if let Some(section) = self.section(*coord) {
                section.update_quad_tree();
            }
        }

        info!(
            "Imported {}x{} heightmap into {} sections.",
            image.width(),
            rows,
            coords.len()
        );

        Ok(())
    }
}
