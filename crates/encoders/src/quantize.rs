//! 256-colour quantisation with optional error-diffusion dithering.

use color_quant::NeuQuant;
use glimpse_media_model::{VideoFrame, BYTES_PER_PIXEL};
use serde::{Deserialize, Serialize};

/// Error-diffusion kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DitherKernel {
    FloydSteinberg,
    FalseFloydSteinberg,
    Stucki,
    Atkinson,
}

impl DitherKernel {
    pub const ALL: [DitherKernel; 4] = [
        Self::FloydSteinberg,
        Self::FalseFloydSteinberg,
        Self::Stucki,
        Self::Atkinson,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FloydSteinberg => "FloydSteinberg",
            Self::FalseFloydSteinberg => "FalseFloydSteinberg",
            Self::Stucki => "Stucki",
            Self::Atkinson => "Atkinson",
        }
    }

    /// `(weight, dx, dy)` taps, `dx` relative to the scan direction.
    fn taps(self) -> &'static [(f32, i32, i32)] {
        match self {
            Self::FloydSteinberg => &[
                (7.0 / 16.0, 1, 0),
                (3.0 / 16.0, -1, 1),
                (5.0 / 16.0, 0, 1),
                (1.0 / 16.0, 1, 1),
            ],
            Self::FalseFloydSteinberg => &[(3.0 / 8.0, 1, 0), (3.0 / 8.0, 0, 1), (2.0 / 8.0, 1, 1)],
            Self::Stucki => &[
                (8.0 / 42.0, 1, 0),
                (4.0 / 42.0, 2, 0),
                (2.0 / 42.0, -2, 1),
                (4.0 / 42.0, -1, 1),
                (8.0 / 42.0, 0, 1),
                (4.0 / 42.0, 1, 1),
                (2.0 / 42.0, 2, 1),
                (1.0 / 42.0, -2, 2),
                (2.0 / 42.0, -1, 2),
                (4.0 / 42.0, 0, 2),
                (2.0 / 42.0, 1, 2),
                (1.0 / 42.0, 2, 2),
            ],
            Self::Atkinson => &[
                (1.0 / 8.0, 1, 0),
                (1.0 / 8.0, 2, 0),
                (1.0 / 8.0, -1, 1),
                (1.0 / 8.0, 0, 1),
                (1.0 / 8.0, 1, 1),
                (1.0 / 8.0, 0, 2),
            ],
        }
    }
}

/// Dithering mode of the palette encoder.
///
/// `None` is distinct from every kernel: pixels map straight to their
/// nearest palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dithering {
    #[default]
    None,
    Diffuse {
        kernel: DitherKernel,
        /// Alternate scan direction per row.
        serpentine: bool,
    },
}

impl Dithering {
    /// Parse `none`/`false`, a kernel name, or `<kernel>-serpentine`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty()
            || value.eq_ignore_ascii_case("none")
            || value.eq_ignore_ascii_case("false")
        {
            return Some(Self::None);
        }

        let (name, serpentine) = match value.rsplit_once('-') {
            Some((name, suffix)) if suffix.eq_ignore_ascii_case("serpentine") => (name, true),
            _ => (value, false),
        };
        DitherKernel::ALL
            .into_iter()
            .find(|kernel| kernel.name().eq_ignore_ascii_case(name))
            .map(|kernel| Self::Diffuse { kernel, serpentine })
    }

    pub fn name(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Diffuse {
                kernel,
                serpentine: false,
            } => kernel.name().to_string(),
            Self::Diffuse {
                kernel,
                serpentine: true,
            } => format!("{}-serpentine", kernel.name()),
        }
    }
}

/// A frame reduced to palette indices.
#[derive(Debug, Clone)]
pub struct QuantizedFrame {
    pub width: u16,
    pub height: u16,
    /// RGB triples, 256 entries.
    pub palette: Vec<u8>,
    pub indices: Vec<u8>,
}

/// Quantise the top-left `max_width` x `max_height` region of `frame`.
///
/// `quality` is the NeuQuant sample factor: 1 samples every pixel, 30 is
/// the fastest.
pub fn quantize(
    frame: &VideoFrame,
    max_width: u16,
    max_height: u16,
    quality: u8,
    dithering: Dithering,
) -> QuantizedFrame {
    let width = frame.width().min(max_width as u32).max(1) as u16;
    let height = frame.height().min(max_height as u32).max(1) as u16;
    let rgba = crop_opaque(frame, width, height);

    let quant = NeuQuant::new(quality.clamp(1, 30) as i32, 256, &rgba);
    let palette = quant.color_map_rgb();

    let indices = match dithering {
        Dithering::None => rgba
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| quant.index_of(px) as u8)
            .collect(),
        Dithering::Diffuse { kernel, serpentine } => {
            diffuse(&rgba, width as usize, height as usize, &quant, &palette, kernel, serpentine)
        }
    };

    QuantizedFrame {
        width,
        height,
        palette,
        indices,
    }
}

/// Copy the region out with alpha forced opaque. Frames smaller than the
/// region are padded with black.
fn crop_opaque(frame: &VideoFrame, width: u16, height: u16) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    let mut rgba = vec![0u8; width * height * BYTES_PER_PIXEL];
    let cols = width.min(frame.width() as usize) * BYTES_PER_PIXEL;
    for y in 0..height.min(frame.height() as usize) {
        let dst = y * width * BYTES_PER_PIXEL;
        rgba[dst..dst + cols].copy_from_slice(&frame.row(y as u32)[..cols]);
    }
    for px in rgba.chunks_exact_mut(BYTES_PER_PIXEL) {
        px[3] = 255;
    }
    rgba
}

fn diffuse(
    rgba: &[u8],
    width: usize,
    height: usize,
    quant: &NeuQuant,
    palette: &[u8],
    kernel: DitherKernel,
    serpentine: bool,
) -> Vec<u8> {
    let mut work: Vec<f32> = rgba
        .chunks_exact(BYTES_PER_PIXEL)
        .flat_map(|px| [px[0] as f32, px[1] as f32, px[2] as f32])
        .collect();
    let mut indices = vec![0u8; width * height];

    for y in 0..height {
        let reverse = serpentine && y % 2 == 1;
        for step in 0..width {
            let x = if reverse { width - 1 - step } else { step };
            let at = (y * width + x) * 3;

            let pixel = [
                work[at].round().clamp(0.0, 255.0) as u8,
                work[at + 1].round().clamp(0.0, 255.0) as u8,
                work[at + 2].round().clamp(0.0, 255.0) as u8,
                255,
            ];
            let index = quant.index_of(&pixel);
            indices[y * width + x] = index as u8;

            let chosen = &palette[index * 3..index * 3 + 3];
            let error = [
                work[at] - chosen[0] as f32,
                work[at + 1] - chosen[1] as f32,
                work[at + 2] - chosen[2] as f32,
            ];

            for &(weight, dx, dy) in kernel.taps() {
                let dx = if reverse { -dx } else { dx };
                let nx = x as i64 + dx as i64;
                let ny = y as i64 + dy as i64;
                if nx < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let to = (ny as usize * width + nx as usize) * 3;
                for c in 0..3 {
                    work[to + c] += error[c] * weight;
                }
            }
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128, 255]);
            }
        }
        VideoFrame::new(width, height, 0, data).unwrap()
    }

    #[test]
    fn dithering_names_parse() {
        assert_eq!(Dithering::parse("none"), Some(Dithering::None));
        assert_eq!(Dithering::parse("false"), Some(Dithering::None));
        assert_eq!(
            Dithering::parse("Atkinson-serpentine"),
            Some(Dithering::Diffuse {
                kernel: DitherKernel::Atkinson,
                serpentine: true
            })
        );
        assert_eq!(
            Dithering::parse("floydsteinberg"),
            Some(Dithering::Diffuse {
                kernel: DitherKernel::FloydSteinberg,
                serpentine: false
            })
        );
        assert_eq!(Dithering::parse("Bayer"), None);
    }

    #[test]
    fn dithering_name_round_trips_through_parse() {
        let mode = Dithering::Diffuse {
            kernel: DitherKernel::Stucki,
            serpentine: true,
        };
        assert_eq!(Dithering::parse(&mode.name()), Some(mode));
    }

    #[test]
    fn quantized_frame_has_full_palette_and_index_per_pixel() {
        let frame = gradient(16, 8);
        let out = quantize(&frame, 16, 8, 10, Dithering::None);
        assert_eq!((out.width, out.height), (16, 8));
        assert_eq!(out.palette.len(), 256 * 3);
        assert_eq!(out.indices.len(), 16 * 8);
    }

    #[test]
    fn larger_frames_are_cropped_to_the_screen() {
        let frame = gradient(20, 10);
        let dithered = Dithering::Diffuse {
            kernel: DitherKernel::FloydSteinberg,
            serpentine: true,
        };
        let out = quantize(&frame, 12, 6, 10, dithered);
        assert_eq!((out.width, out.height), (12, 6));
        assert_eq!(out.indices.len(), 72);
    }

    #[test]
    fn solid_frame_maps_to_matching_colour() {
        let frame = VideoFrame::solid(4, 4, 0, [200, 10, 10, 255]);
        let out = quantize(&frame, 4, 4, 1, Dithering::None);
        let index = out.indices[0] as usize;
        let colour = &out.palette[index * 3..index * 3 + 3];
        assert!(colour[0] > 150 && colour[1] < 80 && colour[2] < 80);
        assert!(out.indices.iter().all(|i| *i as usize == index));
    }
}
