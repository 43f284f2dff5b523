//! Glyph atlas: the fixed character set rasterized once into a single
//! R8 coverage texture, with per-glyph UV rects and advance metrics.
//!
//! Characters outside the set render through a placeholder cell. When no
//! usable font file is available a procedural placeholder atlas keeps the
//! show running.

use std::collections::HashMap;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};

use crate::layout::GlyphMetrics;

/// Pixel size of one square atlas cell
const CELL_PX: u32 = 64;

/// Cells per atlas row
const COLS: u32 = 12;

/// Padding inside a cell (px), keeps bilinear sampling off neighbors
const PAD_PX: u32 = 4;

/// The fixed character set covered by the atlas (placeholder cell excluded)
pub fn charset() -> impl Iterator<Item = char> {
    ('A'..='Z')
        .chain('a'..='z')
        .chain('0'..='9')
        .chain("!?.,:;'\"-()&".chars())
}

/// Atlas sub-region and advance for one glyph
#[derive(Debug, Clone, Copy)]
pub struct GlyphInfo {
    /// (u0, v0, u1, v1), normalized
    pub uv_rect: [f32; 4],
    /// Horizontal advance in em units (1.0 = base size)
    pub advance_em: f32,
}

/// CPU-side atlas: coverage pixels plus the glyph table
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    glyphs: HashMap<char, GlyphInfo>,
    placeholder: GlyphInfo,
}

impl AtlasImage {
    /// Rasterize the fixed charset from an outline font
    pub fn rasterize(font_data: Vec<u8>, base_px: f32) -> Result<Self, String> {
        let font = FontVec::try_from_vec(font_data)
            .map_err(|e| format!("Failed to parse font: {}", e))?;
        let scaled = font.as_scaled(PxScale::from(base_px));

        let chars: Vec<char> = charset().collect();
        let cells = chars.len() as u32 + 1; // cell 0 is the placeholder
        let rows = cells.div_ceil(COLS);
        let width = COLS * CELL_PX;
        let height = rows * CELL_PX;
        let mut pixels = vec![0u8; (width * height) as usize];

        let placeholder = draw_placeholder_cell(&mut pixels, width, height, 0);

        let mut glyphs = HashMap::new();
        for (i, &ch) in chars.iter().enumerate() {
            let cell = i as u32 + 1;
            let (cell_x, cell_y) = cell_origin(cell);

            let glyph_id = scaled.glyph_id(ch);
            let advance_em = scaled.h_advance(glyph_id) / base_px;

            let glyph = glyph_id.with_scale_and_position(
                PxScale::from(base_px),
                ab_glyph::point(cell_x as f32 + PAD_PX as f32, cell_y as f32 + scaled.ascent()),
            );
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|x, y, coverage| {
                    let px = bounds.min.x as i32 + x as i32;
                    let py = bounds.min.y as i32 + y as i32;
                    // Clip to the cell so a wide glyph cannot bleed into
                    // its neighbor
                    if px >= cell_x as i32
                        && px < (cell_x + CELL_PX) as i32
                        && py >= cell_y as i32
                        && py < (cell_y + CELL_PX) as i32
                    {
                        let idx = (py as u32 * width + px as u32) as usize;
                        pixels[idx] = pixels[idx].max((coverage * 255.0) as u8);
                    }
                });
            }

            glyphs.insert(
                ch,
                GlyphInfo {
                    uv_rect: cell_uv(cell, width, height),
                    advance_em,
                },
            );
        }

        Ok(Self {
            width,
            height,
            pixels,
            glyphs,
            placeholder,
        })
    }

    /// Procedural fallback atlas: every character maps to the placeholder
    pub fn placeholder_atlas() -> Self {
        let width = COLS * CELL_PX;
        let height = CELL_PX;
        let mut pixels = vec![0u8; (width * height) as usize];
        let placeholder = draw_placeholder_cell(&mut pixels, width, height, 0);

        Self {
            width,
            height,
            pixels,
            glyphs: HashMap::new(),
            placeholder,
        }
    }

    /// Glyph info for a character, falling back to the placeholder cell
    pub fn glyph(&self, ch: char) -> &GlyphInfo {
        self.glyphs.get(&ch).unwrap_or(&self.placeholder)
    }
}

impl GlyphMetrics for AtlasImage {
    fn advance_em(&self, ch: char) -> f32 {
        self.glyph(ch).advance_em
    }
}

fn cell_origin(cell: u32) -> (u32, u32) {
    ((cell % COLS) * CELL_PX, (cell / COLS) * CELL_PX)
}

fn cell_uv(cell: u32, width: u32, height: u32) -> [f32; 4] {
    let (x, y) = cell_origin(cell);
    [
        x as f32 / width as f32,
        y as f32 / height as f32,
        (x + CELL_PX) as f32 / width as f32,
        (y + CELL_PX) as f32 / height as f32,
    ]
}

/// Fill a cell with a hollow box glyph and return its info
fn draw_placeholder_cell(pixels: &mut [u8], width: u32, height: u32, cell: u32) -> GlyphInfo {
    let (cell_x, cell_y) = cell_origin(cell);
    let lo = PAD_PX * 2;
    let hi = CELL_PX - PAD_PX * 2;
    for y in lo..hi {
        for x in lo..hi {
            let edge = x < lo + 6 || x >= hi - 6 || y < lo + 6 || y >= hi - 6;
            if edge {
                let idx = ((cell_y + y) * width + cell_x + x) as usize;
                pixels[idx] = 255;
            }
        }
    }

    GlyphInfo {
        uv_rect: cell_uv(cell, width, height),
        advance_em: 0.6,
    }
}

/// GPU-side atlas: the image uploaded once as an R8 texture
pub struct GlyphAtlas {
    pub image: AtlasImage,
    pub view: wgpu::TextureView,
    _texture: wgpu::Texture,
}

impl GlyphAtlas {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, image: AtlasImage) -> Self {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Glyph Atlas"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            image,
            view,
            _texture: texture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_atlas_covers_any_char() {
        let atlas = AtlasImage::placeholder_atlas();
        let info = atlas.glyph('Ω');
        assert!(info.advance_em > 0.0);
        assert!(atlas.pixels.iter().any(|&p| p > 0));
    }

    #[test]
    fn test_placeholder_metrics_are_uniform() {
        let atlas = AtlasImage::placeholder_atlas();
        assert_eq!(atlas.advance_em('A'), atlas.advance_em('%'));
    }

    #[test]
    fn test_cell_uv_is_normalized_and_ordered() {
        let uv = cell_uv(13, COLS * CELL_PX, 4 * CELL_PX);
        assert!(uv[0] < uv[2]);
        assert!(uv[1] < uv[3]);
        for v in uv {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_charset_has_no_duplicates() {
        let chars: Vec<char> = charset().collect();
        let mut dedup = chars.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(chars.len(), dedup.len());
    }
}
