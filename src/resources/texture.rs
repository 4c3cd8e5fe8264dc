//! Texture loading and management

use crate::backend::*;
use crate::resources::ContentError;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Decoded RGBA8 texel data
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Tightly packed rows, four bytes per texel
    pub rgba8: Vec<u8>,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from encoded bytes (PNG, JPEG, ...)
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, ContentError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            name: name.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            rgba8: img.to_rgba8().into_raw(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            rgba8: color.to_vec(),
        }
    }

    /// Default albedo of untextured objects
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Square checkerboard of `cell` sized squares
    pub fn checkerboard(size: u32, cell: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let cell = cell.max(1);
        Self::generate("checkerboard", size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                color1
            } else {
                color2
            }
        })
    }

    /// Running-bond brick wall: 4 rows of 2 bricks per tile, odd rows shifted
    /// by half a brick, separated by light mortar
    pub fn brick(size: u32) -> Self {
        let size = size.max(8);
        let brick_w = size / 2;
        let brick_h = size / 4;
        let mortar = (size / 32).max(1);

        Self::generate("brick", size, size, |x, y| {
            let row = y / brick_h;
            let shifted = if row % 2 == 1 { x + brick_w / 2 } else { x };
            let column = (shifted / brick_w) % 2;
            let (bx, by) = (shifted % brick_w, y % brick_h);

            if bx < mortar || by < mortar {
                return [200, 195, 185, 255];
            }

            // Per-brick tone so the wall does not look flat
            let tone = ((row * 7 + column * 13) % 5) as u8 * 8;
            [150 + tone, 60 + tone / 2, 45, 255]
        })
    }

    fn generate(name: &str, width: u32, height: u32, texel: impl Fn(u32, u32) -> [u8; 4]) -> Self {
        let mut rgba8 = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                rgba8.extend_from_slice(&texel(x, y));
            }
        }
        Self {
            name: name.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            rgba8,
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.rgba8[i], self.rgba8[i + 1], self.rgba8[i + 2], self.rgba8[i + 3]]
    }
}

/// Texture uploaded to the backend
#[derive(Debug)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub name: String,
}

impl GpuTexture {
    pub fn upload<B: GraphicsBackend + ?Sized>(backend: &mut B, data: &TextureData) -> BackendResult<Self> {
        let expected = (data.width as usize) * (data.height as usize) * 4;
        if data.width == 0 || data.height == 0 || data.rgba8.len() != expected {
            return Err(BackendError::TextureCreationFailed(format!(
                "texture '{}' is {}x{} but holds {} bytes",
                data.name,
                data.width,
                data.height,
                data.rgba8.len()
            )));
        }

        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            mip_levels: 1,
            format: data.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = match backend.create_texture_view(handle) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(handle);
                return Err(e);
            }
        };
        backend.write_texture(handle, &data.rgba8, data.width, data.height);

        Ok(Self {
            handle,
            view,
            width: data.width,
            height: data.height,
            format: data.format,
            name: data.name.clone(),
        })
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture(self.handle);
    }
}
