//! Texel storage for the software backend
//!
//! Texels are kept as `Vec4` in RGBA order but every store is quantized to
//! what the texture format can actually hold, so precision loss matches a GPU.

use glam::{Vec2, Vec4};
use half::f16;

use crate::backend::{AddressMode, FilterMode, SamplerDescriptor, TextureFormat};

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn unorm8(c: f32) -> f32 {
    (c.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

fn srgb8(c: f32) -> f32 {
    srgb_to_linear(unorm8(linear_to_srgb(c.clamp(0.0, 1.0))))
}

fn half(c: f32) -> f32 {
    f16::from_f32(c).to_f32()
}

/// Round a value to the precision of `format`
pub fn quantize(format: TextureFormat, v: Vec4) -> Vec4 {
    match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm => {
            Vec4::new(unorm8(v.x), unorm8(v.y), unorm8(v.z), unorm8(v.w))
        }
        TextureFormat::Rgba8UnormSrgb | TextureFormat::Bgra8UnormSrgb => {
            Vec4::new(srgb8(v.x), srgb8(v.y), srgb8(v.z), unorm8(v.w))
        }
        TextureFormat::Rgba16Float => Vec4::new(half(v.x), half(v.y), half(v.z), half(v.w)),
        TextureFormat::R32Float => Vec4::new(v.x, 0.0, 0.0, 1.0),
        TextureFormat::Depth32Float => Vec4::new(v.x.clamp(0.0, 1.0), 0.0, 0.0, 1.0),
    }
}

/// Decode one texel of tightly packed upload data
pub fn decode_texel(format: TextureFormat, bytes: &[u8]) -> Vec4 {
    let unorm = |b: u8| b as f32 / 255.0;
    match format {
        TextureFormat::Rgba8Unorm => Vec4::new(
            unorm(bytes[0]),
            unorm(bytes[1]),
            unorm(bytes[2]),
            unorm(bytes[3]),
        ),
        TextureFormat::Bgra8Unorm => Vec4::new(
            unorm(bytes[2]),
            unorm(bytes[1]),
            unorm(bytes[0]),
            unorm(bytes[3]),
        ),
        TextureFormat::Rgba8UnormSrgb => Vec4::new(
            srgb_to_linear(unorm(bytes[0])),
            srgb_to_linear(unorm(bytes[1])),
            srgb_to_linear(unorm(bytes[2])),
            unorm(bytes[3]),
        ),
        TextureFormat::Bgra8UnormSrgb => Vec4::new(
            srgb_to_linear(unorm(bytes[2])),
            srgb_to_linear(unorm(bytes[1])),
            srgb_to_linear(unorm(bytes[0])),
            unorm(bytes[3]),
        ),
        TextureFormat::Rgba16Float => {
            let c = |i: usize| f16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]).to_f32();
            Vec4::new(c(0), c(1), c(2), c(3))
        }
        TextureFormat::R32Float | TextureFormat::Depth32Float => Vec4::new(
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            0.0,
            0.0,
            1.0,
        ),
    }
}

fn wrap(coord: i64, size: u32, mode: AddressMode) -> u32 {
    let n = size as i64;
    let wrapped = match mode {
        AddressMode::ClampToEdge => coord.clamp(0, n - 1),
        AddressMode::Repeat => coord.rem_euclid(n),
        AddressMode::MirrorRepeat => {
            let m = coord.rem_euclid(2 * n);
            if m >= n {
                2 * n - 1 - m
            } else {
                m
            }
        }
    };
    wrapped as u32
}

/// A 2D texture held in memory
#[derive(Debug, Clone)]
pub struct SoftTexture {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    texels: Vec<Vec4>,
}

impl SoftTexture {
    pub fn new(label: Option<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        let initial = quantize(format, Vec4::ZERO);
        Self {
            label,
            width,
            height,
            format,
            texels: vec![initial; (width as usize) * (height as usize)],
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// `textureLoad`: out-of-range coordinates read zero
    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        if x >= self.width || y >= self.height {
            return Vec4::ZERO;
        }
        self.texels[(y * self.width + x) as usize]
    }

    pub fn store(&mut self, x: u32, y: u32, value: Vec4) {
        if x < self.width && y < self.height {
            self.texels[(y * self.width + x) as usize] = quantize(self.format, value);
        }
    }

    pub fn fill(&mut self, value: Vec4) {
        let q = quantize(self.format, value);
        self.texels.iter_mut().for_each(|t| *t = q);
    }

    /// Upload tightly packed data covering the top-left `width` x `height` region
    pub fn write_bytes(&mut self, data: &[u8], width: u32, height: u32) {
        let bpp = self.format.bytes_per_pixel() as usize;
        let width = width.min(self.width);
        let height = height.min(self.height);
        for y in 0..height {
            for x in 0..width {
                let offset = ((y * width + x) as usize) * bpp;
                if let Some(bytes) = data.get(offset..offset + bpp) {
                    let value = decode_texel(self.format, bytes);
                    self.texels[(y * self.width + x) as usize] = value;
                }
            }
        }
    }

    /// `textureSample` without mipmaps
    pub fn sample(&self, sampler: &SamplerDescriptor, uv: Vec2) -> Vec4 {
        let fetch = |x: i64, y: i64| {
            let x = wrap(x, self.width, sampler.address_mode_u);
            let y = wrap(y, self.height, sampler.address_mode_v);
            self.texels[(y * self.width + x) as usize]
        };

        let u = uv.x * self.width as f32;
        let v = uv.y * self.height as f32;

        match sampler.mag_filter {
            FilterMode::Nearest => fetch(u.floor() as i64, v.floor() as i64),
            FilterMode::Linear => {
                let u = u - 0.5;
                let v = v - 0.5;
                let x0 = u.floor();
                let y0 = v.floor();
                let fx = u - x0;
                let fy = v - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), fx);
                let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), fx);
                top.lerp(bottom, fy)
            }
        }
    }
}
