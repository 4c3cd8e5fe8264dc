//! CPU versions of the pipeline's shader programs
//!
//! Each program reads the same parameter structs and bindings as its WGSL
//! counterpart; see the `*_SHADER` constants in `crate::pipeline`.

use bytemuck::Pod;
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use super::raster::{ClipVertex, Fragment, MAX_VARYINGS};
use super::texel::SoftTexture;
use crate::backend::{QuadVertex, SamplerDescriptor, Vertex};
use crate::pipeline::combine_pass::CombineUniforms;
use crate::pipeline::debug_view::{DebugBlitUniforms, DebugChannel};
use crate::pipeline::encoding::{self, decode_normal, encode_normal, is_covered};
use crate::pipeline::gbuffer_pass::GeometryUniforms;
use crate::pipeline::lighting_pass::LightUniforms;
use crate::pipeline::shading;
use crate::shader::ShaderProgram;

/// Resources one draw can see, looked up by `(group, binding)`
pub(super) trait BindingSource {
    fn uniform_bytes(&self, group: u32, binding: u32) -> Option<&[u8]>;
    fn texture(&self, group: u32, binding: u32) -> Option<&SoftTexture>;
    fn sampler(&self, group: u32, binding: u32) -> Option<&SamplerDescriptor>;
}

fn uniform<T: Pod, S: BindingSource + ?Sized>(source: &S, group: u32, binding: u32) -> Result<T, String> {
    let bytes = source
        .uniform_bytes(group, binding)
        .ok_or_else(|| format!("uniform buffer at @group({group}) @binding({binding}) is not bound"))?;
    let size = std::mem::size_of::<T>();
    if bytes.len() < size {
        return Err(format!(
            "uniform buffer at @group({group}) @binding({binding}) holds {} bytes, {} required",
            bytes.len(),
            size
        ));
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..size]))
}

fn texture<S: BindingSource + ?Sized>(source: &S, group: u32, binding: u32) -> Result<&SoftTexture, String> {
    source
        .texture(group, binding)
        .ok_or_else(|| format!("texture at @group({group}) @binding({binding}) is not bound"))
}

fn sampler<S: BindingSource + ?Sized>(
    source: &S,
    group: u32,
    binding: u32,
) -> Result<&SamplerDescriptor, String> {
    source
        .sampler(group, binding)
        .ok_or_else(|| format!("sampler at @group({group}) @binding({binding}) is not bound"))
}

/// A program with every parameter resolved for one draw
pub(super) enum BoundProgram<'a> {
    GBuffer {
        uniforms: GeometryUniforms,
        albedo: &'a SoftTexture,
        sampler: &'a SamplerDescriptor,
    },
    DirectionalLight {
        uniforms: LightUniforms,
        albedo: &'a SoftTexture,
        normal: &'a SoftTexture,
        depth: &'a SoftTexture,
    },
    Combine {
        uniforms: CombineUniforms,
        albedo: &'a SoftTexture,
        diffuse: &'a SoftTexture,
        specular: &'a SoftTexture,
    },
    DebugBlit {
        uniforms: DebugBlitUniforms,
        source: &'a SoftTexture,
    },
}

impl<'a> BoundProgram<'a> {
    /// Resolve the bindings `program` declares; an error names the missing one
    pub fn bind<S: BindingSource + ?Sized>(program: ShaderProgram, source: &'a S) -> Result<Self, String> {
        Ok(match program {
            ShaderProgram::GBuffer => BoundProgram::GBuffer {
                uniforms: uniform(source, 0, 0)?,
                albedo: texture(source, 1, 0)?,
                sampler: sampler(source, 1, 1)?,
            },
            ShaderProgram::DirectionalLight => BoundProgram::DirectionalLight {
                albedo: texture(source, 0, 0)?,
                normal: texture(source, 0, 1)?,
                depth: texture(source, 0, 2)?,
                uniforms: uniform(source, 1, 0)?,
            },
            ShaderProgram::Combine => BoundProgram::Combine {
                albedo: texture(source, 0, 0)?,
                diffuse: texture(source, 0, 1)?,
                specular: texture(source, 0, 2)?,
                uniforms: uniform(source, 1, 0)?,
            },
            ShaderProgram::DebugBlit => BoundProgram::DebugBlit {
                source: texture(source, 0, 0)?,
                uniforms: uniform(source, 1, 0)?,
            },
        })
    }

    /// Sizes of every sampled texture
    pub fn sampled_sizes(&self) -> Vec<(u32, u32)> {
        match self {
            BoundProgram::GBuffer { albedo, .. } => vec![albedo.size()],
            BoundProgram::DirectionalLight {
                albedo,
                normal,
                depth,
                ..
            } => vec![albedo.size(), normal.size(), depth.size()],
            BoundProgram::Combine {
                albedo,
                diffuse,
                specular,
                ..
            } => vec![albedo.size(), diffuse.size(), specular.size()],
            BoundProgram::DebugBlit { source, .. } => vec![source.size()],
        }
    }

    pub fn sampled_textures(&self) -> Vec<&'a SoftTexture> {
        match *self {
            BoundProgram::GBuffer { albedo, .. } => vec![albedo],
            BoundProgram::DirectionalLight {
                albedo,
                normal,
                depth,
                ..
            } => vec![albedo, normal, depth],
            BoundProgram::Combine {
                albedo,
                diffuse,
                specular,
                ..
            } => vec![albedo, diffuse, specular],
            BoundProgram::DebugBlit { source, .. } => vec![source],
        }
    }

    /// Run the vertex stage on one vertex's bytes; `bytes` holds at least one
    /// whole vertex of the program's [`crate::shader::VertexKind`]
    pub fn vertex(&self, bytes: &[u8]) -> ClipVertex {
        let mut varyings = [0.0; MAX_VARYINGS];
        match self {
            BoundProgram::GBuffer { uniforms, .. } => {
                let vertex: Vertex =
                    bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<Vertex>()]);
                let world_position = uniforms.world * vertex.position.extend(1.0);
                let clip = uniforms.projection * uniforms.view * world_position;
                let normal = (uniforms.inverse_transpose_world * vertex.normal.extend(0.0)).xyz();
                let uv = vertex.uv * uniforms.tiling.xy();
                varyings[..3].copy_from_slice(&normal.to_array());
                varyings[3..5].copy_from_slice(&uv.to_array());
                ClipVertex { clip, varyings }
            }
            _ => {
                let vertex: QuadVertex =
                    bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<QuadVertex>()]);
                varyings[..2].copy_from_slice(&vertex.uv.to_array());
                ClipVertex {
                    clip: Vec4::new(vertex.position.x, vertex.position.y, 0.0, 1.0),
                    varyings,
                }
            }
        }
    }

    /// Run the fragment stage; writes one value per color target into `out`
    pub fn fragment(&self, fragment: &Fragment, out: &mut [Vec4; 3]) {
        let v = &fragment.varyings;
        match self {
            BoundProgram::GBuffer {
                uniforms,
                albedo,
                sampler,
            } => {
                let normal = Vec3::new(v[0], v[1], v[2]).normalize_or_zero();
                let uv = Vec2::new(v[3], v[4]);
                let texel = albedo.sample(sampler, uv);
                let color = texel.xyz() * uniforms.albedo_color.xyz();
                out[0] = color.extend(1.0);
                out[1] = encode_normal(normal).extend(uniforms.albedo_color.w);
                out[2] = Vec4::new(fragment.position.z, 0.0, 0.0, 1.0);
            }
            BoundProgram::DirectionalLight {
                uniforms,
                albedo,
                normal,
                depth,
            } => {
                let (x, y) = (fragment.x, fragment.y);
                if !is_covered(albedo.texel(x, y)) {
                    out[0] = Vec4::ZERO;
                    out[1] = Vec4::ZERO;
                    return;
                }
                let encoded = normal.texel(x, y);
                let n = decode_normal(encoded.xyz());
                let d = depth.texel(x, y).x;
                let uv = Vec2::new(v[0], v[1]);
                let world = encoding::reconstruct_world_position(uv, d, uniforms.inverse_view_projection);
                let light = shading::directional_light(
                    n,
                    world,
                    uniforms.eye_position.xyz(),
                    uniforms.light_direction.xyz(),
                    uniforms.light_color.xyz(),
                    &uniforms.lighting_config(),
                );
                out[0] = light.diffuse.extend(1.0);
                out[1] = (light.specular * encoded.w).extend(1.0);
            }
            BoundProgram::Combine {
                uniforms,
                albedo,
                diffuse,
                specular,
            } => {
                let (x, y) = (fragment.x, fragment.y);
                let a = albedo.texel(x, y);
                out[0] = if is_covered(a) {
                    shading::combine(
                        a.xyz(),
                        diffuse.texel(x, y).xyz(),
                        specular.texel(x, y).xyz(),
                        uniforms.ambient.xyz(),
                    )
                    .extend(1.0)
                } else {
                    uniforms.background
                };
            }
            BoundProgram::DebugBlit { uniforms, source } => {
                let uv = Vec2::new(v[0], v[1]).clamp(Vec2::ZERO, Vec2::ONE);
                let x = ((uv.x * source.width as f32) as u32).min(source.width - 1);
                let y = ((uv.y * source.height as f32) as u32).min(source.height - 1);
                let texel = source.texel(x, y);
                out[0] = match uniforms.channel() {
                    DebugChannel::Color => texel.xyz().extend(1.0),
                    DebugChannel::Depth => {
                        let g = ((1.0 - texel.x) * uniforms.params.y).clamp(0.0, 1.0);
                        Vec4::new(g, g, g, 1.0)
                    }
                };
            }
        }
    }
}
