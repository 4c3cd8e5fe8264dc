//! Software backend
//!
//! A headless CPU implementation of [`GraphicsBackend`]. Commands execute
//! immediately, render targets are plain texel arrays and the display surface
//! is an offscreen texture, which makes every intermediate buffer inspectable.
//! It backs the test suite and offline rendering.
//!
//! Besides executing, the backend keeps a [`PassRecord`] per render pass of
//! the current frame. Misuse a GPU would reject at validation time (sampling
//! a texture that is also an attachment, missing bindings, mismatched
//! attachment sizes) is recorded as a hazard on the pass instead of
//! panicking.

mod programs;
pub mod raster;
pub mod texel;

use std::collections::HashMap;

use glam::Vec4;

use crate::backend::*;
use crate::shader::{self, ShaderProgram, VertexKind};
use programs::{BindingSource, BoundProgram};
use raster::{ClipVertex, Viewport};
pub use texel::SoftTexture;

/// One draw call as executed
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub pipeline: Option<String>,
    pub program: ShaderProgram,
    pub blend: Option<BlendState>,
    pub depth: Option<DepthStencilState>,
    pub cull_mode: CullMode,
    /// Sizes of the textures the program sampled
    pub sampled_sizes: Vec<(u32, u32)>,
    /// Fragments that passed the depth test and were written
    pub fragments_written: u64,
}

/// One render pass as executed
#[derive(Debug, Clone)]
pub struct PassRecord {
    pub frame: u64,
    pub label: Option<String>,
    pub attachment_sizes: Vec<(u32, u32)>,
    pub color_load_ops: Vec<LoadOp>,
    pub depth_attached: bool,
    pub draws: Vec<DrawRecord>,
    pub hazards: Vec<String>,
}

#[derive(Debug, Clone)]
struct SoftBindGroup {
    entries: Vec<(u32, BindGroupEntry)>,
}

#[derive(Default)]
struct Resources {
    buffers: HashMap<BufferHandle, Vec<u8>>,
    textures: HashMap<TextureHandle, SoftTexture>,
    views: HashMap<TextureViewHandle, TextureHandle>,
    samplers: HashMap<SamplerHandle, SamplerDescriptor>,
    bind_group_layouts: HashMap<BindGroupLayoutHandle, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<BindGroupHandle, SoftBindGroup>,
    pipelines: HashMap<RenderPipelineHandle, RenderPipelineDescriptor>,
}

impl Resources {
    fn view_texture(&self, view: TextureViewHandle) -> Option<&SoftTexture> {
        self.views.get(&view).and_then(|t| self.textures.get(t))
    }
}

/// Resources visible to one draw through its bound groups
struct DrawBindings<'a> {
    resources: &'a Resources,
    groups: &'a [Option<BindGroupHandle>; MAX_BIND_GROUPS],
}

impl DrawBindings<'_> {
    fn entry(&self, group: u32, binding: u32) -> Option<&BindGroupEntry> {
        let handle = (*self.groups.get(group as usize)?)?;
        self.resources
            .bind_groups
            .get(&handle)?
            .entries
            .iter()
            .find(|(b, _)| *b == binding)
            .map(|(_, entry)| entry)
    }
}

impl BindingSource for DrawBindings<'_> {
    fn uniform_bytes(&self, group: u32, binding: u32) -> Option<&[u8]> {
        match self.entry(group, binding)? {
            BindGroupEntry::Buffer {
                buffer,
                offset,
                size,
            } => {
                let bytes = self.resources.buffers.get(buffer)?;
                let start = (*offset as usize).min(bytes.len());
                let end = size
                    .map(|s| (start + s as usize).min(bytes.len()))
                    .unwrap_or(bytes.len());
                Some(&bytes[start..end])
            }
            _ => None,
        }
    }

    fn texture(&self, group: u32, binding: u32) -> Option<&SoftTexture> {
        match self.entry(group, binding)? {
            BindGroupEntry::Texture(view) => self.resources.view_texture(*view),
            _ => None,
        }
    }

    fn sampler(&self, group: u32, binding: u32) -> Option<&SamplerDescriptor> {
        match self.entry(group, binding)? {
            BindGroupEntry::Sampler(sampler) => self.resources.samplers.get(sampler),
            _ => None,
        }
    }
}

const MAX_BIND_GROUPS: usize = 4;

struct ActivePass {
    record: usize,
    color: Vec<TextureHandle>,
    depth: Option<TextureHandle>,
    size: (u32, u32),
    pipeline: Option<RenderPipelineHandle>,
    bind_groups: [Option<BindGroupHandle>; MAX_BIND_GROUPS],
    vertex_buffer: Option<(BufferHandle, u64)>,
    index_buffer: Option<(BufferHandle, u64, IndexFormat)>,
    viewport: Viewport,
}

struct ShadedFragment {
    x: u32,
    y: u32,
    depth: f32,
    outputs: [Vec4; 3],
}

struct ShadedDraw {
    record: DrawRecord,
    fragments: Vec<ShadedFragment>,
    color_targets: Vec<ColorTargetState>,
    depth_state: Option<DepthStencilState>,
    hazards: Vec<String>,
}

/// CPU implementation of [`GraphicsBackend`]
pub struct SoftwareBackend {
    width: u32,
    height: u32,
    surface: TextureHandle,
    surface_view: TextureViewHandle,
    resources: Resources,
    next_id: u64,
    current_pass: Option<ActivePass>,
    pass_log: Vec<PassRecord>,
    frame_index: u64,
    surface_lost: bool,
    /// Texture and view creations left before one fails
    texture_budget: Option<usize>,
}

/// Format of the offscreen display surface
pub const SURFACE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

impl SoftwareBackend {
    /// Create a backend whose display surface is `width` x `height`
    pub fn new(width: u32, height: u32) -> Self {
        let mut backend = Self {
            width: width.max(1),
            height: height.max(1),
            surface: TextureHandle(0),
            surface_view: TextureViewHandle(0),
            resources: Resources::default(),
            next_id: 1,
            current_pass: None,
            pass_log: Vec::new(),
            frame_index: 0,
            surface_lost: false,
            texture_budget: None,
        };
        backend.create_surface();
        log::info!(
            "Software backend ready ({}x{})",
            backend.width,
            backend.height
        );
        backend
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn create_surface(&mut self) {
        let texture = TextureHandle(self.next_id());
        let view = TextureViewHandle(self.next_id());
        self.resources.textures.insert(
            texture,
            SoftTexture::new(
                Some("Display Surface".to_string()),
                self.width,
                self.height,
                SURFACE_FORMAT,
            ),
        );
        self.resources.views.insert(view, texture);
        self.surface = texture;
        self.surface_view = view;
    }

    /// The display surface, as last presented
    pub fn surface(&self) -> Option<&SoftTexture> {
        self.resources.textures.get(&self.surface)
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&SoftTexture> {
        self.resources.textures.get(&texture)
    }

    pub fn view_texture(&self, view: TextureViewHandle) -> Option<&SoftTexture> {
        self.resources.view_texture(view)
    }

    /// Render passes executed since the start of the current frame
    pub fn pass_log(&self) -> &[PassRecord] {
        &self.pass_log
    }

    /// Number of live textures, display surface included
    pub fn texture_count(&self) -> usize {
        self.resources.textures.len()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Make the next `begin_frame` fail with [`BackendError::SurfaceLost`]
    pub fn lose_surface(&mut self) {
        self.surface_lost = true;
    }

    /// Let `successes` more texture or view creations through, then fail the
    /// next one as if the device ran out of memory
    pub fn fail_textures_after(&mut self, successes: usize) {
        self.texture_budget = Some(successes);
    }

    fn spend_texture_budget(&mut self, label: &Option<String>) -> BackendResult<()> {
        match self.texture_budget {
            Some(0) => {
                self.texture_budget = None;
                Err(BackendError::TextureCreationFailed(format!(
                    "{:?}: out of memory",
                    label
                )))
            }
            Some(left) => {
                self.texture_budget = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_hazard(&mut self, hazard: String) {
        log::error!("software backend: {}", hazard);
        if let Some(pass) = &self.current_pass {
            if let Some(record) = self.pass_log.get_mut(pass.record) {
                record.hazards.push(hazard);
            }
        }
    }

    fn validate_pipeline(&self, desc: &RenderPipelineDescriptor) -> BackendResult<()> {
        let label = desc.label.as_deref().unwrap_or("unnamed pipeline");
        let fail = |msg: String| Err(BackendError::PipelineCreationFailed(format!("{}: {}", label, msg)));

        let expected_stride = match desc.program.vertex_kind() {
            VertexKind::Mesh => std::mem::size_of::<Vertex>(),
            VertexKind::Quad => std::mem::size_of::<QuadVertex>(),
        } as u64;
        match desc.vertex_layouts.first() {
            Some(layout) if layout.array_stride >= expected_stride => {}
            _ => return fail(format!("{} needs a vertex stride of {}", desc.program, expected_stride)),
        }

        if desc.color_targets.len() != desc.program.color_outputs() {
            return fail(format!(
                "{} writes {} color outputs, pipeline has {} targets",
                desc.program,
                desc.program.color_outputs(),
                desc.color_targets.len()
            ));
        }

        let mut declared = Vec::new();
        for (group, layout) in desc.bind_group_layouts.iter().enumerate() {
            let entries = self
                .resources
                .bind_group_layouts
                .get(layout)
                .ok_or(BackendError::InvalidHandle {
                    kind: "bind group layout",
                    id: layout.0,
                })?;
            declared.extend(entries.iter().map(|e| (group as u32, e.binding)));
        }
        declared.sort_unstable();

        let required = shader::resource_bindings(desc.program)?;
        if declared != required {
            return fail(format!(
                "{} binds {:?}, layouts provide {:?}",
                desc.program, required, declared
            ));
        }
        Ok(())
    }

    fn fetch_indices(&self, pass: &ActivePass, indices: std::ops::Range<u32>, base_vertex: i32) -> Result<Vec<u32>, String> {
        let (buffer, offset, format) = pass.index_buffer.ok_or("no index buffer bound")?;
        let bytes = self
            .resources
            .buffers
            .get(&buffer)
            .ok_or("index buffer was destroyed")?;
        let stride = format.size();
        indices
            .map(|i| {
                let at = offset as usize + i as usize * stride;
                let raw = bytes
                    .get(at..at + stride)
                    .ok_or_else(|| format!("index {} out of range", i))?;
                let index = match format {
                    IndexFormat::Uint16 => u16::from_le_bytes([raw[0], raw[1]]) as i64,
                    IndexFormat::Uint32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
                };
                Ok((index + base_vertex as i64).max(0) as u32)
            })
            .collect()
    }

    /// Vertex, raster and fragment stages of a draw; touches no attachment
    fn shade_draw(
        &self,
        pass: &ActivePass,
        vertex_ids: &[u32],
        instances: std::ops::Range<u32>,
    ) -> Result<ShadedDraw, String> {
        let pipeline = pass
            .pipeline
            .and_then(|p| self.resources.pipelines.get(&p))
            .ok_or("draw without a render pipeline")?;

        let bindings = DrawBindings {
            resources: &self.resources,
            groups: &pass.bind_groups,
        };
        let program = BoundProgram::bind(pipeline.program, &bindings)
            .map_err(|e| format!("{}: {}", pipeline.program, e))?;

        let mut hazards = Vec::new();
        for sampled in program.sampled_textures() {
            let is_attachment = pass
                .color
                .iter()
                .chain(pass.depth.iter())
                .filter_map(|h| self.resources.textures.get(h))
                .any(|attachment| std::ptr::eq(attachment, sampled));
            if is_attachment {
                hazards.push(format!(
                    "{} samples {:?} while it is a render target",
                    pipeline.program, sampled.label
                ));
            }
        }

        if pipeline.depth_stencil.is_some() != pass.depth.is_some() {
            hazards.push(format!(
                "{}: depth state and depth attachment disagree",
                pipeline.program
            ));
        }
        for (i, target) in pipeline.color_targets.iter().enumerate() {
            let format = pass
                .color
                .get(i)
                .and_then(|h| self.resources.textures.get(h))
                .map(|t| t.format);
            if format != Some(target.format) {
                hazards.push(format!(
                    "{}: color target {} expects {:?}, attachment is {:?}",
                    pipeline.program, i, target.format, format
                ));
            }
        }

        let (buffer, offset) = pass
            .vertex_buffer
            .ok_or_else(|| format!("{}: no vertex buffer bound", pipeline.program))?;
        let vertex_bytes = self
            .resources
            .buffers
            .get(&buffer)
            .ok_or_else(|| format!("{}: vertex buffer was destroyed", pipeline.program))?;
        let stride = pipeline.vertex_layouts[0].array_stride as usize;

        let mut vertices = Vec::with_capacity(vertex_ids.len());
        for id in vertex_ids {
            let at = offset as usize + *id as usize * stride;
            let bytes = vertex_bytes
                .get(at..at + stride)
                .ok_or_else(|| format!("{}: vertex {} out of range", pipeline.program, id))?;
            vertices.push(program.vertex(bytes));
        }

        let depth_texture = pass.depth.and_then(|h| self.resources.textures.get(&h));
        let depth_state = pipeline.depth_stencil;

        let mut fragments = Vec::new();
        for _ in instances {
            for triangle in vertices.chunks_exact(3) {
                let triangle: [ClipVertex; 3] = [triangle[0], triangle[1], triangle[2]];
                for clipped in raster::clip_near(triangle) {
                    raster::rasterize(
                        &clipped,
                        &pass.viewport,
                        pipeline.cull_mode,
                        pipeline.front_face,
                        pass.size,
                        |fragment| {
                            let depth = fragment.position.z;
                            // Early depth test; repeated on write for overlapping triangles
                            if let (Some(state), Some(tex)) = (depth_state, depth_texture) {
                                let stored = tex.texel(fragment.x, fragment.y).x;
                                if !state.depth_compare.passes(depth, stored) {
                                    return;
                                }
                            }
                            let mut outputs = [Vec4::ZERO; 3];
                            program.fragment(&fragment, &mut outputs);
                            fragments.push(ShadedFragment {
                                x: fragment.x,
                                y: fragment.y,
                                depth,
                                outputs,
                            });
                        },
                    );
                }
            }
        }

        Ok(ShadedDraw {
            record: DrawRecord {
                pipeline: pipeline.label.clone(),
                program: pipeline.program,
                blend: pipeline.color_targets.first().and_then(|t| t.blend),
                depth: depth_state,
                cull_mode: pipeline.cull_mode,
                sampled_sizes: program.sampled_sizes(),
                fragments_written: 0,
            },
            fragments,
            color_targets: pipeline.color_targets.clone(),
            depth_state,
            hazards,
        })
    }

    fn execute_draw(&mut self, vertex_ids: Vec<u32>, instances: std::ops::Range<u32>) {
        let Some(pass) = self.current_pass.as_ref() else {
            log::warn!("draw outside of a render pass ignored");
            return;
        };
        let color = pass.color.clone();
        let depth = pass.depth;
        let record_index = pass.record;

        let ShadedDraw {
            mut record,
            fragments,
            color_targets,
            depth_state,
            hazards,
        } = match self.shade_draw(pass, &vertex_ids, instances) {
            Ok(draw) => draw,
            Err(e) => {
                self.record_hazard(e);
                return;
            }
        };

        for fragment in fragments {
            if let (Some(state), Some(handle)) = (depth_state, depth) {
                if let Some(tex) = self.resources.textures.get_mut(&handle) {
                    let stored = tex.texel(fragment.x, fragment.y).x;
                    if !state.depth_compare.passes(fragment.depth, stored) {
                        continue;
                    }
                    if state.depth_write_enabled {
                        tex.store(fragment.x, fragment.y, Vec4::new(fragment.depth, 0.0, 0.0, 1.0));
                    }
                }
            }

            for (i, (handle, target)) in color.iter().zip(color_targets.iter()).enumerate() {
                let Some(tex) = self.resources.textures.get_mut(handle) else {
                    continue;
                };
                let src = fragment.outputs[i];
                let dst = tex.texel(fragment.x, fragment.y);
                let blended = match &target.blend {
                    Some(blend) => apply_blend(blend, src, dst),
                    None => src,
                };
                tex.store(fragment.x, fragment.y, apply_write_mask(target.write_mask, blended, dst));
            }
            record.fragments_written += 1;
        }

        log::trace!(
            "software draw {:?}: {} vertices, {} fragments",
            record.pipeline,
            vertex_ids.len(),
            record.fragments_written
        );

        for hazard in &hazards {
            log::error!("software backend: {}", hazard);
        }
        if let Some(entry) = self.pass_log.get_mut(record_index) {
            entry.draws.push(record);
            entry.hazards.extend(hazards);
        }
    }
}

fn blend_factor(factor: BlendFactor, src: Vec4, dst: Vec4) -> Vec4 {
    match factor {
        BlendFactor::Zero => Vec4::ZERO,
        BlendFactor::One => Vec4::ONE,
        BlendFactor::Src => src,
        BlendFactor::OneMinusSrc => Vec4::ONE - src,
        BlendFactor::SrcAlpha => Vec4::splat(src.w),
        BlendFactor::OneMinusSrcAlpha => Vec4::splat(1.0 - src.w),
        BlendFactor::Dst => dst,
        BlendFactor::OneMinusDst => Vec4::ONE - dst,
        BlendFactor::DstAlpha => Vec4::splat(dst.w),
        BlendFactor::OneMinusDstAlpha => Vec4::splat(1.0 - dst.w),
    }
}

fn blend_component(component: &BlendComponent, src: Vec4, dst: Vec4) -> Vec4 {
    let s = src * blend_factor(component.src_factor, src, dst);
    let d = dst * blend_factor(component.dst_factor, src, dst);
    match component.operation {
        BlendOperation::Add => s + d,
        BlendOperation::Subtract => s - d,
        BlendOperation::ReverseSubtract => d - s,
        BlendOperation::Min => src.min(dst),
        BlendOperation::Max => src.max(dst),
    }
}

/// Fixed-function blending: color factors on rgb, alpha factors on a
pub fn apply_blend(state: &BlendState, src: Vec4, dst: Vec4) -> Vec4 {
    let color = blend_component(&state.color, src, dst);
    let alpha = blend_component(&state.alpha, src, dst);
    Vec4::new(color.x, color.y, color.z, alpha.w)
}

fn apply_write_mask(mask: ColorWrites, value: Vec4, dst: Vec4) -> Vec4 {
    Vec4::new(
        if mask.contains(ColorWrites::RED) { value.x } else { dst.x },
        if mask.contains(ColorWrites::GREEN) { value.y } else { dst.y },
        if mask.contains(ColorWrites::BLUE) { value.z } else { dst.z },
        if mask.contains(ColorWrites::ALPHA) { value.w } else { dst.w },
    )
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.resources.textures.remove(&self.surface);
        self.resources.views.remove(&self.surface_view);
        self.width = width;
        self.height = height;
        self.create_surface();
        log::info!("Software surface resized to {}x{}", width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if std::mem::take(&mut self.surface_lost) {
            return Err(BackendError::SurfaceLost);
        }
        self.frame_index += 1;
        self.pass_log.clear();
        Ok(FrameContext {
            swapchain_view: self.surface_view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.current_pass.is_some() {
            self.record_hazard("frame ended inside a render pass".to_string());
            self.current_pass = None;
        }
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        SURFACE_FORMAT
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next_id());
        self.resources.buffers.insert(handle, vec![0; desc.size as usize]);
        Ok(handle)
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.next_id());
        let mut bytes = data.to_vec();
        if bytes.len() < desc.size as usize {
            bytes.resize(desc.size as usize, 0);
        }
        self.resources.buffers.insert(handle, bytes);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.resources.buffers.get_mut(&buffer) {
            Some(bytes) => {
                let start = offset as usize;
                match bytes.get_mut(start..start + data.len()) {
                    Some(dst) => dst.copy_from_slice(data),
                    None => log::warn!("write_buffer past the end of buffer {}", buffer.0),
                }
            }
            None => log::warn!("write_buffer to unknown buffer {}", buffer.0),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: zero-sized texture",
                desc.label
            )));
        }
        self.spend_texture_budget(&desc.label)?;
        let handle = TextureHandle(self.next_id());
        self.resources.textures.insert(
            handle,
            SoftTexture::new(desc.label.clone(), desc.width, desc.height, desc.format),
        );
        Ok(handle)
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.resources.textures.contains_key(&texture) {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        let label = self.resources.textures.get(&texture).and_then(|t| t.label.clone());
        self.spend_texture_budget(&label)?;
        let handle = TextureViewHandle(self.next_id());
        self.resources.views.insert(handle, texture);
        Ok(handle)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        match self.resources.textures.get_mut(&texture) {
            Some(tex) => tex.write_bytes(data, width, height),
            None => log::warn!("write_texture to unknown texture {}", texture.0),
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let handle = SamplerHandle(self.next_id());
        self.resources.samplers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_bind_group_layout(&mut self, entries: &[BindGroupLayoutEntry]) -> BackendResult<BindGroupLayoutHandle> {
        let handle = BindGroupLayoutHandle(self.next_id());
        self.resources.bind_group_layouts.insert(handle, entries.to_vec());
        Ok(handle)
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_entries = self
            .resources
            .bind_group_layouts
            .get(&layout)
            .ok_or(BackendError::InvalidHandle {
                kind: "bind group layout",
                id: layout.0,
            })?;
        for entry in layout_entries {
            if !entries.iter().any(|(binding, _)| *binding == entry.binding) {
                return Err(BackendError::PipelineCreationFailed(format!(
                    "bind group is missing binding {}",
                    entry.binding
                )));
            }
        }
        let handle = BindGroupHandle(self.next_id());
        self.resources.bind_groups.insert(
            handle,
            SoftBindGroup {
                entries: entries.to_vec(),
            },
        );
        Ok(handle)
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> BackendResult<RenderPipelineHandle> {
        self.validate_pipeline(desc)?;
        let handle = RenderPipelineHandle(self.next_id());
        self.resources.pipelines.insert(handle, desc.clone());
        log::debug!("Created software pipeline {:?} ({})", desc.label, desc.program);
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.current_pass.is_some() {
            self.record_hazard("render pass begun inside another pass".to_string());
            self.current_pass = None;
        }

        let mut record = PassRecord {
            frame: self.frame_index,
            label: desc.label.clone(),
            attachment_sizes: Vec::new(),
            color_load_ops: desc.color_attachments.iter().map(|a| a.load_op).collect(),
            depth_attached: desc.depth_stencil_attachment.is_some(),
            draws: Vec::new(),
            hazards: Vec::new(),
        };

        let mut color = Vec::new();
        for attachment in &desc.color_attachments {
            match self.resources.views.get(&attachment.view).copied() {
                Some(handle) => {
                    if let Some(tex) = self.resources.textures.get_mut(&handle) {
                        if let LoadOp::Clear(c) = attachment.load_op {
                            tex.fill(Vec4::from_array(c));
                        }
                        record.attachment_sizes.push(tex.size());
                    }
                    color.push(handle);
                }
                None => record
                    .hazards
                    .push(format!("color attachment view {} does not exist", attachment.view.0)),
            }
        }

        let depth = desc.depth_stencil_attachment.as_ref().and_then(|attachment| {
            let handle = self.resources.views.get(&attachment.view).copied()?;
            let tex = self.resources.textures.get_mut(&handle)?;
            if let LoadOp::Clear(_) = attachment.depth_load_op {
                tex.fill(Vec4::splat(attachment.depth_clear_value));
            }
            record.attachment_sizes.push(tex.size());
            Some(handle)
        });

        let size = record.attachment_sizes.first().copied().unwrap_or((0, 0));
        if record.attachment_sizes.iter().any(|s| *s != size) {
            record
                .hazards
                .push(format!("attachment sizes differ: {:?}", record.attachment_sizes));
        }

        self.pass_log.push(record);
        self.current_pass = Some(ActivePass {
            record: self.pass_log.len() - 1,
            color,
            depth,
            size,
            pipeline: None,
            bind_groups: [None; MAX_BIND_GROUPS],
            vertex_buffer: None,
            index_buffer: None,
            viewport: Viewport::full(size.0, size.1),
        });
    }

    fn end_render_pass(&mut self) {
        if self.current_pass.take().is_none() {
            log::warn!("end_render_pass without an active pass");
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if let Some(pass) = &mut self.current_pass {
            pass.pipeline = Some(pipeline);
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if let Some(pass) = &mut self.current_pass {
            if let Some(slot) = pass.bind_groups.get_mut(index as usize) {
                *slot = Some(bind_group);
            }
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if let Some(pass) = &mut self.current_pass {
            if slot == 0 {
                pass.vertex_buffer = Some((buffer, offset));
            }
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        if let Some(pass) = &mut self.current_pass {
            pass.index_buffer = Some((buffer, offset, format));
        }
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        if let Some(pass) = &mut self.current_pass {
            pass.viewport = Viewport {
                x,
                y,
                width,
                height,
                min_depth,
                max_depth,
            };
        }
    }

    fn draw_indexed(&mut self, indices: std::ops::Range<u32>, base_vertex: i32, instances: std::ops::Range<u32>) {
        let Some(pass) = self.current_pass.as_ref() else {
            log::warn!("draw_indexed outside of a render pass ignored");
            return;
        };
        match self.fetch_indices(pass, indices, base_vertex) {
            Ok(ids) => self.execute_draw(ids, instances),
            Err(e) => self.record_hazard(e),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.resources.buffers.remove(&buffer);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.resources.textures.remove(&texture);
        self.resources.views.retain(|_, t| *t != texture);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.resources.bind_groups.remove(&bind_group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_blend_sums() {
        let out = apply_blend(
            &BlendState::additive(),
            Vec4::new(0.25, 0.5, 1.0, 1.0),
            Vec4::new(0.5, 0.5, 0.5, 1.0),
        );
        assert_eq!(out, Vec4::new(0.75, 1.0, 1.5, 2.0));
    }

    #[test]
    fn test_replace_blend_overwrites() {
        let out = apply_blend(&BlendState::replace(), Vec4::splat(0.2), Vec4::splat(0.9));
        assert_eq!(out, Vec4::splat(0.2));
    }

    #[test]
    fn test_alpha_blending() {
        let out = apply_blend(
            &BlendState::alpha_blending(),
            Vec4::new(1.0, 0.0, 0.0, 0.25),
            Vec4::new(0.0, 0.0, 1.0, 1.0),
        );
        assert!(out.abs_diff_eq(Vec4::new(0.25, 0.0, 0.75, 1.0), 1e-6));
    }

    #[test]
    fn test_write_mask() {
        let out = apply_write_mask(ColorWrites::RED, Vec4::ONE, Vec4::ZERO);
        assert_eq!(out, Vec4::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_resize_replaces_surface() {
        let mut backend = SoftwareBackend::new(800, 600);
        let before = backend.texture_count();
        backend.resize(1280, 720);
        assert_eq!(backend.surface_size(), (1280, 720));
        assert_eq!(backend.surface().unwrap().size(), (1280, 720));
        assert_eq!(backend.texture_count(), before);
    }

    #[test]
    fn test_clear_on_begin_pass() {
        let mut backend = SoftwareBackend::new(2, 2);
        let frame = backend.begin_frame().unwrap();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear".to_string()),
            color_attachments: vec![ColorAttachment {
                view: frame.swapchain_view,
                load_op: LoadOp::Clear([0.0, 1.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.end_render_pass();
        backend.end_frame().unwrap();

        let surface = backend.surface().unwrap();
        assert!(surface
            .texels()
            .iter()
            .all(|t| *t == Vec4::new(0.0, 1.0, 0.0, 1.0)));
        assert_eq!(backend.pass_log().len(), 1);
        assert!(backend.pass_log()[0].hazards.is_empty());
    }

    #[test]
    fn test_pipeline_with_wrong_layout_is_rejected() {
        let mut backend = SoftwareBackend::new(2, 2);
        let layout = backend
            .create_bind_group_layout(&[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            }])
            .unwrap();
        let result = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("broken combine".to_string()),
            program: ShaderProgram::Combine,
            vertex_layouts: vec![QuadVertex::layout()],
            bind_group_layouts: vec![layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState {
                format: SURFACE_FORMAT,
                blend: None,
                write_mask: ColorWrites::ALL,
            }],
        });
        assert!(matches!(result, Err(BackendError::PipelineCreationFailed(_))));
    }
}
