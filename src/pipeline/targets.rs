//! Off-screen render targets and the bind/resolve protocol
//!
//! A [`RenderTargetSet`] is written between `bind` and `resolve` and read only
//! after `resolve`. The protocol is carried by tokens: `bind` hands out a
//! writer that borrows the set, `resolve` consumes the writer and hands out a
//! read-only view. Passes that draw into a set take the writer, passes that
//! sample from it take the resolved view, so reading a set that is still bound
//! or writing one that was already resolved does not compile.

use std::marker::PhantomData;

use crate::backend::*;
use crate::pipeline::encoding::DEPTH_CLEAR;

/// What binding a target does with its previous contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetUsage {
    /// Cleared to the set's clear color on every bind
    DiscardContents,
    /// Loaded on bind, so earlier frames remain visible
    PreserveContents,
}

/// Size, format and policy of one off-screen buffer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Allocate a `Depth32Float` buffer next to the color buffer
    pub has_depth_buffer: bool,
    pub usage: TargetUsage,
}

impl RenderTargetDescriptor {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            has_depth_buffer: false,
            usage: TargetUsage::DiscardContents,
        }
    }

    pub fn with_depth_buffer(mut self) -> Self {
        self.has_depth_buffer = true;
        self
    }

    pub fn with_usage(mut self, usage: TargetUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Format of the depth buffer of targets with `has_depth_buffer`
pub const DEPTH_BUFFER_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// One allocated off-screen buffer
#[derive(Debug)]
pub struct RenderTarget {
    descriptor: RenderTargetDescriptor,
    texture: TextureHandle,
    view: TextureViewHandle,
    depth: Option<(TextureHandle, TextureViewHandle)>,
}

impl RenderTarget {
    pub fn allocate<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        descriptor: RenderTargetDescriptor,
    ) -> BackendResult<Self> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(BackendError::InvalidTargetSize {
                width: descriptor.width,
                height: descriptor.height,
            });
        }

        let texture = backend.create_texture(&TextureDescriptor {
            label: Some(descriptor.label.clone()),
            width: descriptor.width,
            height: descriptor.height,
            mip_levels: 1,
            format: descriptor.format,
            usage: TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        })?;
        let view = match backend.create_texture_view(texture) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e);
            }
        };

        let depth = if descriptor.has_depth_buffer {
            match Self::allocate_depth(backend, &descriptor) {
                Ok(depth) => Some(depth),
                Err(e) => {
                    backend.destroy_texture(texture);
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            descriptor,
            texture,
            view,
            depth,
        })
    }

    fn allocate_depth<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        descriptor: &RenderTargetDescriptor,
    ) -> BackendResult<(TextureHandle, TextureViewHandle)> {
        let depth_texture = backend.create_texture(&TextureDescriptor {
            label: Some(format!("{} Depth", descriptor.label)),
            width: descriptor.width,
            height: descriptor.height,
            mip_levels: 1,
            format: DEPTH_BUFFER_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        match backend.create_texture_view(depth_texture) {
            Ok(depth_view) => Ok((depth_texture, depth_view)),
            Err(e) => {
                backend.destroy_texture(depth_texture);
                Err(e)
            }
        }
    }

    pub fn descriptor(&self) -> &RenderTargetDescriptor {
        &self.descriptor
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn depth_view(&self) -> Option<TextureViewHandle> {
        self.depth.map(|(_, view)| view)
    }

    fn load_op(&self, clear: [f32; 4]) -> LoadOp {
        match self.descriptor.usage {
            TargetUsage::DiscardContents => LoadOp::Clear(clear),
            TargetUsage::PreserveContents => LoadOp::Load,
        }
    }

    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture(self.texture);
        if let Some((depth_texture, _)) = self.depth {
            backend.destroy_texture(depth_texture);
        }
    }
}

/// `N` same-sized targets written together as multiple render targets
#[derive(Debug)]
pub struct RenderTargetSet<const N: usize> {
    label: &'static str,
    targets: [RenderTarget; N],
    clear_colors: [[f32; 4]; N],
}

impl<const N: usize> RenderTargetSet<N> {
    pub fn allocate<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        label: &'static str,
        descriptors: [RenderTargetDescriptor; N],
        clear_colors: [[f32; 4]; N],
    ) -> BackendResult<Self> {
        let size = descriptors[0].size();
        if descriptors.iter().any(|d| d.size() != size) {
            return Err(BackendError::InvalidTargetSize {
                width: size.0,
                height: size.1,
            });
        }

        let mut allocated: Vec<RenderTarget> = Vec::with_capacity(N);
        for descriptor in descriptors {
            match RenderTarget::allocate(backend, descriptor) {
                Ok(target) => allocated.push(target),
                Err(e) => {
                    for target in allocated {
                        target.release(backend);
                    }
                    return Err(e);
                }
            }
        }

        let targets: [RenderTarget; N] = allocated
            .try_into()
            .map_err(|_| BackendError::TextureCreationFailed(label.to_string()))?;

        log::info!("Allocated {} ({}x{}, {} targets)", label, size.0, size.1, N);

        Ok(Self {
            label,
            targets,
            clear_colors,
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets[0].descriptor.size()
    }

    pub fn targets(&self) -> &[RenderTarget; N] {
        &self.targets
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &RenderTargetDescriptor> {
        self.targets.iter().map(|t| &t.descriptor)
    }

    pub fn formats(&self) -> [TextureFormat; N] {
        std::array::from_fn(|i| self.targets[i].descriptor.format)
    }

    /// Depth buffer shared by the set: the first target that has one
    pub fn depth_view(&self) -> Option<TextureViewHandle> {
        self.targets.iter().find_map(|t| t.depth_view())
    }

    /// Redirect draw output into every target of the set
    pub fn bind<'a, B: GraphicsBackend + ?Sized>(&'a self, backend: &mut B) -> BoundTargetSet<'a, N> {
        let (width, height) = self.size();

        let color_attachments = self
            .targets
            .iter()
            .zip(self.clear_colors.iter())
            .map(|(target, clear)| ColorAttachment {
                view: target.view,
                load_op: target.load_op(*clear),
                store_op: StoreOp::Store,
            })
            .collect();

        let depth_stencil_attachment = self.depth_view().map(|view| DepthStencilAttachment {
            view,
            depth_load_op: LoadOp::Clear([DEPTH_CLEAR; 4]),
            depth_store_op: StoreOp::Store,
            depth_clear_value: DEPTH_CLEAR,
        });

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(self.label.to_string()),
            color_attachments,
            depth_stencil_attachment,
        });
        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

        BoundTargetSet {
            views: std::array::from_fn(|i| self.targets[i].view),
            size: (width, height),
            _set: PhantomData,
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for target in self.targets {
            target.release(backend);
        }
    }
}

/// A set that is currently receiving draw output
#[must_use = "a bound target set must be resolved before its contents can be read"]
#[derive(Debug)]
pub struct BoundTargetSet<'a, const N: usize> {
    views: [TextureViewHandle; N],
    size: (u32, u32),
    _set: PhantomData<&'a RenderTargetSet<N>>,
}

impl<'a, const N: usize> BoundTargetSet<'a, N> {
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// End the redirect; the targets become readable
    pub fn resolve<B: GraphicsBackend + ?Sized>(self, backend: &mut B) -> ResolvedTargetSet<'a, N> {
        backend.end_render_pass();
        ResolvedTargetSet {
            views: self.views,
            size: self.size,
            _set: PhantomData,
        }
    }
}

/// A set whose contents are complete and may be sampled
#[derive(Debug)]
pub struct ResolvedTargetSet<'a, const N: usize> {
    views: [TextureViewHandle; N],
    size: (u32, u32),
    _set: PhantomData<&'a RenderTargetSet<N>>,
}

impl<'a, const N: usize> ResolvedTargetSet<'a, N> {
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn view(&self, index: usize) -> TextureViewHandle {
        self.views[index]
    }
}

/// Clear values of the G-buffer: no albedo and zero coverage, no normal,
/// depth at the far plane
pub const GBUFFER_CLEAR: [[f32; 4]; 3] = [
    [0.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 0.0],
    [DEPTH_CLEAR, 0.0, 0.0, 0.0],
];

/// Albedo, encoded normal and depth of every visible surface point
#[derive(Debug)]
pub struct GBuffer {
    set: RenderTargetSet<3>,
}

impl GBuffer {
    pub const ALBEDO: usize = 0;
    pub const NORMAL: usize = 1;
    pub const DEPTH: usize = 2;

    pub const ALBEDO_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
    pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
    pub const DEPTH_FORMAT: TextureFormat = TextureFormat::R32Float;

    pub const FORMATS: [TextureFormat; 3] =
        [Self::ALBEDO_FORMAT, Self::NORMAL_FORMAT, Self::DEPTH_FORMAT];

    pub fn descriptors(width: u32, height: u32) -> [RenderTargetDescriptor; 3] {
        [
            RenderTargetDescriptor::new("G-Buffer Albedo", width, height, Self::ALBEDO_FORMAT)
                .with_depth_buffer(),
            RenderTargetDescriptor::new("G-Buffer Normal", width, height, Self::NORMAL_FORMAT),
            RenderTargetDescriptor::new("G-Buffer Depth", width, height, Self::DEPTH_FORMAT),
        ]
    }

    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, width: u32, height: u32) -> BackendResult<Self> {
        let set = RenderTargetSet::allocate(
            backend,
            "G-Buffer",
            Self::descriptors(width, height),
            GBUFFER_CLEAR,
        )?;
        Ok(Self { set })
    }

    pub fn size(&self) -> (u32, u32) {
        self.set.size()
    }

    pub fn targets(&self) -> &RenderTargetSet<3> {
        &self.set
    }

    pub fn albedo(&self) -> &RenderTarget {
        &self.set.targets()[Self::ALBEDO]
    }

    pub fn normal(&self) -> &RenderTarget {
        &self.set.targets()[Self::NORMAL]
    }

    pub fn depth(&self) -> &RenderTarget {
        &self.set.targets()[Self::DEPTH]
    }

    /// Begin the geometry encode: all three targets and the depth buffer are cleared
    pub fn bind<'a, B: GraphicsBackend + ?Sized>(&'a self, backend: &mut B) -> GBufferWriter<'a> {
        GBufferWriter {
            bound: self.set.bind(backend),
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.set.release(backend);
    }
}

/// Proof that the G-buffer is the current render target
#[must_use = "the G-buffer must be resolved before lighting can read it"]
#[derive(Debug)]
pub struct GBufferWriter<'a> {
    bound: BoundTargetSet<'a, 3>,
}

impl<'a> GBufferWriter<'a> {
    pub fn size(&self) -> (u32, u32) {
        self.bound.size()
    }

    pub fn resolve<B: GraphicsBackend + ?Sized>(self, backend: &mut B) -> ResolvedGBuffer<'a> {
        ResolvedGBuffer {
            resolved: self.bound.resolve(backend),
        }
    }
}

/// Read access to a fully written G-buffer
#[derive(Debug)]
pub struct ResolvedGBuffer<'a> {
    resolved: ResolvedTargetSet<'a, 3>,
}

impl<'a> ResolvedGBuffer<'a> {
    pub fn size(&self) -> (u32, u32) {
        self.resolved.size()
    }

    pub fn albedo(&self) -> TextureViewHandle {
        self.resolved.view(GBuffer::ALBEDO)
    }

    pub fn normal(&self) -> TextureViewHandle {
        self.resolved.view(GBuffer::NORMAL)
    }

    pub fn depth(&self) -> TextureViewHandle {
        self.resolved.view(GBuffer::DEPTH)
    }
}

/// Sum of every light's diffuse and specular contribution per pixel
#[derive(Debug)]
pub struct LightAccumulationBuffer {
    set: RenderTargetSet<2>,
}

impl LightAccumulationBuffer {
    pub const DIFFUSE: usize = 0;
    pub const SPECULAR: usize = 1;

    /// Half floats: accumulated light may exceed 1.0
    pub const FORMAT: TextureFormat = TextureFormat::Rgba16Float;
    pub const FORMATS: [TextureFormat; 2] = [Self::FORMAT, Self::FORMAT];

    pub fn descriptors(width: u32, height: u32) -> [RenderTargetDescriptor; 2] {
        [
            RenderTargetDescriptor::new("Diffuse Accumulation", width, height, Self::FORMAT),
            RenderTargetDescriptor::new("Specular Accumulation", width, height, Self::FORMAT),
        ]
    }

    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, width: u32, height: u32) -> BackendResult<Self> {
        let set = RenderTargetSet::allocate(
            backend,
            "Light Accumulation",
            Self::descriptors(width, height),
            [[0.0; 4]; 2],
        )?;
        Ok(Self { set })
    }

    pub fn size(&self) -> (u32, u32) {
        self.set.size()
    }

    pub fn targets(&self) -> &RenderTargetSet<2> {
        &self.set
    }

    pub fn diffuse(&self) -> &RenderTarget {
        &self.set.targets()[Self::DIFFUSE]
    }

    pub fn specular(&self) -> &RenderTarget {
        &self.set.targets()[Self::SPECULAR]
    }

    /// Begin light accumulation; both targets are cleared to zero here and
    /// only here, once per frame
    pub fn bind<'a, B: GraphicsBackend + ?Sized>(&'a self, backend: &mut B) -> LightAccumulationWriter<'a> {
        LightAccumulationWriter {
            bound: self.set.bind(backend),
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.set.release(backend);
    }
}

/// Proof that the accumulation buffer is the current render target
#[must_use = "light accumulation must be resolved before it can be combined"]
#[derive(Debug)]
pub struct LightAccumulationWriter<'a> {
    bound: BoundTargetSet<'a, 2>,
}

impl<'a> LightAccumulationWriter<'a> {
    pub fn size(&self) -> (u32, u32) {
        self.bound.size()
    }

    pub fn resolve<B: GraphicsBackend + ?Sized>(self, backend: &mut B) -> ResolvedLightAccumulation<'a> {
        ResolvedLightAccumulation {
            resolved: self.bound.resolve(backend),
        }
    }
}

/// Read access to the final light sums of a frame
#[derive(Debug)]
pub struct ResolvedLightAccumulation<'a> {
    resolved: ResolvedTargetSet<'a, 2>,
}

impl<'a> ResolvedLightAccumulation<'a> {
    pub fn size(&self) -> (u32, u32) {
        self.resolved.size()
    }

    pub fn diffuse(&self) -> TextureViewHandle {
        self.resolved.view(LightAccumulationBuffer::DIFFUSE)
    }

    pub fn specular(&self) -> TextureViewHandle {
        self.resolved.view(LightAccumulationBuffer::SPECULAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    #[test]
    fn test_gbuffer_descriptors() {
        let descriptors = GBuffer::descriptors(800, 600);
        assert!(descriptors.iter().all(|d| d.size() == (800, 600)));
        assert!(descriptors[GBuffer::ALBEDO].has_depth_buffer);
        assert!(!descriptors[GBuffer::NORMAL].has_depth_buffer);
        assert_eq!(descriptors[GBuffer::NORMAL].format, TextureFormat::Rgba16Float);
        assert_eq!(descriptors[GBuffer::DEPTH].format, TextureFormat::R32Float);
        assert!(descriptors
            .iter()
            .all(|d| d.usage == TargetUsage::DiscardContents));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut backend = SoftwareBackend::new(4, 4);
        let err = GBuffer::new(&mut backend, 0, 600).unwrap_err();
        assert!(matches!(err, BackendError::InvalidTargetSize { width: 0, .. }));
    }

    #[test]
    fn test_bind_clears_every_target_once() {
        let mut backend = SoftwareBackend::new(4, 4);
        let accumulation = LightAccumulationBuffer::new(&mut backend, 4, 4).unwrap();

        let writer = accumulation.bind(&mut backend);
        let resolved = writer.resolve(&mut backend);
        assert_eq!(resolved.size(), (4, 4));

        let log = backend.pass_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].label.as_deref(), Some("Light Accumulation"));
        assert!(log[0]
            .color_load_ops
            .iter()
            .all(|op| *op == LoadOp::Clear([0.0; 4])));
    }

    #[test]
    fn test_failed_allocation_releases_partial_targets() {
        // Albedo, its depth buffer, normal and depth: a texture and a view each
        let steps = 8;
        for successes in 0..steps {
            let mut backend = SoftwareBackend::new(4, 4);
            let baseline = backend.texture_count();
            backend.fail_textures_after(successes);

            assert!(GBuffer::new(&mut backend, 4, 4).is_err(), "step {}", successes);
            assert_eq!(backend.texture_count(), baseline, "leak after {} successes", successes);
        }

        let mut backend = SoftwareBackend::new(4, 4);
        let baseline = backend.texture_count();
        backend.fail_textures_after(steps);
        let gbuffer = GBuffer::new(&mut backend, 4, 4).unwrap();
        assert_eq!(backend.texture_count(), baseline + 4);
        gbuffer.release(&mut backend);
        assert_eq!(backend.texture_count(), baseline);
    }

    #[test]
    fn test_preserved_target_is_loaded() {
        let mut backend = SoftwareBackend::new(2, 2);
        let set = RenderTargetSet::allocate(
            &mut backend,
            "History",
            [RenderTargetDescriptor::new("History", 2, 2, TextureFormat::Rgba16Float)
                .with_usage(TargetUsage::PreserveContents)],
            [[1.0; 4]],
        )
        .unwrap();
        let _ = set.bind(&mut backend).resolve(&mut backend);
        assert_eq!(backend.pass_log()[0].color_load_ops, vec![LoadOp::Load]);
    }
}
