//! Typed uniform parameters
//!
//! Every program takes its parameters as one `#[repr(C)]` struct. A
//! [`UniformSlots`] hands out one buffer and bind group per draw of a frame,
//! so draws recorded before a submit never overwrite each other's parameters.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::backend::*;

/// Layout of a bind group holding a single uniform buffer at binding 0
pub fn uniform_layout_entries(visibility: ShaderStageFlags) -> Vec<BindGroupLayoutEntry> {
    vec![BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: BindingType::UniformBuffer,
    }]
}

/// Layout entry for a sampled 2D texture
pub fn texture_layout_entry(binding: u32, format: TextureFormat) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStageFlags::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float {
                filterable: format.is_filterable(),
            },
        },
    }
}

/// Growable pool of uniform buffers of type `T`, indexed by draw
pub struct UniformSlots<T: Pod> {
    label: &'static str,
    layout: BindGroupLayoutHandle,
    slots: Vec<(BufferHandle, BindGroupHandle)>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformSlots<T> {
    pub fn new(label: &'static str, layout: BindGroupLayoutHandle) -> Self {
        Self {
            label,
            layout,
            slots: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn layout(&self) -> BindGroupLayoutHandle {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store `value` in slot `index` and return the bind group exposing it
    pub fn write<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        index: usize,
        value: &T,
    ) -> BackendResult<BindGroupHandle> {
        while self.slots.len() <= index {
            let buffer = backend.create_buffer(&BufferDescriptor {
                label: Some(format!("{} Uniforms {}", self.label, self.slots.len())),
                size: std::mem::size_of::<T>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })?;
            let bind_group = backend.create_bind_group(
                self.layout,
                &[(
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                )],
            )?;
            self.slots.push((buffer, bind_group));
        }

        let (buffer, bind_group) = self.slots[index];
        backend.write_buffer(buffer, 0, bytemuck::bytes_of(value));
        Ok(bind_group)
    }

    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (buffer, bind_group) in self.slots.drain(..) {
            backend.destroy_bind_group(bind_group);
            backend.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    #[test]
    fn test_slots_grow_on_demand() {
        let mut backend = SoftwareBackend::new(1, 1);
        let layout = backend
            .create_bind_group_layout(&uniform_layout_entries(ShaderStageFlags::FRAGMENT))
            .unwrap();
        let mut slots = UniformSlots::<[f32; 4]>::new("Test", layout);

        let first = slots.write(&mut backend, 0, &[1.0; 4]).unwrap();
        let third = slots.write(&mut backend, 2, &[2.0; 4]).unwrap();
        assert_eq!(slots.len(), 3);
        assert_ne!(first, third);

        let again = slots.write(&mut backend, 0, &[3.0; 4]).unwrap();
        assert_eq!(first, again);
        assert_eq!(slots.len(), 3);

        slots.release(&mut backend);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_depth_like_formats_are_not_filterable() {
        let entry = texture_layout_entry(2, TextureFormat::R32Float);
        assert!(matches!(
            entry.ty,
            BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: false }
            }
        ));
    }
}
