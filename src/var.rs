//! Single values bound to a shader as uniforms.

use std::marker::PhantomData;

use wgpu::util::DeviceExt;

/// A uniform buffer holding exactly one `A`.
pub struct Var<A> {
    buffer: wgpu::Buffer,
    phantom_data: PhantomData<A>,
}

impl<A: bytemuck::Pod + bytemuck::Zeroable> Var<A> {
    pub fn write(&self, queue: &wgpu::Queue, contents: A) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[contents]));
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }
}

pub struct Builder<'a, A> {
    label: Option<&'a str>,
    contents: A,
    usage: wgpu::BufferUsages,
}

impl<'a, A: bytemuck::Pod + bytemuck::Zeroable> Builder<'a, A> {
    /// A `UNIFORM` var initialised to `contents`.
    pub fn uniform(contents: A) -> Self {
        Self {
            label: None,
            contents,
            usage: wgpu::BufferUsages::UNIFORM,
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_usage(mut self, usage: wgpu::BufferUsages) -> Self {
        self.usage |= usage;
        self
    }

    pub fn create(self, device: &wgpu::Device) -> Var<A> {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: self.label,
            contents: bytemuck::cast_slice(&[self.contents]),
            usage: self.usage,
        });

        Var {
            buffer,
            phantom_data: PhantomData,
        }
    }
}

/// A type-erased [`Var`], so vars of different types can sit in one list.
pub trait AnyVar {
    fn binding_resource(&self) -> wgpu::BindingResource;
}

impl<A: bytemuck::Pod + bytemuck::Zeroable> AnyVar for Var<A> {
    fn binding_resource(&self) -> wgpu::BindingResource {
        Var::binding_resource(self)
    }
}
