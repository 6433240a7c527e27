/*!
Typed `wgpu` buffers.

[`bytemuck`](https://docs.rs/bytemuck/latest/bytemuck/) casts Rust datatypes to
the bytes that are sent to the GPU. A raw `wgpu::Buffer` has no idea what it
holds, so nothing stops a buffer that's "supposed to" contain `u32`s from being
read back as `f32`s. [`Buffer<A>`] remembers its element type and length, and
every read or write goes through `A`.
*/

use std::{marker::PhantomData, mem::size_of, ops::Deref, sync::mpsc};

use log::trace;
use crate::error::{DispatchError, FailureCode};

pub struct Buffer<A> {
    buffer: wgpu::Buffer,
    len: u64,
    phantom_data: PhantomData<A>,
}

impl<A: bytemuck::Pod + bytemuck::Zeroable> Buffer<A> {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Number of `A`s the buffer holds.
    fn len(&self) -> u64 {
        self.len
    }

    pub fn byte_size(&self) -> u64 {
        self.len * size_of::<A>() as u64
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    /**
    Map the whole buffer and copy it into host memory.

    Blocks until the device has finished every submission that touches the
    buffer. The buffer must have been created with `MAP_READ`.
    */
    pub fn read_to_vec(&self, device: &wgpu::Device) -> Result<Vec<A>, DispatchError> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only goes away if we've already returned.
            let _ = sender.send(result);
        });

        trace!("waiting for device");
        device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| {
                DispatchError::new(FailureCode::MapFailed, "device dropped the map request")
            })?
            .map_err(|error| DispatchError::new(FailureCode::MapFailed, error.to_string()))?;

        let contents = View::<A> {
            view: slice.get_mapped_range(),
            phantom_data: PhantomData,
        }
        .to_vec();
        self.buffer.unmap();

        Ok(contents)
    }
}

/// Mapped contents of a [`Buffer<A>`].
pub struct View<'a, A> {
    view: wgpu::BufferView<'a>,
    phantom_data: PhantomData<A>,
}

impl<'a, A: bytemuck::Pod + bytemuck::Zeroable> Deref for View<'a, A> {
    type Target = [A];

    fn deref(&self) -> &Self::Target {
        bytemuck::cast_slice(&*self.view)
    }
}

pub struct Builder<'a, A> {
    label: Option<&'a str>,
    len: u64,
    usage: wgpu::BufferUsages,
    phantom_data: PhantomData<A>,
}

impl<'a, A: bytemuck::Pod + bytemuck::Zeroable> Builder<'a, A> {
    /// An uninitialised buffer of `len` elements.
    pub fn new(len: u64) -> Self {
        Self {
            label: None,
            len,
            usage: wgpu::BufferUsages::empty(),
            phantom_data: PhantomData,
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

    pub fn create(self, device: &wgpu::Device) -> Buffer<A> {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: self.label,
            size: self.len * size_of::<A>() as u64,
            usage: self.usage,
            mapped_at_creation: false,
        });

        Buffer {
            buffer,
            len: self.len,
            phantom_data: PhantomData,
        }
    }
}

/// Copy all of `source` into `destination`. Both must have the same length.
pub fn copy_buffer_to_buffer<A: bytemuck::Pod + bytemuck::Zeroable>(
    command_encoder: &mut wgpu::CommandEncoder,
    source: &Buffer<A>,
    destination: &Buffer<A>,
) {
    debug_assert_eq!(source.len(), destination.len());
    command_encoder.copy_buffer_to_buffer(
        source.buffer(),
        0,
        destination.buffer(),
        0,
        source.byte_size(),
    )
}
