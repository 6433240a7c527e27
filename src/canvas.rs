//! Turning a scalar field into pixels, and putting those pixels in a window.

use std::{
    num::NonZeroU32,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};
use rayon::prelude::{IndexedParallelIterator, ParallelIterator, ParallelSlice, ParallelSliceMut};
use winit::{
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    platform::run_return::EventLoopExtRunReturn,
    window::{Window, WindowBuilder},
};

use crate::{
    colour,
    command_buffer,
    command_encoder::CommandEncoderExt,
    error::{Error, Result},
    field::ScalarField,
    scope,
    screen,
    selector::ComputeContext,
    var,
};

/// Byte order of the frame buffer. Presentation uploads it as-is into a
/// `Bgra8Unorm` texture.
pub const PRESENT_ORDER: ChannelOrder = ChannelOrder::Bgra;

/// How long [`Canvas::present`] keeps servicing the window after drawing.
pub const PRESENT_SETTLE: Duration = Duration::from_millis(16);

/// Longest side of a freshly opened window, in logical pixels.
pub const MAX_WINDOW_SIDE: u32 = 1024;

const BYTES_PER_PIXEL: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
}

impl ChannelOrder {
    /// Write `rgb` into a 4 byte pixel. Channels are truncated to bytes and
    /// alpha is opaque.
    pub fn write(&self, rgb: colour::Rgb, pixel: &mut [u8]) {
        let (r, g, b) = (rgb.r as u8, rgb.g as u8, rgb.b as u8);
        let bytes = match self {
            ChannelOrder::Rgba => [r, g, b, u8::MAX],
            ChannelOrder::Bgra => [b, g, r, u8::MAX],
        };
        pixel.copy_from_slice(&bytes);
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match self {
            ChannelOrder::Rgba => wgpu::TextureFormat::Rgba8Unorm,
            ChannelOrder::Bgra => wgpu::TextureFormat::Bgra8Unorm,
        }
    }
}

/// A `width * height` grid of 4 byte pixels, overwritten in place by every
/// [`FrameBuffer::fill`].
pub struct FrameBuffer {
    size: screen::Size,
    order: ChannelOrder,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(size: screen::Size, order: ChannelOrder) -> Self {
        Self {
            size,
            order,
            pixels: vec![0; size.cell_count() * BYTES_PER_PIXEL],
        }
    }

    pub fn size(&self) -> screen::Size {
        self.size
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let start = self.size.index(x, y) * BYTES_PER_PIXEL;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.pixels[start..start + BYTES_PER_PIXEL]);
        pixel
    }

    /// Colour every cell of `field`, with counts in `[0, max_value]`.
    pub fn fill(&mut self, field: &ScalarField, max_value: u32) -> Result<()> {
        if field.size() != self.size {
            return Err(Error::Display(format!(
                "a {} field does not fit a {} frame buffer",
                field.size(),
                self.size
            )));
        }
        if max_value == 0 {
            return Err(Error::Configuration(
                "the maximum count must be non-zero".to_string(),
            ));
        }

        if self.size.is_empty() {
            return Ok(());
        }

        trace!("begin fill");
        let width = self.size.width as usize;
        let order = self.order;
        self.pixels
            .par_chunks_mut(width * BYTES_PER_PIXEL)
            .zip(field.counts().par_chunks(width))
            .for_each(|(row, counts)| {
                for (pixel, count) in row.chunks_exact_mut(BYTES_PER_PIXEL).zip(counts) {
                    order.write(colour::colour_for_count(*count, max_value), pixel);
                }
            });
        trace!("end fill");

        Ok(())
    }
}

/// What closed the viewing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dismissal {
    Key(Option<VirtualKeyCode>),
    Closed,
}

/// One titled window showing a [`FrameBuffer`]. Dropping the canvas closes
/// the window.
pub struct Canvas<'a> {
    frame: FrameBuffer,
    presenter: Presenter<'a>,
    // Declared after `presenter` so the surface is dropped before its window.
    window: Window,
    event_loop: EventLoop<()>,
    pending: Option<Dismissal>,
}

impl<'a> Canvas<'a> {
    pub fn open(
        instance: &wgpu::Instance,
        context: &'a ComputeContext,
        title: &str,
        image_size: screen::Size,
    ) -> Result<Self> {
        let max_side = context.device.limits().max_texture_dimension_2d;
        if image_size.width.max(image_size.height) > max_side {
            return Err(Error::Display(format!(
                "a {} image exceeds the device's {} pixel texture limit",
                image_size, max_side
            )));
        }

        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(initial_window_size(image_size))
            .build(&event_loop)
            .map_err(|error| Error::Display(error.to_string()))?;

        let presenter = Presenter::new(instance, context, &window, image_size)?;
        debug!("opened {} window \"{}\"", image_size, title);

        Ok(Self {
            frame: FrameBuffer::new(image_size, PRESENT_ORDER),
            presenter,
            window,
            event_loop,
            pending: None,
        })
    }

    /// Colour `field`, draw it and give the window a moment to show it.
    pub fn present(&mut self, field: &ScalarField, max_value: u32) -> Result<()> {
        self.frame.fill(field, max_value)?;
        self.presenter.upload(&self.frame)?;
        self.window.request_redraw();

        let deadline = Instant::now() + PRESENT_SETTLE;
        if let Some(dismissal) = self.run(Some(deadline))? {
            self.pending = Some(dismissal);
        }
        Ok(())
    }

    /// Blocks until a key is pressed or the window is closed.
    pub fn wait_for_dismissal(&mut self) -> Result<Dismissal> {
        if let Some(dismissal) = self.pending.take() {
            return Ok(dismissal);
        }
        loop {
            if let Some(dismissal) = self.run(None)? {
                return Ok(dismissal);
            }
        }
    }

    /// Service window events until dismissed or, if given, `deadline` passes.
    fn run(&mut self, deadline: Option<Instant>) -> Result<Option<Dismissal>> {
        let (event_loop, presenter, window) =
            (&mut self.event_loop, &mut self.presenter, &self.window);
        let mut outcome = Ok(None);

        event_loop.run_return(|event, _, control_flow| {
            if !matches!(control_flow, ControlFlow::ExitWithCode(_)) {
                match deadline {
                    Some(deadline) => control_flow.set_wait_until(deadline),
                    None => control_flow.set_wait(),
                }
            }

            match event {
                Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                    WindowEvent::CloseRequested => {
                        outcome = Ok(Some(Dismissal::Closed));
                        control_flow.set_exit();
                    }
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                state: ElementState::Pressed,
                                virtual_keycode,
                                ..
                            },
                        ..
                    } => {
                        outcome = Ok(Some(Dismissal::Key(virtual_keycode)));
                        control_flow.set_exit();
                    }
                    WindowEvent::Resized(size) => match presenter.resize(size) {
                        Ok(()) => window.request_redraw(),
                        Err(error) => {
                            outcome = Err(error);
                            control_flow.set_exit();
                        }
                    },
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        match presenter.resize(*new_inner_size) {
                            Ok(()) => window.request_redraw(),
                            Err(error) => {
                                outcome = Err(error);
                                control_flow.set_exit();
                            }
                        }
                    }
                    _ => {}
                },
                Event::RedrawRequested(window_id) if window_id == window.id() => {
                    if let Err(error) = presenter.draw() {
                        outcome = Err(error);
                        control_flow.set_exit();
                    }
                }
                Event::MainEventsCleared => {
                    if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
                        control_flow.set_exit();
                    }
                }
                _ => {}
            }
        });

        outcome
    }
}

impl<'a> Drop for Canvas<'a> {
    fn drop(&mut self) {
        debug!("closing window");
        self.window.set_visible(false);
    }
}

/// GPU side of a [`Canvas`]: the window surface and a textured quad drawn
/// onto it.
struct Presenter<'a> {
    context: &'a ComputeContext,
    surface: wgpu::Surface,
    surface_configuration: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    texture: wgpu::Texture,
    scale: var::Var<[f32; 2]>,
    image_size: screen::Size,
}

impl<'a> Presenter<'a> {
    fn new(
        instance: &wgpu::Instance,
        context: &'a ComputeContext,
        window: &Window,
        image_size: screen::Size,
    ) -> Result<Self> {
        let device = &context.device;

        let surface = unsafe { instance.create_surface(window) };
        if !context.adapter.is_surface_supported(&surface) {
            return Err(Error::Display(format!(
                "{} cannot present to this window",
                context.device_name()
            )));
        }

        // A non-sRGB target keeps the bytes on screen equal to the bytes in the
        // frame buffer.
        let formats = surface.get_supported_formats(&context.adapter);
        let format = formats
            .iter()
            .copied()
            .find(|format| !format.describe().srgb)
            .or_else(|| formats.first().copied())
            .ok_or_else(|| Error::Display("surface supports no formats".to_string()))?;

        let window_size = window.inner_size();
        let surface_configuration = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: window_size.width.max(1),
            height: window_size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
        };
        let ((pipeline, texture, scale, bind_group), error) = scope::capture(device, || {
            surface.configure(device, &surface_configuration);

            let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("present-shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("present.wgsl").into()),
            });

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("present-bind-group-layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("present-pipeline-layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("present-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: "vertex_main",
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: "fragment_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            });

            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("frame-texture"),
                size: extent(image_size),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PRESENT_ORDER.texture_format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            });
            let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());

            let scale = var::Builder::uniform(letterbox_scale(
                image_size,
                screen::Size::new(surface_configuration.width, surface_configuration.height),
            ))
            .with_label("present-scale")
            .with_usage(wgpu::BufferUsages::COPY_DST)
            .create(device);

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("present-bind-group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&texture_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: scale.binding_resource(),
                    },
                ],
            });

            (pipeline, texture, scale, bind_group)
        });
        if let Some(error) = error {
            return Err(display_failure(error));
        }

        Ok(Self {
            context,
            surface,
            surface_configuration,
            pipeline,
            bind_group,
            texture,
            scale,
            image_size,
        })
    }

    fn upload(&self, frame: &FrameBuffer) -> Result<()> {
        debug_assert_eq!(frame.size(), self.image_size);
        let ((), error) = scope::capture(&self.context.device, || {
            self.context.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &self.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                frame.pixels(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: NonZeroU32::new(self.image_size.width * BYTES_PER_PIXEL as u32),
                    rows_per_image: NonZeroU32::new(self.image_size.height),
                },
                extent(self.image_size),
            );
        });
        match error {
            Some(error) => Err(display_failure(error)),
            None => Ok(()),
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            // Minimised.
            return Ok(());
        }
        debug!("resizing to {:?}", size);

        self.surface_configuration.width = size.width;
        self.surface_configuration.height = size.height;
        let ((), error) = scope::capture(&self.context.device, || {
            self.surface
                .configure(&self.context.device, &self.surface_configuration);
            self.scale.write(
                &self.context.queue,
                letterbox_scale(self.image_size, screen::Size::new(size.width, size.height)),
            );
        });
        match error {
            Some(error) => Err(display_failure(error)),
            None => Ok(()),
        }
    }

    fn draw(&mut self) -> Result<()> {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(surface_texture) => surface_texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost, reconfiguring");
                self.surface
                    .configure(&self.context.device, &self.surface_configuration);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("timed out waiting for the surface");
                return Ok(());
            }
            Err(error @ wgpu::SurfaceError::OutOfMemory) => {
                return Err(Error::Display(error.to_string()))
            }
        };

        let surface_texture_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let device = &self.context.device;
        let (command_buffer, error) = scope::capture(device, || {
            command_buffer::record(device, "present", |command_encoder| {
                command_encoder.with_render_pass(
                    &wgpu::RenderPassDescriptor {
                        label: Some("present-pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &surface_texture_view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                store: true,
                            },
                        })],
                        depth_stencil_attachment: None,
                    },
                    |render_pass| {
                        render_pass.set_pipeline(&self.pipeline);
                        render_pass.set_bind_group(0, &self.bind_group, &[]);
                        render_pass.draw(0..4, 0..1);
                    },
                );
            })
        });
        // An invalid command buffer must never reach the queue.
        if let Some(error) = error {
            return Err(display_failure(error));
        }

        self.context.queue.submit([command_buffer]);
        surface_texture.present();
        Ok(())
    }
}

fn display_failure(error: wgpu::Error) -> Error {
    Error::Display(error.to_string())
}

fn extent(size: screen::Size) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width,
        height: size.height,
        depth_or_array_layers: 1,
    }
}

/// Window size for an image: the image itself, shrunk to fit within
/// [`MAX_WINDOW_SIDE`] if needed.
pub fn initial_window_size(image: screen::Size) -> LogicalSize<u32> {
    let longest = image.width.max(image.height).max(1);
    if longest <= MAX_WINDOW_SIDE {
        return LogicalSize::new(image.width.max(1), image.height.max(1));
    }
    let shrink = |side: u32| (side as u64 * MAX_WINDOW_SIDE as u64 / longest as u64).max(1) as u32;
    LogicalSize::new(shrink(image.width), shrink(image.height))
}

/// Clip-space scale that fits the image inside the surface without
/// stretching it.
pub fn letterbox_scale(image: screen::Size, surface: screen::Size) -> [f32; 2] {
    let image_aspect = image.width as f32 / image.height as f32;
    let surface_aspect = surface.width as f32 / surface.height as f32;
    if surface_aspect > image_aspect {
        [image_aspect / surface_aspect, 1.0]
    } else {
        [1.0, surface_aspect / image_aspect]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED_BGRA: [u8; 4] = [0, 0, 250, 255];

    fn field(size: screen::Size, count: u32) -> ScalarField {
        ScalarField::filled(size, count)
    }

    #[test]
    fn zero_counts_are_pure_red() {
        let size = screen::Size::new(13, 7);
        let mut frame = FrameBuffer::new(size, ChannelOrder::Bgra);

        frame.fill(&field(size, 0), 1000).unwrap();

        assert!(frame.pixels().chunks_exact(4).all(|pixel| pixel == RED_BGRA));
    }

    #[test]
    fn max_counts_take_the_top_of_the_gradient() {
        let size = screen::Size::new(5, 3);
        let mut frame = FrameBuffer::new(size, ChannelOrder::Bgra);

        frame.fill(&field(size, 1000), 1000).unwrap();

        // hue_sweep(250, 0, 250) = (41.67, 0, 250), truncated.
        assert!(frame
            .pixels()
            .chunks_exact(4)
            .all(|pixel| pixel == [250, 0, 41, 255]));
    }

    #[test]
    fn channel_order_is_applied_once_per_pixel() {
        let rgb = colour::Rgb::new(10.9, 20.0, 30.0);
        let mut pixel = [0; 4];

        ChannelOrder::Rgba.write(rgb, &mut pixel);
        assert_eq!(pixel, [10, 20, 30, 255]);

        ChannelOrder::Bgra.write(rgb, &mut pixel);
        assert_eq!(pixel, [30, 20, 10, 255]);
    }

    #[test]
    fn fill_is_idempotent() {
        let size = screen::Size::new(9, 4);
        let counts = (0..size.cell_count() as u32).map(|i| i * 7 % 101).collect();
        let field = ScalarField::new(size, counts).unwrap();
        let mut frame = FrameBuffer::new(size, ChannelOrder::Bgra);

        frame.fill(&field, 100).unwrap();
        let first = frame.pixels().to_vec();
        frame.fill(&field, 100).unwrap();

        assert_eq!(frame.pixels(), &first[..]);
    }

    #[test]
    fn fill_overwrites_previous_frame() {
        let size = screen::Size::new(4, 4);
        let mut frame = FrameBuffer::new(size, ChannelOrder::Bgra);

        frame.fill(&field(size, 500), 1000).unwrap();
        frame.fill(&field(size, 0), 1000).unwrap();

        assert_eq!(frame.pixel(3, 3), RED_BGRA);
    }

    #[test]
    fn pixels_follow_field_layout() {
        let size = screen::Size::new(3, 2);
        let field = ScalarField::new(size, vec![0, 0, 0, 0, 0, 100]).unwrap();
        let mut frame = FrameBuffer::new(size, ChannelOrder::Rgba);

        frame.fill(&field, 100).unwrap();

        assert_eq!(frame.pixel(0, 0), [250, 0, 0, 255]);
        assert_eq!(frame.pixel(2, 1), [41, 0, 250, 255]);
    }

    #[test]
    fn empty_frames_fill_to_nothing() {
        for size in [screen::Size::new(0, 5), screen::Size::new(5, 0)] {
            let mut frame = FrameBuffer::new(size, ChannelOrder::Bgra);
            frame.fill(&ScalarField::filled(size, 0), 10).unwrap();
            assert!(frame.pixels().is_empty());
        }
    }

    #[test]
    fn device_errors_become_display_errors() {
        let error = display_failure(wgpu::Error::Validation {
            source: Box::new(std::fmt::Error),
            description: "surface format is not supported".to_string(),
        });
        match error {
            Error::Display(message) => assert!(message.contains("surface format is not supported")),
            other => panic!("expected a display error, got {}", other),
        }
    }

    #[test]
    fn fill_rejects_mismatched_field() {
        let mut frame = FrameBuffer::new(screen::Size::new(4, 4), ChannelOrder::Bgra);
        assert!(frame.fill(&field(screen::Size::new(4, 5), 0), 10).is_err());
        assert!(matches!(
            frame.fill(&field(screen::Size::new(4, 4), 0), 0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn windows_shrink_to_fit() {
        assert_eq!(
            initial_window_size(screen::Size::new(2048, 1024)),
            LogicalSize::new(1024, 512)
        );
        assert_eq!(
            initial_window_size(screen::Size::new(640, 480)),
            LogicalSize::new(640, 480)
        );
    }

    #[test]
    fn letterboxing_preserves_aspect() {
        assert_eq!(
            letterbox_scale(screen::Size::new(100, 100), screen::Size::new(200, 100)),
            [0.5, 1.0]
        );
        assert_eq!(
            letterbox_scale(screen::Size::new(100, 100), screen::Size::new(100, 400)),
            [1.0, 0.25]
        );
        assert_eq!(
            letterbox_scale(screen::Size::new(300, 200), screen::Size::new(600, 400)),
            [1.0, 1.0]
        );
    }
}
