//! Fullscreen viewer: winit event capture, the fixed-rate control tick and a
//! wgpu surface that presents CPU-composed frames.

use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::util::DeviceExt;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::config::Configuration;
use crate::error::RenderError;
use crate::events::UiEvent;
use crate::platform::root_window;
use crate::render::{RenderBackend, frame};
use crate::tasks::controller::{PlaybackController, PlaybackPhase, TickOutcome};
use crate::tasks::supervisor::SpawnBackend;
use crate::tasks::unifier::EventUnifier;

#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub title: String,
    pub fullscreen: bool,
    pub hide_cursor: bool,
    pub error_color: [u8; 3],
    pub tick_interval: Duration,
    pub root_window_command: Option<Vec<String>>,
}

impl ViewerOptions {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            title: cfg.window_title.clone(),
            fullscreen: cfg.fullscreen,
            hide_cursor: cfg.hide_cursor,
            error_color: cfg.error_color,
            tick_interval: cfg.tick_interval(),
            root_window_command: cfg.root_window_command.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ViewerEvent {
    Shutdown,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

const QUAD: [Vertex; 4] = [
    Vertex {
        pos: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        pos: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        pos: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        pos: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

const FRAME_SHADER: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) pos: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(pos, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0) var frame_tex: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let c = textureSample(frame_tex, frame_sampler, in.uv);
    return vec4<f32>(c.rgb, 1.0);
}
"#;

/// Map a window event onto kiosk input; `None` for everything else.
fn translate_input(event: &WindowEvent) -> Option<UiEvent> {
    match event {
        WindowEvent::CloseRequested => Some(UiEvent::Quit),
        WindowEvent::KeyboardInput { event, .. }
            if event.state == ElementState::Pressed && !event.repeat =>
        {
            match &event.logical_key {
                Key::Named(NamedKey::Escape) => Some(UiEvent::Quit),
                Key::Character(c) if c.eq_ignore_ascii_case("q") => Some(UiEvent::Quit),
                _ => Some(UiEvent::Key),
            }
        }
        WindowEvent::MouseInput {
            state: ElementState::Pressed,
            ..
        } => Some(UiEvent::PointerDown),
        WindowEvent::Touch(touch) if touch.phase == TouchPhase::Started => {
            Some(UiEvent::PointerDown)
        }
        _ => None,
    }
}

fn create_window(event_loop: &ActiveEventLoop, options: &ViewerOptions) -> Result<Arc<Window>> {
    let mut attrs = WindowAttributes::default().with_title(options.title.clone());
    attrs = if options.fullscreen {
        attrs.with_fullscreen(Some(Fullscreen::Borderless(None)))
    } else {
        attrs.with_inner_size(PhysicalSize::new(1280, 720))
    };
    let window = event_loop
        .create_window(attrs)
        .context("failed to create viewer window")?;
    if options.hide_cursor {
        window.set_cursor_visible(false);
    }
    Ok(Arc::new(window))
}

struct Gpu {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vbuf: wgpu::Buffer,
}

impl Gpu {
    fn new(instance: wgpu::Instance, surface: &wgpu::Surface<'static>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("kiosk-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kiosk-frame-shader"),
            source: wgpu::ShaderSource::Wgsl(FRAME_SHADER.into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiosk-frame-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiosk-frame-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kiosk-frame-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiosk-frame-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kiosk-quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            format,
            pipeline,
            bind_layout,
            sampler,
            vbuf,
        })
    }
}

struct Target {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    window: Arc<Window>,
}

fn configure_target(
    gpu: &Gpu,
    surface: wgpu::Surface<'static>,
    window: Arc<Window>,
) -> Result<Target, RenderError> {
    let caps = surface.get_capabilities(&gpu.adapter);
    if !caps.formats.contains(&gpu.format) {
        return Err(RenderError::Surface(format!(
            "surface does not support {:?}",
            gpu.format
        )));
    }
    let size = window.inner_size();
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: gpu.format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&gpu.device, &config);
    info!(
        width = config.width,
        height = config.height,
        format = ?config.format,
        "viewer surface configured",
    );
    Ok(Target {
        surface,
        config,
        window,
    })
}

/// What is on screen, kept so the frame can be recomposed after a resize.
enum Shown {
    Image(RgbaImage),
    Solid([u8; 3]),
}

struct Presenter {
    options: ViewerOptions,
    gpu: Gpu,
    target: Target,
    shown: Option<Shown>,
    canvas: Option<RgbaImage>,
}

impl Presenter {
    fn new(event_loop: &ActiveEventLoop, options: ViewerOptions) -> Result<Self> {
        let window = create_window(event_loop, &options)?;
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let gpu = Gpu::new(instance, &surface)?;
        let target = configure_target(&gpu, surface, window)?;
        Ok(Self {
            options,
            gpu,
            target,
            shown: None,
            canvas: None,
        })
    }

    fn window_id(&self) -> WindowId {
        self.target.window.id()
    }

    fn size(&self) -> (u32, u32) {
        (self.target.config.width, self.target.config.height)
    }

    fn draw_image(&mut self, path: &Path) -> Result<(), RenderError> {
        let decoded = frame::decode_rgba8_apply_exif(path)?;
        let (width, height) = self.size();
        let canvas = frame::compose_letterboxed(path, &decoded, width, height)?;
        self.present(&canvas)?;
        self.shown = Some(Shown::Image(decoded));
        self.canvas = Some(canvas);
        Ok(())
    }

    fn show_solid(&mut self, color: [u8; 3]) -> Result<(), RenderError> {
        let (width, height) = self.size();
        let canvas = frame::solid_frame(width, height, color);
        self.present(&canvas)?;
        self.shown = Some(Shown::Solid(color));
        self.canvas = Some(canvas);
        Ok(())
    }

    /// Recreate the window and its surface. The GPU device is kept.
    fn reset(&mut self, event_loop: &ActiveEventLoop) -> Result<(), RenderError> {
        if let Some(command) = &self.options.root_window_command {
            root_window::paint_black(command, root_window::ROOT_WINDOW_TIMEOUT);
        }
        let window = create_window(event_loop, &self.options)
            .map_err(|err| RenderError::Surface(format!("{err:#}")))?;
        let surface = self
            .gpu
            .instance
            .create_surface(window.clone())
            .map_err(|err| RenderError::Surface(err.to_string()))?;
        self.target = configure_target(&self.gpu, surface, window)?;
        self.shown = None;
        self.canvas = None;
        info!("display re-initialised");
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError> {
        self.target.config.width = size.width.max(1);
        self.target.config.height = size.height.max(1);
        self.target
            .surface
            .configure(&self.gpu.device, &self.target.config);
        debug!(
            width = self.target.config.width,
            height = self.target.config.height,
            "viewer surface resized",
        );
        self.canvas = None;
        self.redraw()
    }

    fn redraw(&mut self) -> Result<(), RenderError> {
        if let Some(canvas) = self.canvas.take() {
            if canvas.dimensions() == self.size() {
                let result = self.present(&canvas);
                self.canvas = Some(canvas);
                return result;
            }
        }
        let (width, height) = self.size();
        let canvas = match &self.shown {
            Some(Shown::Image(decoded)) => {
                frame::compose_letterboxed(Path::new("<current>"), decoded, width, height)?
            }
            Some(Shown::Solid(color)) => frame::solid_frame(width, height, *color),
            None => return Ok(()),
        };
        self.present(&canvas)?;
        self.canvas = Some(canvas);
        Ok(())
    }

    fn acquire(&mut self) -> Result<wgpu::SurfaceTexture, RenderError> {
        match self.target.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.target
                    .surface
                    .configure(&self.gpu.device, &self.target.config);
                self.target
                    .surface
                    .get_current_texture()
                    .map_err(|err| RenderError::Surface(err.to_string()))
            }
            Err(err) => Err(RenderError::Surface(err.to_string())),
        }
    }

    fn present(&mut self, canvas: &RgbaImage) -> Result<(), RenderError> {
        let frame = self.acquire()?;
        let gpu = &self.gpu;
        let (width, height) = canvas.dimensions();
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kiosk-frame"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gpu.queue.write_texture(
            texture.as_image_copy(),
            canvas.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            extent,
        );
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiosk-frame-bind-group"),
            layout: &gpu.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&gpu.sampler),
                },
            ],
        });

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiosk-encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiosk-frame-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            rpass.set_pipeline(&gpu.pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_vertex_buffer(0, gpu.vbuf.slice(..));
            rpass.draw(0..4, 0..1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        self.target.window.pre_present_notify();
        frame.present();
        Ok(())
    }
}

/// Rendering backend for the duration of one tick; surface resets need the
/// active event loop to create a window.
struct TickRenderer<'a> {
    presenter: &'a mut Presenter,
    event_loop: &'a ActiveEventLoop,
}

impl RenderBackend for TickRenderer<'_> {
    fn reset_surface(&mut self) -> Result<(), RenderError> {
        self.presenter.reset(self.event_loop)
    }

    fn draw_image(&mut self, path: &Path) -> Result<(), RenderError> {
        self.presenter.draw_image(path)
    }

    fn blank(&mut self, hold: Duration) -> Result<(), RenderError> {
        self.presenter.show_solid([0, 0, 0])?;
        if !hold.is_zero() {
            thread::sleep(hold);
        }
        Ok(())
    }

    fn present_error_frame(&mut self) -> Result<(), RenderError> {
        let color = self.presenter.options.error_color;
        self.presenter.show_solid(color)
    }
}

struct KioskApp<B: SpawnBackend> {
    options: ViewerOptions,
    cancel: CancellationToken,
    controller: PlaybackController<B>,
    unifier: EventUnifier,
    presenter: Option<Presenter>,
    pending: Vec<UiEvent>,
    next_tick: Instant,
    started: bool,
    failure: Option<anyhow::Error>,
}

impl<B: SpawnBackend> KioskApp<B> {
    fn new(
        options: ViewerOptions,
        cancel: CancellationToken,
        controller: PlaybackController<B>,
        unifier: EventUnifier,
    ) -> Self {
        Self {
            options,
            cancel,
            controller,
            unifier,
            presenter: None,
            pending: Vec::new(),
            next_tick: Instant::now(),
            started: false,
            failure: None,
        }
    }

    fn run_tick(&mut self, event_loop: &ActiveEventLoop, now: Instant) {
        let Some(presenter) = self.presenter.as_mut() else {
            return;
        };
        let events = mem::take(&mut self.pending);
        let signal = self
            .unifier
            .tick(events, self.controller.state().last_transition, now);
        let mut renderer = TickRenderer {
            presenter,
            event_loop,
        };
        if self.controller.on_tick(signal, &mut renderer, now) == TickOutcome::Stopped {
            event_loop.exit();
        }
    }
}

impl<B: SpawnBackend> ApplicationHandler<ViewerEvent> for KioskApp<B> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        if self.presenter.is_none() {
            match Presenter::new(event_loop, self.options.clone()) {
                Ok(presenter) => self.presenter = Some(presenter),
                Err(err) => {
                    error!(error = ?err, "failed to initialize display");
                    self.failure = Some(err);
                    event_loop.exit();
                    return;
                }
            }
        }

        if !self.started
            && let Some(presenter) = self.presenter.as_mut()
        {
            let now = Instant::now();
            let mut renderer = TickRenderer {
                presenter,
                event_loop,
            };
            self.controller.start(&mut renderer, now);
            self.started = true;
            self.next_tick = now + self.options.tick_interval;
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(presenter) = self.presenter.as_mut() else {
            return;
        };
        if presenter.window_id() != window_id {
            return;
        }

        if let Some(input) = translate_input(&event) {
            debug!(?input, "input event");
            self.pending.push(input);
            return;
        }

        let result = match event {
            WindowEvent::Resized(size) => presenter.resize(size),
            WindowEvent::RedrawRequested => presenter.redraw(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            warn!(error = %err, "viewer redraw failed");
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Shutdown => {
                info!("viewer received shutdown request");
                self.pending.push(UiEvent::Quit);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.started {
            return;
        }
        let now = Instant::now();
        if now >= self.next_tick {
            self.run_tick(event_loop, now);
            self.next_tick = now + self.options.tick_interval;
        }
        if !event_loop.exiting() {
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
        }
    }
}

/// Run the kiosk on the current thread until quit, window close or `cancel`.
pub fn run_windowed<B: SpawnBackend>(
    controller: PlaybackController<B>,
    unifier: EventUnifier,
    options: ViewerOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Shutdown);
        })
    };

    let mut app = KioskApp::new(options, cancel, controller, unifier);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    if app.controller.phase() != PlaybackPhase::Stopped {
        app.controller.shutdown();
    }
    run_result.context("viewer event loop failed")?;
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
