//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the wgpu device, queue, and (when rendering to a window)
//! the configured surface. It is owned by [`WgpuRenderer`](crate::WgpuRenderer).
//!
//! # Initialization
//!
//! A windowed context is created from a winit [`Window`]; a headless context
//! needs no window and renders its display into an off-screen texture of
//! [`RendererConfig::headless_width`] × [`RendererConfig::headless_height`].
//!
//! ```no_run
//! use afterglow::{GpuContext, RendererConfig};
//!
//! let gpu = GpuContext::headless(&RendererConfig::default())?;
//! println!("{}x{} (aspect: {})", gpu.width(), gpu.height(), gpu.aspect());
//! # Ok::<(), afterglow::GpuError>(())
//! ```

use std::sync::Arc;
use winit::window::Window;

use crate::config::RendererConfig;
use crate::error::GpuError;

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed.
pub struct GpuContext {
    /// The surface presenting to the window, `None` when headless.
    pub surface: Option<wgpu::Surface<'static>>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Display configuration. Headless contexts keep their size and format here too.
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a GPU context presenting to `window`.
    ///
    /// 1. Creates a wgpu instance with primary backends (Vulkan, Metal, DX12)
    /// 2. Creates a surface for the window
    /// 3. Requests an adapter able to present to it
    /// 4. Creates the logical device and command queue
    /// 5. Configures the surface, preferring an sRGB format
    pub fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let instance = instance();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter, config)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let preferred = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb() == config.prefer_srgb)
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoSurfaceFormat)?;

        // Copies of the display into render targets need COPY_SRC.
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let surface_config = wgpu::SurfaceConfiguration {
            usage,
            format: preferred,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: present_mode(config),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        log::info!(
            "GPU ready: {} ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_config.format,
            surface_config.width,
            surface_config.height
        );

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            config: surface_config,
        })
    }

    /// Create a GPU context without a window.
    pub fn headless(config: &RendererConfig) -> Result<Self, GpuError> {
        let instance = instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter, config)?;

        let format = if config.prefer_srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let display = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format,
            width: config.headless_width.max(1),
            height: config.headless_height.max(1),
            present_mode: present_mode(config),
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        log::info!(
            "GPU ready (headless): {} ({:?}), display {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            display.width,
            display.height
        );

        Ok(Self {
            surface: None,
            device,
            queue,
            config: display,
        })
    }

    /// Resize the display to new dimensions.
    ///
    /// Ignores zero-sized dimensions to avoid wgpu validation errors (which
    /// can occur during window minimize).
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, &self.config);
            }
        }
    }

    /// Re-applies the current configuration after the surface was lost.
    pub fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    })
}

fn request_device(
    adapter: &wgpu::Adapter,
    config: &RendererConfig,
) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    let device = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some(&config.label),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
        experimental_features: Default::default(),
    }))?;
    Ok(device)
}

fn present_mode(config: &RendererConfig) -> wgpu::PresentMode {
    if config.vsync {
        wgpu::PresentMode::Fifo
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}
