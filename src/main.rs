use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use afterglow::{
    Camera, Composer, ComposerConfig, CopyPass, Drawable, FilmPass, Mesh, Pass, Quat, RenderPass,
    RendererConfig, Scene, Transform, UnrealBloomPass, Vec2, Vec3, Vec4, WgpuRenderer,
};

/// Spinning cube over a floor, rendered through bloom and film grain.
struct Demo {
    window: Option<Arc<Window>>,
    renderer: Option<WgpuRenderer>,
    camera: Camera,
    scene: Scene,
    start_time: Instant,
}

impl Default for Demo {
    fn default() -> Self {
        let scene = Scene::new("demo")
            .with(
                Drawable::new("cube", Mesh::cube())
                    .transform(Transform::from_position(Vec3::new(0.0, 0.5, 0.0)))
                    .color(Vec4::new(1.0, 0.55, 0.2, 1.0)),
            )
            .with(Drawable::new("floor", Mesh::plane(8.0)).color(Vec4::new(0.3, 0.3, 0.35, 1.0)));

        let mut camera = Camera::perspective(50.0, 16.0 / 9.0, 0.1, 100.0);
        camera.transform.position = Vec3::new(0.0, 2.5, 5.0);
        camera.look_at(Vec3::ZERO);

        Self {
            window: None,
            renderer: None,
            camera,
            scene,
            start_time: Instant::now(),
        }
    }
}

impl Demo {
    fn build_composer(&mut self, width: u32, height: u32) {
        let mut composer = Composer::with_config(ComposerConfig::new().size(width, height));
        composer.add_pass(RenderPass::new());
        composer.add_pass(UnrealBloomPass::new(
            Vec2::new(width as f32, height as f32),
            1.2,
            0.4,
            0.6,
        ));
        composer.add_pass(FilmPass::new());
        composer.add_pass(CopyPass::new().rendering_to_screen());
        self.camera.set_composer(composer);
    }
}

impl ApplicationHandler for Demo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attributes = Window::default_attributes().with_title("afterglow");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        let renderer = match WgpuRenderer::new(window.clone(), &RendererConfig::default()) {
            Ok(renderer) => renderer,
            Err(err) => {
                log::error!("{err}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        self.camera.set_aspect(size.width.max(1) as f32 / size.height.max(1) as f32);
        self.build_composer(size.width.max(1), size.height.max(1));
        self.renderer = Some(renderer);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(renderer) = &mut self.renderer {
                    self.camera.dispose(renderer);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) if size.width > 0 && size.height > 0 => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size.width, size.height);
                }
                self.camera.set_aspect(size.width as f32 / size.height as f32);
                if let Err(err) = self.camera.resize(size.width, size.height) {
                    log::error!("resize failed: {err}");
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                let time = self.start_time.elapsed().as_secs_f32();
                if let Some(cube) = self.scene.drawables.first_mut() {
                    cube.transform.rotation = Quat::from_rotation_y(time);
                }

                if let Err(err) = self.camera.render(renderer, &self.scene) {
                    log::error!("render failed: {err}");
                    event_loop.exit();
                    return;
                }
                renderer.present();

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    // RUST_LOG=afterglow=debug shows composer lifecycle and decode warnings.
    let _ = env_logger::try_init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("failed to create event loop: {err}");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut demo = Demo::default();
    if let Err(err) = event_loop.run_app(&mut demo) {
        log::error!("{err}");
    }
}
