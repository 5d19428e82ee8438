// main.rs — window, event loop and wiring for the unwarp viewer

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use anyhow::{Context, Result};
use clap::Parser;
use equiangular_unwarp::config::UnwarpConfig;
use equiangular_unwarp::driver::{FrameDriver, TickOutcome};
use equiangular_unwarp::gpu::{GpuContext, GpuRenderer};
use equiangular_unwarp::i18n;
use equiangular_unwarp::input::InputEvent;
use equiangular_unwarp::render::RenderContext;
use equiangular_unwarp::video::FrameSequence;
use std::path::PathBuf;
use std::sync::Arc;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, WindowBuilder},
};

/// Pixels of trackpad scroll counted as one wheel line.
const PIXELS_PER_LINE: f32 = 20.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live unwarp viewer for equiangular mirror video", long_about = None)]
struct Args {
    /// JSON file overriding mirror, image and view parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of frames (played in name order) or a single image
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Playback rate of the frame sequence
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// UI language code (falls back to UNWARP_LANG, then English)
    #[arg(long)]
    lang: Option<String>,

    /// Mirror the unwarped scene horizontally
    #[arg(long)]
    flip: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    i18n::init(i18n::resolve_lang(args.lang.as_deref()));

    let mut config = match &args.config {
        Some(path) => UnwarpConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => UnwarpConfig::default(),
    };
    if args.flip {
        config.horizontal_scale = -1.0;
    }
    config.validate()?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let frames = match args.frames {
        Some(path) => path,
        None => rfd::FileDialog::new()
            .set_title(&i18n::tr("dialog.pick_frames"))
            .pick_folder()
            .with_context(|| i18n::tr("error.no_frames"))?,
    };

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let (capabilities, gpu) = pollster::block_on(GpuContext::probe(&window));
    let gpu = match (gpu, &capabilities.render_context) {
        (Some(gpu), _) => gpu,
        (None, RenderContext::Unavailable { reason }) => {
            report_no_gpu(reason);
            return Ok(());
        }
        (None, RenderContext::Available { .. }) => {
            report_no_gpu("adapter vanished after probing");
            return Ok(());
        }
    };

    let video = FrameSequence::open(&frames, args.fps, capabilities.max_texture_dimension)?;
    let renderer = pollster::block_on(GpuRenderer::new(window.clone(), gpu))?;
    let mut driver = FrameDriver::new(config, capabilities, renderer, video)?;
    let size = window.inner_size();
    driver.resize(size.width, size.height);
    driver.start()?;

    let input = driver.input();
    let mut fullscreen = false;
    let mut cursor = (0.0f32, 0.0f32);

    event_loop.run(move |event, _, control_flow| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                driver.stop();
                *control_flow = ControlFlow::Exit;
            }

            WindowEvent::Resized(new_size) => {
                driver.renderer_mut().resize(new_size);
                driver.resize(new_size.width, new_size.height);
            }
            WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                driver.renderer_mut().resize(*new_inner_size);
                driver.resize(new_inner_size.width, new_inner_size.height);
            }

            WindowEvent::KeyboardInput { input: key, .. } if key.state == ElementState::Pressed => {
                match key.virtual_keycode {
                    Some(VirtualKeyCode::Escape) => {
                        driver.stop();
                        *control_flow = ControlFlow::Exit;
                    }
                    Some(VirtualKeyCode::P) => {
                        if driver.is_running() {
                            driver.stop();
                        } else if let Err(e) = driver.start() {
                            log::error!("{e}");
                        } else {
                            window.request_redraw();
                        }
                    }
                    Some(VirtualKeyCode::F11) => {
                        fullscreen = !fullscreen;
                        window.set_fullscreen(fullscreen.then_some(Fullscreen::Borderless(None)));
                    }
                    _ => {}
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                if state == ElementState::Pressed {
                    input.handle(InputEvent::PointerDown {
                        x: cursor.0,
                        y: cursor.1,
                    });
                } else {
                    input.handle(InputEvent::PointerUp);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                cursor = (position.x as f32, position.y as f32);
                input.handle(InputEvent::PointerMove {
                    x: cursor.0,
                    y: cursor.1,
                });
            }

            WindowEvent::CursorLeft { .. } => input.handle(InputEvent::PointerUp),

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
                input.handle(InputEvent::Wheel { lines });
            }

            _ => {}
        },

        Event::RedrawRequested(_) => match driver.tick() {
            Ok(TickOutcome::Continue) => {}
            Ok(TickOutcome::Stopped) => log::debug!("frame loop paused"),
            Err(e) => log::warn!("frame skipped: {e}"),
        },

        Event::MainEventsCleared => {
            if driver.is_running() {
                window.request_redraw();
                *control_flow = ControlFlow::Poll;
            } else if *control_flow != ControlFlow::Exit {
                *control_flow = ControlFlow::Wait;
            }
        }

        _ => {}
    })
}

fn report_no_gpu(reason: &str) {
    let message = i18n::tr_with("error.no_gpu", &[("reason", reason.to_string())]);
    log::error!("{message}");
    let _ = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(&i18n::tr("app.title"))
        .set_description(&message)
        .show();
}
