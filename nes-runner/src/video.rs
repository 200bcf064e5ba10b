//! Window, framebuffer presentation and UI-thread input capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use machine_nes::controller::{PadHandle, ZapperHandle};
use machine_nes::{SCREEN_HEIGHT, SCREEN_WIDTH};
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::input::{map_keycode, GamepadInput};
use crate::EmuCommand;

/// The UI-thread side of the runner: draws published frames and posts
/// input to the emulation thread through atomics and the command channel.
pub struct App {
    title: String,
    scale: u32,
    window: Option<&'static Window>,
    pixels: Option<Pixels<'static>>,
    shared_frame: Arc<Mutex<Vec<u32>>>,
    pad: PadHandle,
    zapper: ZapperHandle,
    gamepad: Option<GamepadInput>,
    keyboard_bits: u8,
    commands: Sender<EmuCommand>,
    stop: Arc<AtomicBool>,
}

impl App {
    pub fn new(
        title: String,
        scale: u32,
        shared_frame: Arc<Mutex<Vec<u32>>>,
        pad: PadHandle,
        zapper: ZapperHandle,
        commands: Sender<EmuCommand>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            title,
            scale,
            window: None,
            pixels: None,
            shared_frame,
            pad,
            zapper,
            gamepad: GamepadInput::new(),
            keyboard_bits: 0,
            commands,
            stop,
        }
    }

    fn handle_key(&mut self, keycode: KeyCode, pressed: bool) {
        if let Some(button) = map_keycode(keycode) {
            if pressed {
                self.keyboard_bits |= button;
            } else {
                self.keyboard_bits &= !button;
            }
            // Without a gamepad the keyboard writes the pad directly; with
            // one, the per-frame poll merges both.
            if self.gamepad.is_none() {
                self.pad.set_state(self.keyboard_bits);
            }
        }

        if pressed {
            match keycode {
                KeyCode::F2 => drop(self.commands.send(EmuCommand::Reset)),
                KeyCode::F5 => drop(self.commands.send(EmuCommand::SaveState)),
                KeyCode::F8 => drop(self.commands.send(EmuCommand::LoadState)),
                _ => {}
            }
        }
    }

    fn present(&mut self, event_loop: &ActiveEventLoop) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };

        {
            let shared = self.shared_frame.lock().unwrap();
            let frame = pixels.frame_mut();
            for (i, &argb) in shared.iter().enumerate() {
                let offset = i * 4;
                frame[offset] = ((argb >> 16) & 0xFF) as u8;
                frame[offset + 1] = ((argb >> 8) & 0xFF) as u8;
                frame[offset + 2] = (argb & 0xFF) as u8;
                frame[offset + 3] = 0xFF;
            }
        }

        if let Err(err) = pixels.render() {
            eprintln!("Render error: {err}");
            self.stop.store(true, Ordering::Relaxed);
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let size = LogicalSize::new(SCREEN_WIDTH * self.scale, SCREEN_HEIGHT * self.scale);
        let attrs = WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(size);

        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window: &'static Window = Box::leak(Box::new(window));
                let inner = window.inner_size();
                let surface = SurfaceTexture::new(inner.width, inner.height, window);
                match Pixels::new(SCREEN_WIDTH, SCREEN_HEIGHT, surface) {
                    Ok(pixels) => self.pixels = Some(pixels),
                    Err(err) => {
                        eprintln!("Failed to create pixel surface: {err}");
                        self.stop.store(true, Ordering::Relaxed);
                        event_loop.exit();
                        return;
                    }
                }
                self.window = Some(window);
            }
            Err(err) => {
                eprintln!("Failed to create window: {err}");
                self.stop.store(true, Ordering::Relaxed);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.stop.store(true, Ordering::Relaxed);
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(pixels) = self.pixels.as_mut() {
                        pixels.resize_surface(size.width, size.height).ok();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    if keycode == KeyCode::Escape && event.state == ElementState::Pressed {
                        self.stop.store(true, Ordering::Relaxed);
                        event_loop.exit();
                        return;
                    }
                    self.handle_key(keycode, event.state == ElementState::Pressed);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                if let Some(pixels) = self.pixels.as_ref() {
                    match pixels.window_pos_to_pixel((position.x as f32, position.y as f32)) {
                        Ok((x, y)) => self.zapper.aim_at(x as i32, y as i32),
                        Err(_) => self.zapper.aim_at(-1, -1),
                    }
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.zapper.set_trigger(state == ElementState::Pressed);
                }
            }

            WindowEvent::RedrawRequested => {
                self.present(event_loop);
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let keyboard_bits = self.keyboard_bits;
        if let Some(gamepad) = self.gamepad.as_mut() {
            gamepad.poll(&self.pad, keyboard_bits);
        }
        if let Some(window) = self.window {
            window.request_redraw();
        }
    }
}
