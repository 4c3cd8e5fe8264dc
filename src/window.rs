//! Window management using winit

use std::sync::Arc;

use glam::Vec2;
use thiserror::Error;
use winit::{
    dpi::PhysicalSize,
    error::{EventLoopError, OsError},
    event::{DeviceEvent, ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::scene::CameraInput;

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Event loop error: {0}")]
    EventLoop(#[from] EventLoopError),
    #[error("Failed to create window: {0}")]
    Os(#[from] OsError),
}

/// Wrapper around winit window with the per-tick input state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
    input: CameraInput,
    pressed: Vec<KeyCode>,
}

impl Window {
    /// Create a new resizable window with the given title and dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, WindowError> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true)
            .build(event_loop)?;
        let size = window.inner_size();

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
            resized: false,
            close_requested: false,
            input: CameraInput::new(),
            pressed: Vec::new(),
        })
    }

    /// Get the raw window for backend initialization
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since last tick
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Camera input accumulated since the last tick
    pub fn camera_input(&self) -> &CameraInput {
        &self.input
    }

    /// Whether `key` went down since the last tick
    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Forget per-tick state: deltas, key presses and the resize flag
    pub fn end_tick(&mut self) {
        self.input.reset_deltas();
        self.pressed.clear();
        self.resized = false;
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                let down = *state == ElementState::Pressed;
                if down && !repeat {
                    self.pressed.push(*code);
                }
                self.set_key(*code, down);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                self.input.mouse_look_active = *state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.input.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / 40.0,
                };
            }
            _ => {}
        }
    }

    /// Handle raw device events (mouse motion)
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.mouse_delta += Vec2::new(*dx as f32, *dy as f32);
        }
    }

    fn set_key(&mut self, code: KeyCode, down: bool) {
        match code {
            KeyCode::KeyW => self.input.forward = down,
            KeyCode::KeyS => self.input.backward = down,
            KeyCode::KeyA => self.input.left = down,
            KeyCode::KeyD => self.input.right = down,
            KeyCode::KeyE => self.input.up = down,
            KeyCode::KeyQ => self.input.down = down,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => self.input.sprint = down,
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Create the event loop and a window on it
pub fn create(title: &str, width: u32, height: u32) -> Result<(EventLoop<()>, Window), WindowError> {
    let event_loop = EventLoop::new()?;
    let window = Window::new(&event_loop, title, width, height)?;
    Ok((event_loop, window))
}

/// Run the event loop, calling `tick` once per iteration until it returns
/// false or the window is closed
pub fn run<F>(event_loop: EventLoop<()>, mut window: Window, mut tick: F) -> Result<(), WindowError>
where
    F: FnMut(&mut Window) -> bool + 'static,
{
    event_loop.run(move |event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);

                if let WindowEvent::CloseRequested = event {
                    elwt.exit();
                }
            }
            Event::DeviceEvent { event, .. } => {
                window.handle_device_event(&event);
            }
            Event::AboutToWait => {
                if !tick(&mut window) {
                    elwt.exit();
                }
                window.end_tick();
                window.request_redraw();
            }
            _ => {}
        }
    })?;
    Ok(())
}
