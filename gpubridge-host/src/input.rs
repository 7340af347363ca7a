//! Mouse and keyboard events forwarded to the guest's input exports.

use std::collections::HashSet;

use gpubridge_abi::names::exports;

use crate::async_bridge::{CallOutcome, GuestExports, GuestValue};

/// Pixels per line for line-mode wheel deltas.
pub const LINE_HEIGHT: f32 = 16.0;
/// Fraction of the viewport scrolled by one page-mode wheel delta.
pub const PAGE_FACTOR: f32 = 0.8;

/// Unit of a wheel delta, numbered as in DOM `WheelEvent.deltaMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WheelDeltaMode {
    #[default]
    Pixel,
    Line,
    Page,
}

impl WheelDeltaMode {
    pub fn from_dom(mode: u32) -> Self {
        match mode {
            1 => Self::Line,
            2 => Self::Page,
            _ => Self::Pixel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Position relative to the frame target's top-left corner.
    MouseMove { x: f32, y: f32 },
    MouseButton { button: u32, down: bool, x: f32, y: f32 },
    Wheel { dx: f32, dy: f32, mode: WheelDeltaMode },
    Key { code: u32, down: bool },
}

/// Delivers input events to the guest.
///
/// Library API for embedders that own a window or another event source:
/// translate each platform event into an [`InputEvent`] and dispatch it
/// against the same guest [`crate::linker::pump`] delivers to. The headless
/// `gpubridge run` loop has no event source and never constructs one.
///
/// A guest without a given input export simply does not receive those
/// events; the first one dropped is logged.
pub struct InputDispatcher {
    width: f32,
    height: f32,
    reported_missing: HashSet<&'static str>,
}

impl InputDispatcher {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
            reported_missing: HashSet::new(),
        }
    }

    /// Viewport used to scale page-mode wheel deltas.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width as f32;
        self.height = height as f32;
    }

    /// Wheel delta in pixels.
    pub fn normalize_wheel(&self, dx: f32, dy: f32, mode: WheelDeltaMode) -> (f32, f32) {
        match mode {
            WheelDeltaMode::Pixel => (dx, dy),
            WheelDeltaMode::Line => (dx * LINE_HEIGHT, dy * LINE_HEIGHT),
            WheelDeltaMode::Page => (dx * self.width * PAGE_FACTOR, dy * self.height * PAGE_FACTOR),
        }
    }

    /// Returns whether the guest received the event.
    pub fn dispatch<E: GuestExports + ?Sized>(&mut self, guest: &mut E, event: InputEvent) -> bool {
        use GuestValue::{F32, I32};

        let (export, args) = match event {
            InputEvent::MouseMove { x, y } => (exports::ON_MOUSE_MOVE, vec![F32(x), F32(y)]),
            InputEvent::MouseButton { button, down, x, y } => (
                exports::ON_MOUSE_BUTTON,
                vec![I32(button), I32(down as u32), F32(x), F32(y)],
            ),
            InputEvent::Wheel { dx, dy, mode } => {
                let (dx, dy) = self.normalize_wheel(dx, dy, mode);
                (exports::ON_MOUSE_WHEEL, vec![F32(dx), F32(dy)])
            }
            InputEvent::Key { code, down } => {
                (exports::ON_KEY_EVENT, vec![I32(code), I32(down as u32)])
            }
        };

        match guest.call(export, &args) {
            Ok(CallOutcome::Called) => true,
            Ok(CallOutcome::Missing) => {
                if self.reported_missing.insert(export) {
                    log::error!("guest export `{export}` not found; dropping input events");
                }
                false
            }
            Err(err) => {
                log::error!("{err}");
                false
            }
        }
    }
}
