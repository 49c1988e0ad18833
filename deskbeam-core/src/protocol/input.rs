//! Input relay payloads (viewer → host).
//!
//! ```text
//! Viewer ──[InputEvent]──────────────────────► Host
//!   Payload: InputEvent (bincode)
//! ```
//!
//! Coordinates are in host screen pixels; the viewer scales its window
//! coordinates before sending.

use serde::{Deserialize, Serialize};

use crate::message::Message;

// ── InputEvent ────────────────────────────────────────────────────

/// A single control input relayed to the host's input injector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum InputEvent {
    Mouse(MouseEvent),
    Key(KeyEvent),
    /// A system shortcut the viewer cannot synthesise key-by-key.
    Shortcut(Shortcut),
}

impl InputEvent {
    /// Wrap into a wire message.
    pub fn into_message(self) -> Message {
        Message::InputEvent(self)
    }
}

impl From<MouseEvent> for InputEvent {
    fn from(event: MouseEvent) -> Self {
        InputEvent::Mouse(event)
    }
}

impl From<KeyEvent> for InputEvent {
    fn from(event: KeyEvent) -> Self {
        InputEvent::Key(event)
    }
}

// ── Mouse Input ───────────────────────────────────────────────────

/// Mouse input event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MouseEvent {
    /// X position in host screen coordinates.
    pub x: i32,
    /// Y position in host screen coordinates.
    pub y: i32,
    pub kind: MouseEventKind,
    pub button: MouseButton,
    /// Scroll delta (for scroll events).
    pub scroll_delta: i16,
}

impl MouseEvent {
    pub fn move_to(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            kind: MouseEventKind::Move,
            button: MouseButton::None,
            scroll_delta: 0,
        }
    }

    pub fn press(x: i32, y: i32, button: MouseButton) -> Self {
        Self {
            x,
            y,
            kind: MouseEventKind::Press,
            button,
            scroll_delta: 0,
        }
    }

    pub fn release(x: i32, y: i32, button: MouseButton) -> Self {
        Self {
            x,
            y,
            kind: MouseEventKind::Release,
            button,
            scroll_delta: 0,
        }
    }

    pub fn scroll(x: i32, y: i32, delta: i16) -> Self {
        Self {
            x,
            y,
            kind: MouseEventKind::Scroll,
            button: MouseButton::None,
            scroll_delta: delta,
        }
    }
}

/// Kind of mouse event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MouseEventKind {
    Move,
    Press,
    Release,
    Scroll,
    DoubleClick,
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MouseButton {
    None,
    Left,
    Right,
    Middle,
    X1,
    X2,
}

// ── Keyboard Input ────────────────────────────────────────────────

/// Keyboard input event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct KeyEvent {
    /// Virtual key code (platform-specific).
    pub virtual_key: u16,
    /// Hardware scan code.
    pub scan_code: u16,
    pub action: KeyAction,
    /// Modifier flags, see [`key_modifiers`].
    pub modifiers: u8,
}

/// Key action type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

/// Modifier key flags.
pub mod key_modifiers {
    pub const NONE: u8 = 0x00;
    pub const SHIFT: u8 = 0x01;
    pub const CTRL: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const META: u8 = 0x08;
}

impl KeyEvent {
    pub fn press(virtual_key: u16, scan_code: u16, modifiers: u8) -> Self {
        Self {
            virtual_key,
            scan_code,
            action: KeyAction::Press,
            modifiers,
        }
    }

    pub fn release(virtual_key: u16, scan_code: u16, modifiers: u8) -> Self {
        Self {
            virtual_key,
            scan_code,
            action: KeyAction::Release,
            modifiers,
        }
    }

    /// Check if a modifier is set.
    pub fn has_modifier(&self, modifier: u8) -> bool {
        self.modifiers & modifier != 0
    }
}

// ── Shortcuts ─────────────────────────────────────────────────────

/// System key combinations delivered through `InputInjector::send_shortcut`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Shortcut {
    CtrlAltDelete,
    AltTab,
    AltF4,
    WinKey,
    LockScreen,
    ShowDesktop,
    TaskManager,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_modifiers() {
        let event = KeyEvent::press(0x41, 0x1E, key_modifiers::SHIFT | key_modifiers::CTRL);
        assert!(event.has_modifier(key_modifiers::SHIFT));
        assert!(event.has_modifier(key_modifiers::CTRL));
        assert!(!event.has_modifier(key_modifiers::ALT));
    }

    #[test]
    fn key_event_release() {
        let event = KeyEvent::release(0x41, 0x1E, key_modifiers::NONE);
        assert_eq!(event.action, KeyAction::Release);
        assert!(!event.has_modifier(key_modifiers::SHIFT));
    }

    #[test]
    fn input_event_wraps_into_message() {
        let msg = InputEvent::from(MouseEvent::press(500, 300, MouseButton::Left)).into_message();
        assert!(matches!(
            msg,
            Message::InputEvent(InputEvent::Mouse(MouseEvent {
                kind: MouseEventKind::Press,
                ..
            }))
        ));
    }
}
