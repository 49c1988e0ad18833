//! Console command → protocol conversion.
//!
//! Each stdin line becomes one [`Command`]:
//!
//! ```text
//! move X Y            mouse move
//! click X Y [left|right|middle]
//! scroll X Y DELTA
//! key VK [SCAN]       key press and release
//! shortcut NAME       alt-tab, alt-f4, ctrl-alt-del, win, lock, desktop, taskmgr
//! clip TEXT           put TEXT on the host clipboard
//! chat TEXT           send a chat message
//! quit
//! ```

use deskbeam_core::protocol::{
    ChatMessage, ClipboardData, InputEvent, KeyEvent, MouseButton, MouseEvent, Shortcut,
};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Input events to send in order.
    Input(Vec<InputEvent>),
    Clipboard(ClipboardData),
    Chat(String),
    Quit,
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "quit" | "exit" => Command::Quit,
        "move" => {
            let (x, y) = point(&args)?;
            Command::Input(vec![MouseEvent::move_to(x, y).into()])
        }
        "click" => {
            let (x, y) = point(&args)?;
            let button = match args.get(2).copied().unwrap_or("left") {
                "left" => MouseButton::Left,
                "right" => MouseButton::Right,
                "middle" => MouseButton::Middle,
                other => return Err(format!("unknown button {other:?}")),
            };
            Command::Input(vec![
                MouseEvent::press(x, y, button).into(),
                MouseEvent::release(x, y, button).into(),
            ])
        }
        "scroll" => {
            let (x, y) = point(&args)?;
            let delta = number::<i16>(args.get(2), "scroll delta")?;
            Command::Input(vec![MouseEvent::scroll(x, y, delta).into()])
        }
        "key" => {
            let vk = number::<u16>(args.first(), "virtual key")?;
            let scan = match args.get(1) {
                Some(_) => number::<u16>(args.get(1), "scan code")?,
                None => 0,
            };
            Command::Input(vec![
                KeyEvent::press(vk, scan, 0).into(),
                KeyEvent::release(vk, scan, 0).into(),
            ])
        }
        "shortcut" => {
            let name = args.first().ok_or("shortcut needs a name")?;
            Command::Input(vec![InputEvent::Shortcut(shortcut(name)?)])
        }
        "clip" if !rest.is_empty() => Command::Clipboard(ClipboardData::Text(rest.to_string())),
        "chat" if !rest.is_empty() => Command::Chat(rest.to_string()),
        "clip" | "chat" => return Err(format!("{verb} needs some text")),
        other => return Err(format!("unknown command {other:?}")),
    };
    Ok(Some(command))
}

/// Build a chat message from this viewer.
pub fn chat_message(sender: &str, text: String) -> ChatMessage {
    ChatMessage::new(uuid::Uuid::new_v4().to_string(), sender, text)
}

fn point(args: &[&str]) -> Result<(i32, i32), String> {
    Ok((number(args.first(), "x")?, number(args.get(1), "y")?))
}

fn number<T: std::str::FromStr>(arg: Option<&&str>, what: &str) -> Result<T, String> {
    let arg = arg.ok_or_else(|| format!("missing {what}"))?;
    arg.parse().map_err(|_| format!("bad {what} {arg:?}"))
}

fn shortcut(name: &str) -> Result<Shortcut, String> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "alt-tab" => Shortcut::AltTab,
        "alt-f4" => Shortcut::AltF4,
        "ctrl-alt-del" => Shortcut::CtrlAltDelete,
        "win" => Shortcut::WinKey,
        "lock" => Shortcut::LockScreen,
        "desktop" => Shortcut::ShowDesktop,
        "taskmgr" => Shortcut::TaskManager,
        other => return Err(format!("unknown shortcut {other:?}")),
    })
}
