//! Input event model
//!
//! A closed set of keyboard and mouse events. Each variant encodes to two
//! forms: attributes on a structured document node, and a compact
//! `|`-delimited token string whose variant must be known out of band.

use crate::codec::{write_token, Node, TokenReader};
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discriminator of a [`LogEvent`] variant, written as the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Key,
    MouseMoved,
    MouseDragged,
    MouseClicked,
    MousePressed,
    MouseWheelMoved,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Key,
        EventKind::MouseMoved,
        EventKind::MouseDragged,
        EventKind::MouseClicked,
        EventKind::MousePressed,
        EventKind::MouseWheelMoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Key => "Key",
            EventKind::MouseMoved => "MouseMoved",
            EventKind::MouseDragged => "MouseDragged",
            EventKind::MouseClicked => "MouseClicked",
            EventKind::MousePressed => "MousePressed",
            EventKind::MouseWheelMoved => "MouseWheelMoved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownEventType(s.to_string()))
    }
}

/// Key event subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyEventType {
    Pressed,
    Released,
    Typed,
}

impl KeyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEventType::Pressed => "PRESSED",
            KeyEventType::Released => "RELEASED",
            KeyEventType::Typed => "TYPED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "PRESSED" => Some(KeyEventType::Pressed),
            "RELEASED" => Some(KeyEventType::Released),
            "TYPED" => Some(KeyEventType::Typed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Epoch milliseconds
    pub time: i64,
    pub code: i32,
    pub kind: KeyEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ch: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseMovedEvent {
    pub time: i64,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseDraggedEvent {
    pub time: i64,
    pub x: i32,
    pub y: i32,
    /// Button held during the drag
    pub button: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseClickedEvent {
    pub time: i64,
    pub x: i32,
    pub y: i32,
    pub button: i32,
    pub clicks: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MousePressedEvent {
    pub time: i64,
    pub x: i32,
    pub y: i32,
    pub button: i32,
}

impl MousePressedEvent {
    pub fn button_name(&self) -> String {
        button_name(self.button)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseWheelMovedEvent {
    pub time: i64,
    pub x: i32,
    pub y: i32,
    /// Positive scrolls down, negative scrolls up
    pub rotation: i32,
}

/// Scroll direction derived from the sign of a wheel rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
}

impl MouseWheelMovedEvent {
    pub fn direction(&self) -> WheelDirection {
        if self.rotation > 0 {
            WheelDirection::Down
        } else {
            WheelDirection::Up
        }
    }
}

/// Human-readable mouse button name for a native button code.
pub fn button_name(code: i32) -> String {
    match code {
        1 => "left".to_string(),
        2 => "right".to_string(),
        3 => "middle".to_string(),
        n => format!("button {}", n),
    }
}

/// A single captured input occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogEvent {
    Key(KeyEvent),
    MouseMoved(MouseMovedEvent),
    MouseDragged(MouseDraggedEvent),
    MouseClicked(MouseClickedEvent),
    MousePressed(MousePressedEvent),
    MouseWheelMoved(MouseWheelMovedEvent),
}

// Attribute names
const ATTR_TYPE: &str = "type";
const ATTR_TIME: &str = "time";
const ATTR_X: &str = "x";
const ATTR_Y: &str = "y";
const ATTR_CODE: &str = "code";
const ATTR_KTYPE: &str = "ktype";
const ATTR_CHAR: &str = "char";
const ATTR_BCODE: &str = "bcode";
const ATTR_BNAME: &str = "bname";
const ATTR_CLICKS: &str = "clicks";
const ATTR_ROT: &str = "rot";

impl LogEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LogEvent::Key(_) => EventKind::Key,
            LogEvent::MouseMoved(_) => EventKind::MouseMoved,
            LogEvent::MouseDragged(_) => EventKind::MouseDragged,
            LogEvent::MouseClicked(_) => EventKind::MouseClicked,
            LogEvent::MousePressed(_) => EventKind::MousePressed,
            LogEvent::MouseWheelMoved(_) => EventKind::MouseWheelMoved,
        }
    }

    pub fn time(&self) -> i64 {
        match self {
            LogEvent::Key(e) => e.time,
            LogEvent::MouseMoved(e) => e.time,
            LogEvent::MouseDragged(e) => e.time,
            LogEvent::MouseClicked(e) => e.time,
            LogEvent::MousePressed(e) => e.time,
            LogEvent::MouseWheelMoved(e) => e.time,
        }
    }

    /// Screen position, for mouse events only.
    pub fn position(&self) -> Option<(i32, i32)> {
        match self {
            LogEvent::Key(_) => None,
            LogEvent::MouseMoved(e) => Some((e.x, e.y)),
            LogEvent::MouseDragged(e) => Some((e.x, e.y)),
            LogEvent::MouseClicked(e) => Some((e.x, e.y)),
            LogEvent::MousePressed(e) => Some((e.x, e.y)),
            LogEvent::MouseWheelMoved(e) => Some((e.x, e.y)),
        }
    }

    /// Write this event's attributes onto `node`: the common fields first,
    /// then the variant's own.
    pub fn to_node(&self, node: &mut Node) {
        node.set(ATTR_TYPE, self.kind().as_str());
        node.set(ATTR_TIME, self.time());
        if let Some((x, y)) = self.position() {
            node.set(ATTR_X, x).set(ATTR_Y, y);
        }

        match self {
            LogEvent::Key(e) => {
                node.set(ATTR_CODE, e.code).set(ATTR_KTYPE, e.kind.as_str());
                if let Some(c) = e.ch {
                    node.set(ATTR_CHAR, c as u32);
                }
            }
            LogEvent::MouseMoved(_) => {}
            LogEvent::MouseDragged(e) => {
                node.set(ATTR_BCODE, e.button);
            }
            LogEvent::MouseClicked(e) => {
                node.set(ATTR_BCODE, e.button).set(ATTR_CLICKS, e.clicks);
            }
            LogEvent::MousePressed(e) => {
                node.set(ATTR_BCODE, e.button).set(ATTR_BNAME, e.button_name());
            }
            LogEvent::MouseWheelMoved(e) => {
                node.set(ATTR_ROT, e.rotation);
            }
        }
    }

    /// Inverse of [`LogEvent::to_node`].
    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        let kind: EventKind = node.require(ATTR_TYPE)?.parse()?;
        let time = node.require_parse(ATTR_TIME)?;

        if kind == EventKind::Key {
            let ktype = node.require(ATTR_KTYPE)?;
            let ch = match node.get(ATTR_CHAR) {
                Some(_) => Some(decode_char(node.require_parse(ATTR_CHAR)?, ATTR_CHAR)?),
                None => None,
            };
            return Ok(LogEvent::Key(KeyEvent {
                time,
                code: node.require_parse(ATTR_CODE)?,
                kind: KeyEventType::parse(ktype).ok_or_else(|| DecodeError::InvalidValue {
                    attr: ATTR_KTYPE.to_string(),
                    value: ktype.to_string(),
                })?,
                ch,
            }));
        }

        let x = node.require_parse(ATTR_X)?;
        let y = node.require_parse(ATTR_Y)?;
        Ok(match kind {
            EventKind::Key => unreachable!("handled above"),
            EventKind::MouseMoved => LogEvent::MouseMoved(MouseMovedEvent { time, x, y }),
            EventKind::MouseDragged => LogEvent::MouseDragged(MouseDraggedEvent {
                time,
                x,
                y,
                button: node.require_parse(ATTR_BCODE)?,
            }),
            EventKind::MouseClicked => LogEvent::MouseClicked(MouseClickedEvent {
                time,
                x,
                y,
                button: node.require_parse(ATTR_BCODE)?,
                clicks: node.require_parse(ATTR_CLICKS)?,
            }),
            // bname is derived from bcode, the stored text is not trusted
            EventKind::MousePressed => LogEvent::MousePressed(MousePressedEvent {
                time,
                x,
                y,
                button: node.require_parse(ATTR_BCODE)?,
            }),
            EventKind::MouseWheelMoved => LogEvent::MouseWheelMoved(MouseWheelMovedEvent {
                time,
                x,
                y,
                rotation: node.require_parse(ATTR_ROT)?,
            }),
        })
    }

    /// Append the compact encoding: variant fields first, common fields last.
    pub fn write(&self, out: &mut String) {
        match self {
            LogEvent::Key(e) => {
                write_token(out, e.code);
                write_token(out, e.kind.as_str());
                match e.ch {
                    Some(c) => write_token(out, c as u32),
                    None => write_token(out, ""),
                }
            }
            LogEvent::MouseMoved(_) => {}
            LogEvent::MouseDragged(e) => write_token(out, e.button),
            LogEvent::MouseClicked(e) => {
                write_token(out, e.button);
                write_token(out, e.clicks);
            }
            LogEvent::MousePressed(e) => write_token(out, e.button),
            LogEvent::MouseWheelMoved(e) => write_token(out, e.rotation),
        }

        if let Some((x, y)) = self.position() {
            write_token(out, x);
            write_token(out, y);
        }
        write_token(out, self.time());
    }

    pub fn to_tokens(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    /// Read one event of `kind` from a reader positioned at its first field.
    pub fn read(kind: EventKind, tokens: &mut TokenReader<'_>) -> Result<Self, DecodeError> {
        match kind {
            EventKind::Key => {
                let code = tokens.next_parse("code")?;
                let ktype = tokens.next_str("ktype")?;
                let kind = KeyEventType::parse(ktype).ok_or_else(|| DecodeError::InvalidToken {
                    field: "ktype",
                    token: ktype.to_string(),
                })?;
                let ch = match tokens.next_str("char")? {
                    "" => None,
                    raw => {
                        let scalar = raw.parse().map_err(|_| DecodeError::InvalidToken {
                            field: "char",
                            token: raw.to_string(),
                        })?;
                        Some(decode_char(scalar, "char")?)
                    }
                };
                let time = tokens.next_parse("time")?;
                Ok(LogEvent::Key(KeyEvent { time, code, kind, ch }))
            }
            EventKind::MouseMoved => {
                let (x, y, time) = read_mouse_base(tokens)?;
                Ok(LogEvent::MouseMoved(MouseMovedEvent { time, x, y }))
            }
            EventKind::MouseDragged => {
                let button = tokens.next_parse("bcode")?;
                let (x, y, time) = read_mouse_base(tokens)?;
                Ok(LogEvent::MouseDragged(MouseDraggedEvent { time, x, y, button }))
            }
            EventKind::MouseClicked => {
                let button = tokens.next_parse("bcode")?;
                let clicks = tokens.next_parse("clicks")?;
                let (x, y, time) = read_mouse_base(tokens)?;
                Ok(LogEvent::MouseClicked(MouseClickedEvent {
                    time,
                    x,
                    y,
                    button,
                    clicks,
                }))
            }
            EventKind::MousePressed => {
                let button = tokens.next_parse("bcode")?;
                let (x, y, time) = read_mouse_base(tokens)?;
                Ok(LogEvent::MousePressed(MousePressedEvent { time, x, y, button }))
            }
            EventKind::MouseWheelMoved => {
                let rotation = tokens.next_parse("rot")?;
                let (x, y, time) = read_mouse_base(tokens)?;
                Ok(LogEvent::MouseWheelMoved(MouseWheelMovedEvent {
                    time,
                    x,
                    y,
                    rotation,
                }))
            }
        }
    }

    pub fn from_tokens(kind: EventKind, input: &str) -> Result<Self, DecodeError> {
        Self::read(kind, &mut TokenReader::new(input))
    }
}

fn read_mouse_base(tokens: &mut TokenReader<'_>) -> Result<(i32, i32, i64), DecodeError> {
    let x = tokens.next_parse("x")?;
    let y = tokens.next_parse("y")?;
    let time = tokens.next_parse("time")?;
    Ok((x, y, time))
}

fn decode_char(scalar: u32, field: &'static str) -> Result<char, DecodeError> {
    char::from_u32(scalar).ok_or_else(|| DecodeError::InvalidValue {
        attr: field.to_string(),
        value: scalar.to_string(),
    })
}

fn pos(x: i32, y: i32) -> String {
    format!("({}, {})", x, y)
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::Key(e) => {
                let action = match e.kind {
                    KeyEventType::Pressed => "pressed",
                    KeyEventType::Released => "released",
                    KeyEventType::Typed => "typed",
                };
                match e.ch {
                    Some(c) if !c.is_control() => {
                        write!(f, "Key {} - '{}' (code {}).", action, c, e.code)
                    }
                    _ => write!(f, "Key {} - code {}.", action, e.code),
                }
            }
            LogEvent::MouseMoved(e) => write!(f, "Mouse moved - to {}.", pos(e.x, e.y)),
            LogEvent::MouseDragged(e) => write!(
                f,
                "Mouse dragged - {} button to {}.",
                button_name(e.button),
                pos(e.x, e.y)
            ),
            LogEvent::MouseClicked(e) => write!(
                f,
                "Mouse clicked - {} button {} time{} at {}.",
                button_name(e.button),
                e.clicks,
                if e.clicks == 1 { "" } else { "s" },
                pos(e.x, e.y)
            ),
            LogEvent::MousePressed(e) => write!(
                f,
                "Mouse pressed - {} at {}.",
                e.button_name(),
                pos(e.x, e.y)
            ),
            LogEvent::MouseWheelMoved(e) => write!(
                f,
                "Mouse wheel moved - at {} {} units {}.",
                pos(e.x, e.y),
                e.rotation.unsigned_abs(),
                match e.direction() {
                    WheelDirection::Down => "down",
                    WheelDirection::Up => "up",
                }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn node_round_trip(event: &LogEvent) -> LogEvent {
        let mut node = Node::new("event");
        event.to_node(&mut node);
        LogEvent::from_node(&node).unwrap()
    }

    fn token_round_trip(event: &LogEvent) -> LogEvent {
        LogEvent::from_tokens(event.kind(), &event.to_tokens()).unwrap()
    }

    fn any_event() -> impl Strategy<Value = LogEvent> {
        let key = (
            any::<i64>(),
            any::<i32>(),
            prop_oneof![
                Just(KeyEventType::Pressed),
                Just(KeyEventType::Released),
                Just(KeyEventType::Typed)
            ],
            proptest::option::of(any::<char>()),
        )
            .prop_map(|(time, code, kind, ch)| LogEvent::Key(KeyEvent { time, code, kind, ch }));
        let base = (any::<i64>(), any::<i32>(), any::<i32>());
        prop_oneof![
            key,
            base.clone()
                .prop_map(|(time, x, y)| LogEvent::MouseMoved(MouseMovedEvent { time, x, y })),
            (base.clone(), 0..i32::MAX).prop_map(|((time, x, y), button)| {
                LogEvent::MouseDragged(MouseDraggedEvent { time, x, y, button })
            }),
            (base.clone(), 0..i32::MAX, 0..i32::MAX).prop_map(|((time, x, y), button, clicks)| {
                LogEvent::MouseClicked(MouseClickedEvent { time, x, y, button, clicks })
            }),
            (base.clone(), 0..i32::MAX).prop_map(|((time, x, y), button)| {
                LogEvent::MousePressed(MousePressedEvent { time, x, y, button })
            }),
            (base, any::<i32>()).prop_map(|((time, x, y), rotation)| {
                LogEvent::MouseWheelMoved(MouseWheelMovedEvent { time, x, y, rotation })
            }),
        ]
    }

    proptest! {
        #[test]
        fn node_encoding_round_trips(event in any_event()) {
            prop_assert_eq!(node_round_trip(&event), event);
        }

        #[test]
        fn token_encoding_round_trips(event in any_event()) {
            let tokens = event.to_tokens();
            let mut reader = TokenReader::new(&tokens);
            let decoded = LogEvent::read(event.kind(), &mut reader).unwrap();
            prop_assert!(reader.is_exhausted());
            prop_assert_eq!(decoded, event);
        }
    }

    #[test]
    fn wheel_tokens_put_rotation_first() {
        let event = LogEvent::MouseWheelMoved(MouseWheelMovedEvent {
            time: 1_700_000_000_000,
            x: 10,
            y: 20,
            rotation: -3,
        });
        assert_eq!(event.to_tokens(), "-3|10|20|1700000000000|");
        assert_eq!(token_round_trip(&event), event);
    }

    #[test]
    fn key_with_pipe_character_survives_tokens() {
        let event = LogEvent::Key(KeyEvent {
            time: 5,
            code: 220,
            kind: KeyEventType::Typed,
            ch: Some('|'),
        });
        assert_eq!(event.to_tokens(), "220|TYPED|124|5|");
        assert_eq!(token_round_trip(&event), event);
    }

    #[test]
    fn wheel_direction_follows_sign() {
        let mut wheel = MouseWheelMovedEvent { time: 0, x: 1, y: 2, rotation: 3 };
        assert_eq!(
            LogEvent::MouseWheelMoved(wheel.clone()).to_string(),
            "Mouse wheel moved - at (1, 2) 3 units down."
        );
        wheel.rotation = -2;
        assert_eq!(wheel.direction(), WheelDirection::Up);
        assert_eq!(
            LogEvent::MouseWheelMoved(wheel).to_string(),
            "Mouse wheel moved - at (1, 2) 2 units up."
        );
    }

    #[test]
    fn pressed_button_name_ignores_stored_text() {
        let mut node = Node::new("event");
        node.set("type", "MousePressed")
            .set("time", 1)
            .set("x", 0)
            .set("y", 0)
            .set("bcode", 2)
            .set("bname", "something else");
        let LogEvent::MousePressed(e) = LogEvent::from_node(&node).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(e.button_name(), "right");
    }

    #[test]
    fn from_node_rejects_bad_attributes() {
        let mut node = Node::new("event");
        node.set("type", "MouseMoved").set("time", 1).set("x", "left");
        assert!(matches!(
            LogEvent::from_node(&node),
            Err(DecodeError::InvalidValue { .. })
        ));

        let mut node = Node::new("event");
        node.set("type", "MouseWheelMoved").set("time", 1).set("x", 1).set("y", 1);
        assert!(matches!(
            LogEvent::from_node(&node),
            Err(DecodeError::MissingAttribute { .. })
        ));

        let mut node = Node::new("event");
        node.set("type", "Teleport").set("time", 1);
        assert_eq!(
            LogEvent::from_node(&node),
            Err(DecodeError::UnknownEventType("Teleport".into()))
        );
    }

    #[test]
    fn equal_events_hash_equal() {
        let a = LogEvent::MouseClicked(MouseClickedEvent { time: 9, x: 1, y: 2, button: 1, clicks: 2 });
        let b = a.clone();
        let hash = |e: &LogEvent| {
            let mut h = DefaultHasher::new();
            e.hash(&mut h);
            h.finish()
        };
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_eq!(a.to_string(), "Mouse clicked - left button 2 times at (1, 2).");
    }
}
