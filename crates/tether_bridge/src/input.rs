//! Input forwarding over the `event` command.
//!
//! ```text
//! event SOH keyDown SOH Space
//! event SOH pointerDown SOH 0
//! event SOH pointerHit SOH 150,1.5,0,2,ground SOH 151,0,0,0
//! ```
//!
//! Each `pointerHit` argument is one hit: `handle,x,y,z[,layer...]`.

use tether_shared::{InputEvent, ObjectHandle, PointerHit, Vec3};

use crate::error::DecodeError;
use crate::protocol::commands::EVENT as EVENT_COMMAND;
use crate::protocol::{parse_number, Arg};

/// Parses the arguments of an `event` command.
///
/// `is_known` filters pointer hits: hits on handles it rejects are dropped,
/// and a hit list left empty yields `Ok(None)`.
pub fn parse_input_event<S, F>(args: &[S], is_known: F) -> Result<Option<InputEvent>, DecodeError>
where
    S: AsRef<str>,
    F: Fn(ObjectHandle) -> bool,
{
    let Some(kind) = args.first().map(AsRef::as_ref) else {
        return Err(DecodeError::MissingArguments {
            command: EVENT_COMMAND.to_owned(),
            expected: 1,
            got: 0,
        });
    };
    let arg = |i: usize| -> Result<&str, DecodeError> {
        args.get(i)
            .map(AsRef::as_ref)
            .ok_or_else(|| DecodeError::MissingArguments {
                command: format!("{EVENT_COMMAND} {kind}"),
                expected: i + 1,
                got: args.len(),
            })
    };

    let event = match kind {
        "keyDown" => InputEvent::KeyDown {
            key: arg(1)?.to_owned(),
        },
        "keyUp" => InputEvent::KeyUp {
            key: arg(1)?.to_owned(),
        },
        "pointerDown" => InputEvent::PointerDown {
            button: parse_button(arg(1)?)?,
        },
        "pointerUp" => InputEvent::PointerUp {
            button: parse_button(arg(1)?)?,
        },
        "pointerHit" => {
            let mut hits = Vec::with_capacity(args.len().saturating_sub(1));
            for raw in &args[1..] {
                let hit = parse_hit(raw.as_ref())?;
                if is_known(hit.handle) {
                    hits.push(hit);
                }
            }
            if hits.is_empty() {
                return Ok(None);
            }
            InputEvent::PointerHit { hits }
        }
        name => InputEvent::Custom {
            name: name.to_owned(),
            args: args[1..].iter().map(|s| s.as_ref().to_owned()).collect(),
        },
    };
    Ok(Some(event))
}

/// Arguments of the `event` command carrying `event`.
#[must_use]
pub fn input_event_args(event: &InputEvent) -> Vec<Arg> {
    match event {
        InputEvent::KeyDown { key } => vec![Arg::from("keyDown"), Arg::from(key)],
        InputEvent::KeyUp { key } => vec![Arg::from("keyUp"), Arg::from(key)],
        InputEvent::PointerDown { button } => vec![Arg::from("pointerDown"), Arg::from(*button)],
        InputEvent::PointerUp { button } => vec![Arg::from("pointerUp"), Arg::from(*button)],
        InputEvent::PointerHit { hits } => {
            let mut args = vec![Arg::from("pointerHit")];
            args.extend(hits.iter().map(|hit| Arg::Text(format_hit(hit))));
            args
        }
        InputEvent::Custom { name, args } => {
            let mut out = vec![Arg::from(name)];
            out.extend(args.iter().map(Arg::from));
            out
        }
    }
}

fn parse_button(text: &str) -> Result<u32, DecodeError> {
    text.trim().parse().map_err(|_| DecodeError::InvalidNumber {
        context: "pointer button",
        value: text.to_owned(),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn parse_hit(text: &str) -> Result<PointerHit, DecodeError> {
    let mut fields = text.split(',');
    let handle = fields
        .next()
        .unwrap_or_default()
        .parse::<ObjectHandle>()
        .map_err(|_| DecodeError::InvalidHandle(text.to_owned()))?;
    let mut xyz = [0.0f32; 3];
    for slot in &mut xyz {
        let field = fields.next().ok_or_else(|| DecodeError::InvalidNumber {
            context: "pointer hit",
            value: text.to_owned(),
        })?;
        *slot = parse_number(field, "pointer hit")? as f32;
    }
    Ok(PointerHit {
        handle,
        point: Vec3::from_array(xyz),
        layers: fields.map(str::to_owned).collect(),
    })
}

fn format_hit(hit: &PointerHit) -> String {
    let mut out = format!(
        "{},{},{},{}",
        hit.handle, hit.point.x, hit.point.y, hit.point.z
    );
    for layer in &hit.layers {
        out.push(',');
        out.push_str(layer);
    }
    out
}
