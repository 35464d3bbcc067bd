//! Multi-format payload decoding for `SAVE:` and `POSITION:` commands
//!
//! Each entry point holds an ordered list of pure parse functions. The first
//! one that produces a structurally valid value wins; if none does, or the
//! input is blank, the result is `None`. Decoding never fails loudly: a bad
//! payload is simply not a payload.
//!
//! Save payloads, in priority order:
//! 1. JSON object with optional `Lv`, `Exp`, `WeaponName`, `WeaponUpgrade`
//! 2. `key=value` segments separated by `;` or `|`
//!
//! Position payloads, in priority order:
//! 1. JSON array `[x, y, z, ...]` or JSON object with optional `x`, `y`, `z`
//! 2. Triple separated by commas or spaces, e.g. `1,2,3` or `1 2 3`
//! 3. `key=value` segments separated by `;` or `|`

use crate::{PositionPayload, SavePayload};
use serde_json::Value;

type Strategy<T> = fn(&str) -> Option<T>;

const SAVE_STRATEGIES: &[Strategy<SavePayload>] = &[save_from_json, save_from_pairs];

const POSITION_STRATEGIES: &[Strategy<PositionPayload>] =
    &[position_from_json, position_from_triple, position_from_pairs];

/// Decodes a save payload, returning `None` if no format yields usable data
///
/// A payload must carry at least one non-default field regardless of the
/// format it arrived in, so `{}` and `garbage;;` are both rejected.
pub fn decode_save(text: &str) -> Option<SavePayload> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    SAVE_STRATEGIES
        .iter()
        .find_map(|parse| parse(text).filter(SavePayload::has_data))
}

/// Decodes a position payload, returning `None` if no format matches
///
/// Unlike saves, a structurally valid position is always accepted even when
/// every coordinate is zero: `{}` decodes to the origin.
pub fn decode_position(text: &str) -> Option<PositionPayload> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    POSITION_STRATEGIES.iter().find_map(|parse| parse(text))
}

fn save_from_json(text: &str) -> Option<SavePayload> {
    match serde_json::from_str::<Value>(text).ok()? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn save_from_pairs(text: &str) -> Option<SavePayload> {
    let mut save = SavePayload::default();

    for (key, value) in pairs(text) {
        if key.eq_ignore_ascii_case("Lv") {
            assign_int(&mut save.level, value);
        } else if key.eq_ignore_ascii_case("Exp") {
            assign_int(&mut save.experience, value);
        } else if key.eq_ignore_ascii_case("WeaponName") {
            save.weapon_name = Some(value.to_string());
        } else if key.eq_ignore_ascii_case("WeaponUpgrade") {
            assign_int(&mut save.weapon_upgrade, value);
        }
    }

    Some(save)
}

fn position_from_json(text: &str) -> Option<PositionPayload> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) if items.len() >= 3 => Some(PositionPayload::new(
            json_int(&items[0])?,
            json_int(&items[1])?,
            json_int(&items[2])?,
        )),
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn position_from_triple(text: &str) -> Option<PositionPayload> {
    let numbers: Vec<i32> = text
        .split([',', ' '])
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse().ok())
        .collect();

    match numbers.as_slice() {
        &[x, y, z, ..] => Some(PositionPayload::new(x, y, z)),
        _ => None,
    }
}

fn position_from_pairs(text: &str) -> Option<PositionPayload> {
    let mut position = PositionPayload::default();
    let mut matched = false;

    for (key, value) in pairs(text) {
        matched = true;
        if key.eq_ignore_ascii_case("x") {
            assign_int(&mut position.x, value);
        } else if key.eq_ignore_ascii_case("y") {
            assign_int(&mut position.y, value);
        } else if key.eq_ignore_ascii_case("z") {
            assign_int(&mut position.z, value);
        }
    }

    matched.then_some(position)
}

/// Splits `a=1;b=2|c=3` into trimmed `(key, value)` pairs
///
/// Empty segments and segments without `=` are skipped. Only the first `=`
/// separates key from value.
fn pairs(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split([';', '|'])
        .filter(|segment| !segment.trim().is_empty())
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

// Non-integer values leave the field untouched
fn assign_int(field: &mut i32, value: &str) {
    if let Ok(parsed) = value.parse() {
        *field = parsed;
    }
}

fn json_int(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|n| i32::try_from(n).ok())
}
