//! Script Record Parser
//!
//! Parses one text line into a [`ControlMessage`]:
//!
//! ```text
//! <frame> <keys> [<lx>;<ly> <rx>;<ry>]
//! 12 KEY_A;KEY_ZR 0;32767 0;0
//! 13 NONE
//! ```
//!
//! Keys are `;`-separated names with an optional `KEY_` prefix, or `NONE`.
//! Sticks default to centered when omitted.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, i32 as int32, space0, space1, u64 as frame_index},
    combinator::{all_consuming, map, opt},
    multi::separated_list1,
    sequence::{preceded, separated_pair, terminated, tuple},
    IResult,
};

use super::ControlMessage;
use crate::controller::{Buttons, ControllerState, StickPosition};
use crate::{Result, TasError};

/// Key field before name resolution
enum KeyField<'a> {
    None,
    Names(Vec<&'a str>),
}

fn key_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn key_field(input: &str) -> IResult<&str, KeyField<'_>> {
    let (rest, names) = separated_list1(char(';'), key_name)(input)?;
    if names.len() == 1 && names[0].eq_ignore_ascii_case("NONE") {
        return Ok((rest, KeyField::None));
    }
    Ok((rest, KeyField::Names(names)))
}

fn stick(input: &str) -> IResult<&str, StickPosition> {
    map(separated_pair(int32, char(';'), int32), |(x, y)| {
        StickPosition::new(x, y)
    })(input)
}

fn sticks(input: &str) -> IResult<&str, (StickPosition, StickPosition)> {
    separated_pair(stick, space1, stick)(input)
}

type RawRecord<'a> = (u64, KeyField<'a>, Option<(StickPosition, StickPosition)>);

fn record(input: &str) -> IResult<&str, RawRecord<'_>> {
    all_consuming(terminated(
        tuple((
            preceded(space0, frame_index),
            preceded(space1, key_field),
            opt(preceded(space1, sticks)),
        )),
        space0,
    ))(input)
}

/// Whether a line carries no record (blank or `#` comment)
pub fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse one script line into a control message
///
/// # Errors
///
/// Returns [`TasError::Parse`] if the line does not match the record grammar
/// or names an unknown key.
pub fn parse_line(line: &str) -> Result<ControlMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (_, (frame, keys, sticks)) = record(line)
        .map_err(|e| TasError::Parse(format!("malformed record '{line}': {e}")))?;

    let buttons = match keys {
        KeyField::None => Buttons::empty(),
        KeyField::Names(names) => names.into_iter().try_fold(Buttons::empty(), |acc, name| {
            Buttons::from_key_name(name)
                .map(|button| acc | button)
                .ok_or_else(|| TasError::Parse(format!("unknown key '{name}' in '{line}'")))
        })?,
    };
    let (left, right) = sticks.unwrap_or_default();

    Ok(ControlMessage::new(
        frame,
        ControllerState {
            buttons,
            left,
            right,
        },
    ))
}
