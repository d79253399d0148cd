use std::str::Lines;

use crate::remote::types::EventFrame;

/// Prefix that marks a payload-carrying line in a poll response.
pub const DATA_PREFIX: &str = "data: ";

/// Payload value meaning "no result yet".
pub const NO_DATA_SENTINEL: &str = "null";

/// Single-pass iterator over the `data: ` frames of one fetched poll body.
/// Lines without the prefix (`event: ...`, blanks, comments) are skipped.
pub struct EventStreamReader<'a> {
    lines: Lines<'a>,
}

impl<'a> EventStreamReader<'a> {
    pub fn new(body: &'a str) -> Self {
        Self { lines: body.lines() }
    }
}

impl<'a> Iterator for EventStreamReader<'a> {
    type Item = EventFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            if let Some(frame) = parse_frame_line(line) {
                return Some(frame);
            }
        }
        None
    }
}

/// Classify a single line. Returns `None` for lines that are not frames.
/// The payload is the raw remainder after the prefix.
pub fn parse_frame_line(line: &str) -> Option<EventFrame<'_>> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload == NO_DATA_SENTINEL {
        Some(EventFrame::NoData)
    } else {
        Some(EventFrame::Payload(payload))
    }
}
