use bytes::Bytes;
use ofcore_codec::{MessageCodec, MessageType};
use ofcore_frame::{slice, version_label, Frame};

use crate::cmd::SliceArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::{print_frames, FrameRow, OutputFormat};

pub fn run(args: SliceArgs, format: OutputFormat) -> CliResult<i32> {
    let data = std::fs::read(&args.path)
        .map_err(|err| io_error(&format!("reading {}", args.path.display()), err))?;
    let sliced = slice(Bytes::from(data));
    let codec = MessageCodec::new();

    let mut rows = Vec::with_capacity(sliced.frames.len());
    let mut raw = Vec::new();
    for (index, frame) in sliced.frames.iter().enumerate() {
        rows.push(frame_row(&codec, index, frame));
        raw.extend_from_slice(frame.as_bytes());
    }

    print_frames(&rows, sliced.leftover.len(), &raw, format);
    Ok(SUCCESS)
}

/// Frames whose declared length is below a header are listed, not rejected.
fn frame_row(codec: &MessageCodec, index: usize, frame: &Frame) -> FrameRow {
    match frame.header() {
        Ok(header) => FrameRow {
            index,
            version: version_label(header.version),
            msg_type: type_name(codec, frame, header.msg_type),
            length: frame.len(),
            xid: Some(header.xid),
        },
        Err(_) => FrameRow {
            index,
            version: version_label(frame.version()),
            msg_type: "(short)".to_string(),
            length: frame.len(),
            xid: None,
        },
    }
}

/// Decoded type name, falling back to the header's type code.
fn type_name(codec: &MessageCodec, frame: &Frame, code: u8) -> String {
    match codec.decode(frame) {
        Ok(message) => message.type_name().to_string(),
        Err(_) => match MessageType::from_code(frame.version(), code) {
            Some(msg_type) => format!("{} (undecodable)", msg_type.wire_name(frame.version())),
            None => format!("type {code}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frame_is_listed() {
        let codec = MessageCodec::new();
        let row = frame_row(&codec, 3, &Frame::new(Bytes::from_static(&[4, 0, 0, 2])));
        assert_eq!(row.index, 3);
        assert_eq!(row.version, "v0x04");
        assert_eq!(row.msg_type, "(short)");
        assert_eq!(row.length, 2);
        assert_eq!(row.xid, None);
    }

    #[test]
    fn full_frame_is_decoded() {
        let codec = MessageCodec::new();
        let row = frame_row(
            &codec,
            0,
            &Frame::new(Bytes::from_static(&[4, 2, 0, 8, 0, 0, 0, 9])),
        );
        assert_eq!(row.msg_type, "ofpt_echo_request");
        assert_eq!(row.xid, Some(9));
    }
}
