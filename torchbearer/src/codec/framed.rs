use super::{
    decoder::Decoder,
    encoder::Encoder,
    frame::{decode_frame, encode_frame, Direction},
};
use crate::{
    command::Command,
    error::{Error, Result},
    flags::MessageType,
    response::{parser::parse_payload, Response},
};
use bytes::BytesMut;

/// Host side codec: encodes [`Command`]s, decodes [`Response`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder for FrameCodec {
    type Error = Error;
    type Item = Command;

    fn encode(&mut self, cmd: Command, dst: &mut BytesMut) -> Result<()> {
        encode_frame(
            Direction::HostToDevice,
            cmd.message_type().to_code(),
            &cmd.payload(),
            dst,
        )
    }
}

impl Decoder for FrameCodec {
    type Error = Error;
    type Item = Response;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        match decode_frame(Direction::DeviceToHost, src)? {
            Some(frame) => {
                let message_type = MessageType::try_from_code(frame.code)?;
                parse_payload(message_type, &frame.payload).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl FrameCodec {
    /// Parses up to `max_messages` responses from the front of `src`.
    ///
    /// Whatever was not consumed stays in `src`, including a trailing partial package.
    pub fn parse_messages(&mut self, src: &mut BytesMut, max_messages: usize) -> Result<Vec<Response>> {
        let mut messages = Vec::new();
        while messages.len() < max_messages {
            match self.decode(src)? {
                Some(msg) => messages.push(msg),
                None => break,
            }
        }
        if !messages.is_empty() {
            log::trace!(
                "parsed {:?}",
                messages.iter().map(Response::message_type).collect::<Vec<_>>()
            );
        }
        Ok(messages)
    }
}
