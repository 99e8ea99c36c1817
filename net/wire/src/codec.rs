//! A tokio-codec for framed wire messages.
//!
//! Frame layout: 4-byte network magic, 12-byte command, 4-byte payload
//! length, 4-byte checksum (leading bytes of the double-SHA-256 of the
//! payload), then the payload itself.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use arc_types::ChainHash;

use crate::{Command, Message, Network, WireError};

/// Frame header size: magic + command + length + checksum.
const HEADER_SIZE: usize = 4 + 12 + 4 + 4;

/// Default cap on a single payload. Big enough for the large blocks this
/// family of networks produces.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 512 * 1024 * 1024;

enum DecodeState {
    Header,
    Body {
        command: Command,
        length: u32,
        checksum: [u8; 4],
    },
}

/// Encoder/decoder for one peer connection.
pub struct MessageCodec {
    network: Network,
    max_message_size: u64,
    state: DecodeState,
}

impl MessageCodec {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            state: DecodeState::Header,
        }
    }

    /// Overrides the payload size cap.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: u64) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = ChainHash::double_sha256(payload);
    let mut sum = [0u8; 4];
    sum.copy_from_slice(&hash.as_bytes()[..4]);
    sum
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        loop {
            match &self.state {
                DecodeState::Header => {
                    if src.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let magic = src.get_u32_le();
                    if magic != self.network.magic() {
                        return Err(WireError::InvalidMagic(magic));
                    }

                    let mut command_bytes = [0u8; 12];
                    src.copy_to_slice(&mut command_bytes);
                    let command = Command::from_header_bytes(&command_bytes);

                    let length = src.get_u32_le();
                    if u64::from(length) > self.max_message_size {
                        return Err(WireError::MessageTooLarge(u64::from(length)));
                    }

                    let mut checksum = [0u8; 4];
                    src.copy_to_slice(&mut checksum);

                    src.reserve(length as usize);
                    self.state = DecodeState::Body {
                        command,
                        length,
                        checksum,
                    };
                }
                DecodeState::Body {
                    command,
                    length,
                    checksum: expected,
                } => {
                    let length = *length as usize;
                    if src.len() < length {
                        return Ok(None);
                    }

                    let payload = src.split_to(length).freeze();
                    let command = command.clone();
                    let expected = *expected;
                    self.state = DecodeState::Header;

                    if checksum(&payload) != expected {
                        return Err(WireError::InvalidChecksum(command.to_string()));
                    }

                    return Message::from_payload(command, payload).map(Some);
                }
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = WireError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), WireError> {
        let payload = message.to_payload();
        if payload.len() as u64 > self.max_message_size {
            return Err(WireError::MessageTooLarge(payload.len() as u64));
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u32_le(self.network.magic());
        dst.put_slice(&message.command().to_header_bytes());
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&checksum(&payload));
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use arc_types::ChainHash;

    use crate::InvVect;

    use super::*;

    fn encode(codec: &mut MessageCodec, message: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(message, &mut buf).unwrap();
        buf
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = MessageCodec::new(Network::Regtest);
        let messages = [
            Message::Verack,
            Message::Ping(7),
            Message::Inv(vec![InvVect::tx(ChainHash::double_sha256(b"a"))]),
            Message::Tx(vec![1, 2, 3].into()),
        ];

        let mut wire = BytesMut::new();
        for message in &messages {
            wire.unsplit(encode(&mut codec, message.clone()));
        }

        for expected in &messages {
            let got = codec.decode(&mut wire).unwrap().unwrap();
            assert_eq!(&got, expected);
        }
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let mut codec = MessageCodec::new(Network::Regtest);
        let frame = encode(&mut MessageCodec::new(Network::Regtest), Message::Ping(1));

        let mut buf = BytesMut::from(&frame[..HEADER_SIZE + 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[HEADER_SIZE + 3..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::Ping(1)));
    }

    #[test]
    fn wrong_magic_is_fatal() {
        let mut codec = MessageCodec::new(Network::Mainnet);
        let mut buf = encode(&mut MessageCodec::new(Network::Regtest), Message::Verack);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::InvalidMagic(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn corrupt_checksum_is_recoverable() {
        let mut codec = MessageCodec::new(Network::Regtest);
        let mut buf = encode(&mut codec, Message::Ping(1));
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        buf.unsplit(encode(&mut MessageCodec::new(Network::Regtest), Message::Pong(2)));

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::InvalidChecksum(_)));
        assert!(!err.is_fatal());

        // The bad frame was fully consumed; the stream continues.
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::Pong(2)));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut codec = MessageCodec::new(Network::Regtest).with_max_message_size(8);
        let err = codec
            .encode(Message::Tx(vec![0; 16].into()), &mut BytesMut::new())
            .unwrap_err();
        assert!(matches!(err, WireError::MessageTooLarge(16)));
    }
}
