use bytes::BytesMut;

pub trait Decoder {
    type Error: std::error::Error;
    type Item;

    /// Takes a single item out of `buf`, `Ok(None)` means more bytes are required
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error>;
}
