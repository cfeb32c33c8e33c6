//! BER-TLV Encoder

/// Encodes single tag-length-value triples
pub struct TLVEncoder;

impl TLVEncoder {
    /// Encode a tag-value pair to bytes
    pub fn encode(tag: u32, value: &[u8]) -> Vec<u8> {
        let mut result = Self::encode_tag(tag);
        result.extend(Self::encode_length(value.len()));
        result.extend_from_slice(value);
        result
    }

    /// Tag bytes, most significant first, without leading zero bytes
    pub fn encode_tag(tag: u32) -> Vec<u8> {
        let bytes = tag.to_be_bytes();
        let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();
        bytes[skip..].to_vec()
    }

    /// Definite length, short form below 128
    pub fn encode_length(length: usize) -> Vec<u8> {
        if length < 0x80 {
            return vec![length as u8];
        }
        let bytes = (length as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        let mut result = vec![0x80 | (bytes.len() - skip) as u8];
        result.extend_from_slice(&bytes[skip..]);
        result
    }
}

/// Builder for nested TLV structures
#[derive(Debug, Default)]
pub struct TLVBuilder {
    data: Vec<u8>,
}

impl TLVBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primitive TLV
    pub fn add(mut self, tag: u32, value: &[u8]) -> Self {
        self.data.extend(TLVEncoder::encode(tag, value));
        self
    }

    /// Add a TLV only when `value` is present
    pub fn add_opt(self, tag: u32, value: Option<&[u8]>) -> Self {
        match value {
            Some(value) => self.add(tag, value),
            None => self,
        }
    }

    /// Wrap current content in a constructed tag
    pub fn wrap(self, tag: u32) -> Self {
        Self {
            data: TLVEncoder::encode(tag, &self.data),
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
