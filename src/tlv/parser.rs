//! BER-TLV Parser
//!
//! Flat parsing of primitive and constructed objects; a constructed value
//! is handed back raw and can be parsed again.

use thiserror::Error;

/// Errors that can occur during TLV parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TLVError {
    #[error("Unexpected end of data while parsing tag")]
    UnexpectedEndTag,

    #[error("Unexpected end of data while parsing length")]
    UnexpectedEndLength,

    #[error("Unexpected end of data while parsing value")]
    UnexpectedEndValue,

    #[error("Invalid length encoding")]
    InvalidLength,

    #[error("Only tags of up to three bytes are supported")]
    TagTooLong,
}

/// A TLV data object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TLV {
    /// The tag (1-3 bytes encoded as u32)
    pub tag: u32,
    pub value: Vec<u8>,
}

impl TLV {
    pub fn new(tag: u32, value: Vec<u8>) -> Self {
        Self { tag, value }
    }

    /// Constructed objects have b6 of the first tag byte set
    pub fn is_constructed(&self) -> bool {
        let first = self.tag.to_be_bytes().into_iter().find(|b| *b != 0).unwrap_or(0);
        first & 0x20 != 0
    }
}

pub struct TLVParser;

impl TLVParser {
    /// Parse consecutive TLVs covering all of `data`
    pub fn parse(data: &[u8]) -> Result<Vec<TLV>, TLVError> {
        let mut result = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (tlv, consumed) = Self::parse_one(&data[offset..])?;
            result.push(tlv);
            offset += consumed;
        }
        Ok(result)
    }

    /// Parse a single TLV, returning it with the number of bytes consumed
    pub fn parse_one(data: &[u8]) -> Result<(TLV, usize), TLVError> {
        let (tag, tag_len) = parse_tag(data)?;
        let (length, len_len) = parse_length(&data[tag_len..])?;
        let start = tag_len + len_len;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= data.len())
            .ok_or(TLVError::UnexpectedEndValue)?;
        Ok((TLV::new(tag, data[start..end].to_vec()), end))
    }

    /// Value of the first object tagged `tag`
    pub fn find(data: &[u8], tag: u32) -> Result<Option<Vec<u8>>, TLVError> {
        Ok(Self::parse(data)?
            .into_iter()
            .find(|tlv| tlv.tag == tag)
            .map(|tlv| tlv.value))
    }
}

/// Parse a BER tag (1-3 bytes)
fn parse_tag(data: &[u8]) -> Result<(u32, usize), TLVError> {
    let (&first, rest) = data.split_first().ok_or(TLVError::UnexpectedEndTag)?;
    if first & 0x1F != 0x1F {
        return Ok((first as u32, 1));
    }

    let mut tag = first as u32;
    for (i, &byte) in rest.iter().enumerate() {
        if i == 2 {
            return Err(TLVError::TagTooLong);
        }
        tag = (tag << 8) | byte as u32;
        if byte & 0x80 == 0 {
            return Ok((tag, i + 2));
        }
    }
    Err(TLVError::UnexpectedEndTag)
}

/// Parse a definite BER length (1-5 bytes)
fn parse_length(data: &[u8]) -> Result<(usize, usize), TLVError> {
    let (&first, rest) = data.split_first().ok_or(TLVError::UnexpectedEndLength)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 || count > 4 {
        return Err(TLVError::InvalidLength);
    }
    let bytes = rest.get(..count).ok_or(TLVError::UnexpectedEndLength)?;
    let length = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((length, 1 + count))
}
