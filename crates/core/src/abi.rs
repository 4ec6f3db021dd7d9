//! The slice of Solidity ABI encoding that store events use: 32-byte words,
//! `bytes`, `bytes32[]` and `string[]`.

use crate::error::DecodeError;

const WORD: usize = 32;

pub struct AbiReader<'a> {
    data: &'a [u8],
}

impl<'a> AbiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, at: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = at.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[at..end]),
            None => Err(DecodeError::Length {
                context: "abi payload",
                expected: at.saturating_add(len),
                actual: self.data.len(),
            }),
        }
    }

    pub fn word_at(&self, at: usize) -> Result<[u8; 32], DecodeError> {
        let mut word = [0u8; WORD];
        word.copy_from_slice(self.slice(at, WORD)?);
        Ok(word)
    }

    /// A word holding an offset or length; rejects values that cannot index memory.
    fn usize_at(&self, at: usize) -> Result<usize, DecodeError> {
        let word = self.word_at(at)?;
        if word[..24].iter().any(|b| *b != 0) {
            return Err(DecodeError::malformed("abi payload", "offset out of range"));
        }
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&word[24..]);
        usize::try_from(u64::from_be_bytes(tail))
            .map_err(|_| DecodeError::malformed("abi payload", "offset out of range"))
    }
}

/// `a + b * WORD` without wrapping.
fn advance(a: usize, b: usize) -> Result<usize, DecodeError> {
    b.checked_mul(WORD)
        .and_then(|step| a.checked_add(step))
        .ok_or_else(|| DecodeError::malformed("abi payload", "offset out of range"))
}

impl<'a> AbiReader<'a> {
    pub fn bytes32(&self, slot: usize) -> Result<[u8; 32], DecodeError> {
        self.word_at(advance(0, slot)?)
    }

    pub fn uint8(&self, slot: usize) -> Result<u8, DecodeError> {
        let word = self.bytes32(slot)?;
        if word[..31].iter().any(|b| *b != 0) {
            return Err(DecodeError::malformed("abi payload", "uint8 out of range"));
        }
        Ok(word[31])
    }

    /// `bytes` whose head offset sits in `slot`.
    pub fn bytes(&self, slot: usize) -> Result<Vec<u8>, DecodeError> {
        let offset = self.usize_at(advance(0, slot)?)?;
        let len = self.usize_at(offset)?;
        Ok(self.slice(advance(offset, 1)?, len)?.to_vec())
    }

    /// `bytes32[]` whose head offset sits in `slot`.
    pub fn bytes32_array(&self, slot: usize) -> Result<Vec<[u8; 32]>, DecodeError> {
        let offset = self.usize_at(advance(0, slot)?)?;
        let len = self.usize_at(offset)?;
        (0..len)
            .map(|i| self.word_at(advance(offset, i + 1)?))
            .collect()
    }

    /// `string[]` whose head offset sits in `slot`.
    pub fn string_array(&self, slot: usize) -> Result<Vec<String>, DecodeError> {
        let offset = self.usize_at(advance(0, slot)?)?;
        let len = self.usize_at(offset)?;
        let base = advance(offset, 1)?;
        (0..len)
            .map(|i| {
                let at = base
                    .checked_add(self.usize_at(advance(base, i)?)?)
                    .ok_or_else(|| DecodeError::malformed("abi payload", "offset out of range"))?;
                let str_len = self.usize_at(at)?;
                String::from_utf8(self.slice(advance(at, 1)?, str_len)?.to_vec())
                    .map_err(|e| DecodeError::malformed("abi string", e.to_string()))
            })
            .collect()
    }
}

/// A value to ABI encode.
#[derive(Debug, Clone)]
pub enum Token {
    Word([u8; 32]),
    Bytes(Vec<u8>),
    Bytes32Array(Vec<[u8; 32]>),
    StringArray(Vec<String>),
}

impl Token {
    pub fn uint(n: u64) -> Self {
        Self::Word(uint_word(n))
    }

    fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Word(_))
    }

    fn encode_tail(&self) -> Vec<u8> {
        match self {
            Self::Word(w) => w.to_vec(),
            Self::Bytes(b) => {
                let mut out = uint_word(b.len() as u64).to_vec();
                out.extend_from_slice(b);
                out.resize(out.len() + padding(b.len()), 0);
                out
            }
            Self::Bytes32Array(words) => {
                let mut out = uint_word(words.len() as u64).to_vec();
                for w in words {
                    out.extend_from_slice(w);
                }
                out
            }
            Self::StringArray(strings) => {
                let mut out = uint_word(strings.len() as u64).to_vec();
                let items: Vec<Token> = strings
                    .iter()
                    .map(|s| Token::Bytes(s.as_bytes().to_vec()))
                    .collect();
                out.extend(encode(&items));
                out
            }
        }
    }
}

fn uint_word(n: u64) -> [u8; 32] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&n.to_be_bytes());
    word
}

fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

/// Encode a tuple of tokens: static words in the head, offsets for dynamic ones.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let mut head = Vec::with_capacity(tokens.len() * WORD);
    let mut tail = Vec::new();
    let head_len = tokens.len() * WORD;
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
            tail.extend(token.encode_tail());
        } else {
            head.extend(token.encode_tail());
        }
    }
    head.extend(tail);
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_and_arrays_roundtrip() {
        let data = encode(&[
            Token::Word([7; 32]),
            Token::Bytes32Array(vec![[1; 32], [2; 32]]),
            Token::uint(3),
            Token::Bytes(vec![0xaa; 33]),
        ]);
        let reader = AbiReader::new(&data);
        assert_eq!(reader.bytes32(0).unwrap(), [7; 32]);
        assert_eq!(reader.bytes32_array(1).unwrap(), vec![[1; 32], [2; 32]]);
        assert_eq!(reader.uint8(2).unwrap(), 3);
        assert_eq!(reader.bytes(3).unwrap(), vec![0xaa; 33]);
    }

    #[test]
    fn string_array_matches_solidity_layout() {
        let data = encode(&[Token::StringArray(vec!["x".into(), "y".into()])]);
        // offset, length, two relative offsets, then two (len, padded data) pairs
        assert_eq!(data.len(), 32 * 8);
        assert_eq!(data[31], 0x20);
        assert_eq!(data[63], 2);
        assert_eq!(data[95], 0x40);
        assert_eq!(data[127], 0x80);
        let names = AbiReader::new(&data).string_array(0).unwrap();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn truncated_payload_rejected() {
        let data = encode(&[Token::Bytes(vec![1, 2, 3])]);
        let reader = AbiReader::new(&data[..40]);
        assert!(reader.bytes(0).is_err());
        assert!(AbiReader::new(&[]).bytes32(0).is_err());
    }

    #[test]
    fn huge_offsets_rejected() {
        let mut data = vec![0xff; 32];
        data.extend_from_slice(&[0; 32]);
        assert!(AbiReader::new(&data).bytes(0).is_err());
    }

    #[test]
    fn string_offset_past_usize_rejected() {
        let mut data = encode(&[Token::StringArray(vec!["x".into()])]);
        // first element's relative offset
        data[64 + 24..96].copy_from_slice(&[0xff; 8]);
        assert!(AbiReader::new(&data).string_array(0).is_err());
    }

    #[test]
    fn array_length_past_payload_rejected() {
        let mut data = encode(&[Token::Bytes32Array(vec![[1; 32]])]);
        data[32 + 24..64].copy_from_slice(&[0xff; 8]);
        assert!(AbiReader::new(&data).bytes32_array(0).is_err());
    }
}
