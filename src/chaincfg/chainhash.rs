//! The 32 byte chain hash shared by every layer of the crate: transaction
//! ids, block hashes and outpoint references are all values of this type.

use std::{fmt, str::FromStr};

/// Number of bytes in a chain hash.
pub const HASH_SIZE: usize = 32;

/// A transaction or block hash.
///
/// The bytes are held in the internal order transactions and block headers
/// serialize with; the textual form exchanged with RPC servers is the
/// hexadecimal encoding of the bytes in reverse.  The type is `Copy` and
/// hashable so outpoints and transaction ids can key the notifier's index
/// maps directly.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Wraps a byte array already in internal order.
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// Borrows the hash in internal byte order, as laid down in the wire
    /// encoding of transactions and block headers.
    pub fn bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Reports whether both hashes have the same contents.
    pub fn is_equal(&self, other: &Hash) -> bool {
        self == other
    }
}

impl FromStr for Hash {
    type Err = ChainHashError;

    /// Parses the byte-reversed hexadecimal form used on the RPC surface.
    /// The string must spell out the full hash.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_SIZE * 2 {
            return Err(ChainHashError::StringLength(s.len()));
        }

        let mut reversed = [0u8; HASH_SIZE];
        if let Err(e) = hex::decode_to_slice(s, &mut reversed) {
            return Err(ChainHashError::Hex(e));
        }

        let mut bytes = [0u8; HASH_SIZE];
        for (b, r) in bytes.iter_mut().zip(reversed.iter().rev()) {
            *b = *r;
        }

        Ok(Hash(bytes))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter().rev() {
            write!(f, "{:02x}", b)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

/// Chain hash errors.
pub enum ChainHashError {
    /// The hash string does not spell out exactly HASH_SIZE bytes.
    StringLength(usize),

    /// The hash string holds characters outside the hexadecimal alphabet.
    Hex(hex::FromHexError),
}

impl fmt::Display for ChainHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChainHashError::StringLength(got) => write!(
                f,
                "Hash string must hold {} characters, got {}.",
                HASH_SIZE * 2,
                got
            ),
            ChainHashError::Hex(ref e) => write!(f, "Invalid hash string, error: {}.", e),
        }
    }
}

impl fmt::Debug for ChainHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ChainHashError::StringLength(got) => write!(
                f,
                "ChainHashError(hash string must hold {} characters, got {})",
                HASH_SIZE * 2,
                got
            ),
            ChainHashError::Hex(ref e) => {
                write!(f, "ChainHashError(invalid hash string, error: {})", e)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Hash, HASH_SIZE};

    // The display form spells the bytes in reverse, so the first internal
    // byte ends the string and the last internal byte starts it.
    #[test]
    fn test_display_reverses_bytes() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[0] = 0xab;
        bytes[HASH_SIZE - 1] = 0x01;

        let rendered = Hash::from_bytes(bytes).to_string();

        assert_eq!(HASH_SIZE * 2, rendered.len());
        assert!(rendered.starts_with("01"), "last byte must lead the string");
        assert!(rendered.ends_with("ab"), "first byte must end the string");
    }

    // Parsing the rendered form must return the original hash, and
    // rendering a parsed string must return the original string.
    #[test]
    fn test_string_round_trip() {
        let mut bytes = [0u8; HASH_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let hash = Hash::from_bytes(bytes);

        let reparsed: Hash = hash.to_string().parse().expect("parse failed");
        assert!(reparsed.is_equal(&hash), "parse(display) must round trip");

        let hash_str = "deadbeef000000000000000000000000000000000000000000000000000000aa";
        let parsed: Hash = hash_str.parse().expect("parse failed");
        assert_eq!(hash_str, parsed.to_string(), "display(parse) must round trip");
    }

    // Truncated, oversized and non-hexadecimal strings are all rejected.
    #[test]
    fn test_invalid_strings_rejected() {
        assert!("".parse::<Hash>().is_err());
        assert!("abcd".parse::<Hash>().is_err());
        assert!(
            "00000000000000000000000000000000000000000000000000000000000000000000"
                .parse::<Hash>()
                .is_err(),
            "oversized string must be rejected"
        );
        assert!(
            "zz00000000000000000000000000000000000000000000000000000000000000"
                .parse::<Hash>()
                .is_err(),
            "non-hex string must be rejected"
        );
    }

    // Hashes key the notifier's index maps, so equality and map lookups
    // must agree.
    #[test]
    fn test_hash_as_map_key() {
        use std::collections::HashMap;

        let hash = Hash::from_bytes([0x42; HASH_SIZE]);
        let mut heights: HashMap<Hash, i32> = HashMap::new();
        heights.insert(hash, 7);

        assert_eq!(Some(&7), heights.get(&Hash::from_bytes([0x42; HASH_SIZE])));
        assert_eq!(None, heights.get(&Hash::default()));
    }
}
