//! HCA byte-substitution cipher tables.

use tracing::debug;

use crate::{CryptoError, Result};

const TABLE_SIZE: usize = 0x100;

/// Table construction selector, as carried by the `ciph` header chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherType {
    /// Identity tables; the stream is not obfuscated.
    None,
    /// Fixed scramble shared by every stream.
    Static,
    /// Keyed scramble derived from a 64-bit key.
    Keyed,
}

impl CipherType {
    /// Parse the cipher type field of the `ciph` chunk.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Static),
            56 => Ok(Self::Keyed),
            other => Err(CryptoError::UnsupportedCipherType(other)),
        }
    }
}

/// Key material for the cipher, plus an optional type override.
///
/// The archive-level key modifier (the high half of the AFS2 alignment word)
/// rescales the stream key; pass it through [`CipherConfig::key_modifier`] and
/// the effective key is derived on initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherConfig {
    /// 64-bit stream key for type 56.
    pub key: u64,

    /// Archive key modifier; 0 leaves the key untouched.
    pub key_modifier: u16,

    /// Forces a cipher type instead of the one declared by the stream.
    pub cipher_type: Option<CipherType>,
}

impl CipherConfig {
    /// Config with a stream key and no modifier.
    pub fn with_key(key: u64) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// The key after applying the archive modifier.
    pub fn effective_key(&self) -> u64 {
        if self.key_modifier == 0 {
            self.key
        } else {
            let modifier = self.key_modifier;
            let scale = (u64::from(modifier) << 16) | u64::from((!modifier).wrapping_add(2));
            self.key.wrapping_mul(scale)
        }
    }
}

/// A pair of 256-entry substitution tables.
///
/// The encrypt table is the inverse permutation of the decrypt table, so
/// `encrypt[decrypt[i]] == i` for every byte value.
pub struct Cipher {
    decrypt_table: [u8; TABLE_SIZE],
    encrypt_table: [u8; TABLE_SIZE],
}

impl Cipher {
    /// Build cipher tables for `cipher_type`, keyed by `key` when type 56.
    pub fn new(cipher_type: CipherType, key: u64) -> Self {
        let decrypt_table = match cipher_type {
            CipherType::None => init0(),
            CipherType::Static => init1(),
            CipherType::Keyed => init56(key as u32, (key >> 32) as u32),
        };

        let mut encrypt_table = [0u8; TABLE_SIZE];
        for (i, &v) in decrypt_table.iter().enumerate() {
            encrypt_table[v as usize] = i as u8;
        }

        debug!(?cipher_type, "initialized HCA cipher tables");

        Self {
            decrypt_table,
            encrypt_table,
        }
    }

    /// Map every byte through the decrypt table, in place.
    pub fn decrypt(&self, data: &mut [u8]) {
        for b in data {
            *b = self.decrypt_table[*b as usize];
        }
    }

    /// Map every byte through the encrypt table, in place.
    pub fn encrypt(&self, data: &mut [u8]) {
        for b in data {
            *b = self.encrypt_table[*b as usize];
        }
    }

    /// The decrypt substitution table.
    pub fn decrypt_table(&self) -> &[u8; TABLE_SIZE] {
        &self.decrypt_table
    }
}

/// Type 0: identity.
fn init0() -> [u8; TABLE_SIZE] {
    let mut table = [0u8; TABLE_SIZE];
    for (i, v) in table.iter_mut().enumerate() {
        *v = i as u8;
    }
    table
}

/// Type 1: fixed scramble. 0x00 and 0xFF map to themselves; the interior 254
/// entries walk a multiply-add recurrence over the byte field, skipping the
/// two fixed points.
fn init1() -> [u8; TABLE_SIZE] {
    let mut table = [0u8; TABLE_SIZE];
    let mut v = 0u8;
    for entry in table.iter_mut().take(0xFF).skip(1) {
        v = v.wrapping_mul(13).wrapping_add(11);
        if v == 0 || v == 0xFF {
            v = v.wrapping_mul(13).wrapping_add(11);
        }
        *entry = v;
    }
    table[0] = 0;
    table[0xFF] = 0xFF;
    table
}

/// Type 56: keyed scramble. The 56-bit key (after decrement) seeds a nibble
/// mixing network; the resulting 256 nibble pairs are then spread over the
/// table with a stride-0x11 walk, again pinning 0x00 and 0xFF.
fn init56(key1: u32, key2: u32) -> [u8; TABLE_SIZE] {
    let mut key1 = key1;
    let mut key2 = key2;
    if key1 == 0 {
        key2 = key2.wrapping_sub(1);
    }
    key1 = key1.wrapping_sub(1);

    let mut t1 = [0u8; 8];
    for b in t1.iter_mut().take(7) {
        *b = key1 as u8;
        key1 = (key1 >> 8) | (key2 << 24);
        key2 >>= 8;
    }

    let t2: [u8; 0x10] = [
        t1[1],
        t1[1] ^ t1[6],
        t1[2] ^ t1[3],
        t1[2],
        t1[2] ^ t1[1],
        t1[3] ^ t1[4],
        t1[3],
        t1[3] ^ t1[2],
        t1[4] ^ t1[5],
        t1[4],
        t1[4] ^ t1[3],
        t1[5] ^ t1[6],
        t1[5],
        t1[5] ^ t1[4],
        t1[6] ^ t1[1],
        t1[6],
    ];

    let t31 = init56_create_table(t1[0]);
    let mut t3 = [0u8; TABLE_SIZE];
    for i in 0..0x10 {
        let t32 = init56_create_table(t2[i]);
        let high = t31[i] << 4;
        for j in 0..0x10 {
            t3[i * 0x10 + j] = high | t32[j];
        }
    }

    let mut table = [0u8; TABLE_SIZE];
    let mut pos = 1usize;
    let mut v = 0u8;
    for _ in 0..TABLE_SIZE {
        v = v.wrapping_add(0x11);
        let a = t3[v as usize];
        if a != 0 && a != 0xFF && pos < 0xFF {
            table[pos] = a;
            pos += 1;
        }
    }
    table[0] = 0;
    table[0xFF] = 0xFF;
    table
}

/// One row of the type-56 nibble mixer: a 16-step multiply-add walk seeded
/// from one key byte.
fn init56_create_table(key: u8) -> [u8; 0x10] {
    let mul = ((key & 1) << 3) | 5;
    let add = (key & 0xE) | 1;
    let mut key = key >> 4;
    let mut row = [0u8; 0x10];
    for r in row.iter_mut() {
        key = key.wrapping_mul(mul).wrapping_add(add) & 0xF;
        *r = key;
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type0_is_identity() {
        let cipher = Cipher::new(CipherType::None, 0);
        let mut data: Vec<u8> = (0..=0xFF).collect();
        let original = data.clone();
        cipher.decrypt(&mut data);
        assert_eq!(data, original);
        cipher.encrypt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_type1_fixed_points() {
        let cipher = Cipher::new(CipherType::Static, 0);
        assert_eq!(cipher.decrypt_table()[0], 0);
        assert_eq!(cipher.decrypt_table()[0xFF], 0xFF);
    }

    #[test]
    fn test_type1_is_permutation() {
        let cipher = Cipher::new(CipherType::Static, 0);
        let mut seen = [false; TABLE_SIZE];
        for &v in cipher.decrypt_table() {
            assert!(!seen[v as usize], "duplicate table value {v:#04x}");
            seen[v as usize] = true;
        }
    }

    #[test]
    fn test_type1_encrypt_inverts_decrypt() {
        let cipher = Cipher::new(CipherType::Static, 0);
        let mut data: Vec<u8> = (0..=0xFF).collect();
        let original = data.clone();
        cipher.decrypt(&mut data);
        assert_ne!(data, original);
        cipher.encrypt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_type56_deterministic_and_key_dependent() {
        let a = Cipher::new(CipherType::Keyed, 0x0030_F9E0_9A3C_5A28);
        let b = Cipher::new(CipherType::Keyed, 0x0030_F9E0_9A3C_5A28);
        let c = Cipher::new(CipherType::Keyed, 0x0000_0000_0765_4321);
        assert_eq!(a.decrypt_table(), b.decrypt_table());
        assert_ne!(a.decrypt_table(), c.decrypt_table());
    }

    #[test]
    fn test_type56_fixed_points() {
        let cipher = Cipher::new(CipherType::Keyed, 0x0030_F9E0_9A3C_5A28);
        assert_eq!(cipher.decrypt_table()[0], 0);
        assert_eq!(cipher.decrypt_table()[0xFF], 0xFF);
    }

    #[test]
    fn test_key_modifier_rescales_key() {
        let plain = CipherConfig::with_key(0x1234_5678);
        assert_eq!(plain.effective_key(), 0x1234_5678);

        let modified = CipherConfig {
            key: 0x1234_5678,
            key_modifier: 0x00B1,
            cipher_type: None,
        };
        let scale = (0x00B1u64 << 16) | u64::from((!0x00B1u16).wrapping_add(2));
        assert_eq!(modified.effective_key(), 0x1234_5678u64.wrapping_mul(scale));
        assert_ne!(modified.effective_key(), plain.effective_key());
    }

    #[test]
    fn test_cipher_type_parsing() {
        assert_eq!(CipherType::from_u16(0).unwrap(), CipherType::None);
        assert_eq!(CipherType::from_u16(1).unwrap(), CipherType::Static);
        assert_eq!(CipherType::from_u16(56).unwrap(), CipherType::Keyed);
        assert!(matches!(
            CipherType::from_u16(2),
            Err(CryptoError::UnsupportedCipherType(2))
        ));
    }
}
