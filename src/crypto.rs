use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{thread_rng, Rng};

use crate::crc::crc32;
use crate::error::{HiveError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LENGTH: usize = 16;
const BLOCK_LENGTH: usize = 16;

/// AES-256-CBC cipher for box values.
///
/// Every encryption draws a fresh random IV and prefixes it to the
/// ciphertext. The CRC32 of the key seeds all frame checksums, so frames
/// written under one key fail the CRC check under any other.
pub struct Cipher {
    key: [u8; 32],
    key_crc: u32,
}

impl Cipher {
    /// Creates a cipher from a 32-byte key.
    pub fn new(key: [u8; 32]) -> Cipher {
        let key_crc = crc32(&key, 0, None);
        Cipher { key, key_crc }
    }

    /// CRC32 of the key, used as the frame checksum seed.
    pub fn key_crc(&self) -> u32 {
        self.key_crc
    }

    /// Encrypts `plaintext`, returning the IV followed by the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0; IV_LENGTH];
        thread_rng().fill(&mut iv[..]);

        let cipher = Aes256CbcEnc::new(&self.key.into(), &iv.into());
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_LENGTH + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypts an IV-prefixed ciphertext.
    ///
    /// # Errors
    ///
    /// [`HiveError::CorruptFrame`] when the input is shorter than the IV,
    /// not block aligned, or fails padding validation.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_LENGTH + BLOCK_LENGTH || (data.len() - IV_LENGTH) % BLOCK_LENGTH != 0 {
            return Err(HiveError::corrupt("ciphertext is not block aligned"));
        }
        let mut iv = [0; IV_LENGTH];
        iv.copy_from_slice(&data[..IV_LENGTH]);

        let cipher = Aes256CbcDec::new(&self.key.into(), &iv.into());
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&data[IV_LENGTH..])
            .map_err(|_| HiveError::corrupt("bad padding"))
    }
}
