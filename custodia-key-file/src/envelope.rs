//! Binary layout of a file-KMS ciphertext blob.
//!
//! ```text
//! [version:1][kek_id_len:1][kek_id:N][wrapped_dek_len:2][wrapped_dek:M][nonce_len:1][nonce:L][ciphertext]
//! ```
//!
//! `wrapped_dek` is itself `[wrap_nonce:12][sealed_dek]`.

use custodia::error::KmsError;

/// Current envelope version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Parsed envelope header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kek_id: String,
    pub wrapped_dek: Vec<u8>,
    pub nonce: Vec<u8>,
}

fn invalid(msg: impl Into<String>) -> KmsError {
    KmsError::InvalidCiphertext(msg.into())
}

impl Envelope {
    /// Writes the header followed by `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::Service` if a length does not fit its prefix.
    pub fn seal(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let kek_id_len = u8::try_from(self.kek_id.len())
            .map_err(|_| KmsError::Service(format!("KEK id too long: {} bytes", self.kek_id.len())))?;
        let wrapped_dek_len = u16::try_from(self.wrapped_dek.len())
            .map_err(|_| KmsError::Service("wrapped DEK too long".to_string()))?;
        let nonce_len = u8::try_from(self.nonce.len())
            .map_err(|_| KmsError::Service("nonce too long".to_string()))?;

        let mut bytes = Vec::with_capacity(
            5 + self.kek_id.len() + self.wrapped_dek.len() + self.nonce.len() + ciphertext.len(),
        );
        bytes.push(ENVELOPE_VERSION);
        bytes.push(kek_id_len);
        bytes.extend_from_slice(self.kek_id.as_bytes());
        bytes.extend_from_slice(&wrapped_dek_len.to_be_bytes());
        bytes.extend_from_slice(&self.wrapped_dek);
        bytes.push(nonce_len);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(ciphertext);
        Ok(bytes)
    }

    /// Splits a blob into its header and ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::InvalidCiphertext` if the blob is truncated or
    /// carries an unknown version.
    pub fn open(data: &[u8]) -> Result<(Self, &[u8]), KmsError> {
        let mut reader = Reader { data, pos: 0 };

        let version = reader.byte("version")?;
        if version != ENVELOPE_VERSION {
            return Err(invalid(format!("unsupported envelope version {version}")));
        }

        let kek_id_len = usize::from(reader.byte("KEK id length")?);
        let kek_id = String::from_utf8(reader.take(kek_id_len, "KEK id")?.to_vec())
            .map_err(|_| invalid("KEK id is not UTF-8"))?;

        let len = reader.take(2, "wrapped DEK length")?;
        let wrapped_dek_len = usize::from(u16::from_be_bytes([len[0], len[1]]));
        let wrapped_dek = reader.take(wrapped_dek_len, "wrapped DEK")?.to_vec();

        let nonce_len = usize::from(reader.byte("nonce length")?);
        let nonce = reader.take(nonce_len, "nonce")?.to_vec();

        Ok((Self { kek_id, wrapped_dek, nonce }, &data[reader.pos..]))
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], KmsError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let end = end.ok_or_else(|| invalid(format!("{what} truncated")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, what: &str) -> Result<u8, KmsError> {
        Ok(self.take(1, what)?[0])
    }
}
