//! Time-based one-time password display with a wall-clock aligned countdown
//! and a light/dark theme preference shared across sibling hosts.
//!
//! The crate is meant to be hosted on a single-threaded tokio runtime inside a
//! [`tokio::task::LocalSet`]: both repeating timers (the countdown tick and the
//! theme reconciliation poll) are spawned as local tasks.

pub mod app;
pub mod clock;
pub mod code;
pub mod config;
pub mod cookie;
pub mod panel;
pub mod scheduler;
pub mod secret;
pub mod store;
pub mod sync;
pub mod theme;
pub mod totp;

use std::{fmt::Display, str::FromStr};

use hmac::{digest::KeyInit, Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Secret decode error")]
    SecretDecode(data_encoding::DecodeError),
    #[error("Base32 decoder could not be built")]
    SecretEncoding(data_encoding::SpecificationError),
    #[error("Invalid digest")]
    InvalidDigest(Vec<u8>),
    #[error("Invalid hashing algorithm, found {0}. Expected one of: SHA1, SHA256 or SHA512")]
    InvalidHashingAlgorithm(String),
    #[error("The HMAC key could not be constructed from the secret")]
    InvalidKey,
    #[error("The period must be at least one second")]
    InvalidPeriod,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum OtpHashAlgorithm {
    #[default]
    SHA1,
    SHA256,
    SHA512,
}

impl Display for OtpHashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SHA1 => write!(f, "SHA1"),
            Self::SHA256 => write!(f, "SHA256"),
            Self::SHA512 => write!(f, "SHA512"),
        }
    }
}

impl FromStr for OtpHashAlgorithm {
    type Err = OtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_uppercase();

        match normalized.as_str() {
            "SHA1" => Ok(Self::SHA1),
            "SHA256" => Ok(Self::SHA256),
            "SHA512" => Ok(Self::SHA512),
            _ => Err(OtpError::InvalidHashingAlgorithm(s.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct OtpCode {
    code: u32,
    digits: u32,
}

impl OtpCode {
    pub fn integer(&self) -> u32 {
        self.code
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }
}

impl Display for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0padding$}",
            self.code,
            padding = (self.digits as usize)
        )
    }
}

pub trait Otp {
    /// Decodes a secret (given as an RFC4648 base32-encoded ASCII string)
    /// into a byte string
    ///
    /// Decoding is lenient the way authenticator apps are: padding is
    /// optional, leftover bits in the last symbol are ignored and a trailing
    /// symbol that cannot complete a byte is dropped.
    fn decode_secret(secret: &str) -> Result<Vec<u8>, OtpError> {
        let mut spec = data_encoding::BASE32_NOPAD.specification();
        spec.check_trailing_bits = false;
        let base32 = spec.encoding().map_err(OtpError::SecretEncoding)?;

        let input = secret.trim_end_matches('=').as_bytes();
        let usable = match input.len() % 8 {
            1 | 3 | 6 => input.len() - 1,
            _ => input.len(),
        };

        base32
            .decode(&input[..usable])
            .map_err(OtpError::SecretDecode)
    }

    /// Calculates the HMAC digest of the big-endian counter for the given secret.
    fn calc_digest(
        &self,
        decoded_secret: &[u8],
        algorithm: OtpHashAlgorithm,
        data: u64,
    ) -> Result<Vec<u8>, OtpError> {
        let data = data.to_be_bytes();

        match algorithm {
            OtpHashAlgorithm::SHA1 => sign::<Hmac<Sha1>>(decoded_secret, &data),
            OtpHashAlgorithm::SHA256 => sign::<Hmac<Sha256>>(decoded_secret, &data),
            OtpHashAlgorithm::SHA512 => sign::<Hmac<Sha512>>(decoded_secret, &data),
        }
    }

    /// Encodes the HMAC digest into a truncated integer.
    fn encode_digest_truncated(digest: &[u8], target_digits_count: u32) -> Result<u32, OtpError> {
        // While sometimes this is a hardcoded 19
        // the last byte tells us the offset for any algorithm
        let offset = match digest.last() {
            Some(x) => *x & 0xf,
            None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
        } as usize;

        // Gets the 4 bytes that will compose the code
        let code_bytes: [u8; 4] = match digest.get(offset..offset + 4).map(<[u8; 4]>::try_from) {
            Some(Ok(x)) => x,
            _ => return Err(OtpError::InvalidDigest(Vec::from(digest))),
        };

        let code = u32::from_be_bytes(code_bytes);
        let truncation_factor = u32::pow(10, target_digits_count);

        Ok((code & 0x7fffffff) % truncation_factor)
    }
}

fn sign<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, OtpError> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| OtpError::InvalidKey)?;
    mac.update(data);

    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::{totp::Totp, Otp, OtpCode, OtpHashAlgorithm};

    #[rstest]
    #[case("sha1", OtpHashAlgorithm::SHA1)]
    #[case("Sha256", OtpHashAlgorithm::SHA256)]
    #[case("SHA512", OtpHashAlgorithm::SHA512)]
    fn parses_algorithm_names(#[case] input: &str, #[case] expected: OtpHashAlgorithm) {
        assert_eq!(expected, input.parse::<OtpHashAlgorithm>().unwrap());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!("md5".parse::<OtpHashAlgorithm>().is_err());
    }

    #[test]
    fn pads_code_to_digit_count() {
        let code = OtpCode { code: 4242, digits: 6 };
        assert_eq!("004242", code.to_string());
    }

    #[rstest]
    // leftover bits set in the last symbol
    #[case("JBSWY3DPEHPK3PXPJBSWY3DPEH", "JBSWY3DPEHPK3PXPJBSWY3DPEE")]
    // a lone trailing symbol carries no full byte
    #[case("JBSWY3DPEHPK3PXPJ", "JBSWY3DPEHPK3PXP")]
    #[case("JBSWY3DPEHPK3PXPJBS", "JBSWY3DPEHPK3PXPJB")]
    #[case("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ====", "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ")]
    fn decodes_secrets_leniently(#[case] loose: &str, #[case] canonical: &str) {
        assert_eq!(
            Totp::decode_secret(canonical).unwrap(),
            Totp::decode_secret(loose).unwrap()
        );
    }
}
