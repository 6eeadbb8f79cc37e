//! The code computation seam and display formatting of its output.

use crate::{secret::normalize_secret, totp::Totp, OtpError};

/// Shown while there is no valid secret to compute from.
pub const PLACEHOLDER_NO_INPUT: &str = "------";
/// Shown when the code source cannot be reached at call time.
pub const PLACEHOLDER_UNAVAILABLE: &str = "LIB ERROR";
/// Shown when the code source rejects the inputs.
pub const PLACEHOLDER_FAILED: &str = "ERROR";

#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    #[error("The code source is not available")]
    Unavailable,
    #[error("Code computation failed")]
    Failed(#[from] OtpError),
}

/// Computes the digit string valid at `unix_seconds`.
pub trait CodeSource {
    fn compute(
        &self,
        secret: &str,
        digits: u32,
        step_seconds: u64,
        unix_seconds: u64,
    ) -> Result<String, CodeError>;
}

/// RFC 6238 codes with the SHA1 hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct TotpCodeSource;

impl CodeSource for TotpCodeSource {
    fn compute(
        &self,
        secret: &str,
        digits: u32,
        step_seconds: u64,
        unix_seconds: u64,
    ) -> Result<String, CodeError> {
        let mut totp = Totp::new(normalize_secret(secret));
        totp.with_digits(digits).with_period(step_seconds);

        Ok(totp.generate(unix_seconds)?.to_string())
    }
}

/// Splits a code in two halves for readability: `"123 456"`, `"1234 5678"`.
///
/// Codes whose length does not match `digits` are returned untouched.
pub fn format_code(code: &str, digits: u32) -> String {
    let digits = digits as usize;
    if code.len() != digits || !matches!(digits, 6 | 8) {
        return code.to_string();
    }

    match (code.get(..digits / 2), code.get(digits / 2..)) {
        (Some(head), Some(tail)) => format!("{head} {tail}"),
        _ => code.to_string(),
    }
}
