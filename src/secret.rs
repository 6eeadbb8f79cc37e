//! Secret input cleanup and alphabet validation.
//!
//! Users paste secrets with spaces, hyphens and lower-case letters; all of
//! those are dropped or folded before validation and before the secret is
//! handed to a [`CodeSource`](crate::code::CodeSource).

const BASE32_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const HEX_ALPHABET: &str = "0123456789ABCDEF";

/// Strips whitespace and hyphens and upper-cases the rest.
pub fn normalize_secret(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Whether the normalized secret is entirely base32 or entirely hex.
pub fn is_valid_secret(raw: &str) -> bool {
    let cleaned = normalize_secret(raw);
    if cleaned.is_empty() {
        return false;
    }

    let within = |alphabet: &str| cleaned.chars().all(|c| alphabet.contains(c));
    within(BASE32_ALPHABET) || within(HEX_ALPHABET)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{is_valid_secret, normalize_secret};

    #[test]
    fn normalizes_pasted_secret() {
        assert_eq!("JBSWY3DPEHPK3PXP", normalize_secret(" jbsw-y3dp ehpk\t3pxp "));
    }

    #[rstest]
    #[case("JBSWY3DPEHPK3PXP", true)]
    #[case("jbsw y3dp-ehpk 3pxp", true)]
    #[case("0123456789abcdef", true)]
    #[case("DEADBEEF", true)]
    #[case("JBSWY3DP0189", false)]
    #[case("hello!", false)]
    #[case("", false)]
    #[case(" - - ", false)]
    fn validates_secret_alphabet(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(expected, is_valid_secret(input));
    }
}
