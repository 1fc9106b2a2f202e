//! BIP-39 mnemonic generation and restoration.

use bip39::{Language, Mnemonic};
use rand::RngCore;

use crate::error::WalletError;

/// Supported mnemonic lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordCount {
    /// 12 words, 128 bits of entropy.
    #[default]
    Twelve,
    /// 24 words, 256 bits of entropy.
    TwentyFour,
}

impl WordCount {
    /// Entropy length in bytes.
    pub fn entropy_len(self) -> usize {
        match self {
            WordCount::Twelve => 16,
            WordCount::TwentyFour => 32,
        }
    }

    /// Number of words in the phrase.
    pub fn words(self) -> usize {
        match self {
            WordCount::Twelve => 12,
            WordCount::TwentyFour => 24,
        }
    }
}

impl TryFrom<usize> for WordCount {
    type Error = WalletError;

    fn try_from(words: usize) -> Result<Self, Self::Error> {
        match words {
            12 => Ok(WordCount::Twelve),
            24 => Ok(WordCount::TwentyFour),
            n => Err(WalletError::InvalidMnemonic(format!(
                "expected 12 or 24 words, got {n}"
            ))),
        }
    }
}

/// Generate a fresh English mnemonic from the OS cryptographic RNG.
pub fn generate_mnemonic(count: WordCount) -> Result<Mnemonic, WalletError> {
    let mut entropy = [0u8; 32];
    let len = count.entropy_len();
    rand::rngs::OsRng.fill_bytes(&mut entropy[..len]);
    let result = Mnemonic::from_entropy_in(Language::English, &entropy[..len])
        .map_err(|e| WalletError::DerivationFailure(format!("mnemonic from entropy: {e}")));
    zeroize::Zeroize::zeroize(&mut entropy);
    result
}

/// Parse a BIP-39 mnemonic phrase, validating words and checksum.
///
/// Normalizes whitespace and converts to lowercase before parsing. Only
/// 12- and 24-word phrases are accepted.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let words = normalized.split(' ').filter(|w| !w.is_empty()).count();
    WordCount::try_from(words)?;
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    #[test]
    fn generate_twelve_words() {
        let m = generate_mnemonic(WordCount::Twelve).unwrap();
        assert_eq!(m.word_count(), 12);
    }

    #[test]
    fn generate_twenty_four_words() {
        let m = generate_mnemonic(WordCount::TwentyFour).unwrap();
        assert_eq!(m.word_count(), 24);
    }

    #[test]
    fn generated_phrases_differ() {
        let a = generate_mnemonic(WordCount::Twelve).unwrap();
        let b = generate_mnemonic(WordCount::Twelve).unwrap();
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn generated_phrase_parses_back() {
        let m = generate_mnemonic(WordCount::TwentyFour).unwrap();
        let parsed = parse_mnemonic(&m.to_string()).unwrap();
        assert_eq!(m.to_entropy(), parsed.to_entropy());
    }

    #[test]
    fn canonical_vector_parses() {
        let m = parse_mnemonic(ABANDON_ABOUT).unwrap();
        assert_eq!(m.to_entropy(), vec![0u8; 16]);
    }

    /// A phrase containing an invalid BIP-39 word must be rejected.
    #[test]
    fn invalid_word_rejected() {
        let phrase = ABANDON_ABOUT.replace("about", "invalidword");
        let err = parse_mnemonic(&phrase).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    }

    /// Valid words but wrong last word (checksum mismatch) must be rejected.
    #[test]
    fn bad_checksum_rejected() {
        let words = vec!["abandon"; 12];
        let err = parse_mnemonic(&words.join(" ")).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    }

    /// Extra spaces, tabs and upper case must be normalized away.
    #[test]
    fn whitespace_and_case_normalization() {
        let messy = ABANDON_ABOUT
            .to_uppercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" \t  ");
        let m = parse_mnemonic(&format!("  {messy}\n")).unwrap();
        assert_eq!(m.to_entropy(), vec![0u8; 16]);
    }

    /// 15-word phrases are valid BIP-39 but not a supported wallet length.
    #[test]
    fn unsupported_length_rejected() {
        let err = parse_mnemonic("abandon abandon").unwrap_err();
        assert_eq!(
            err,
            WalletError::InvalidMnemonic("expected 12 or 24 words, got 2".into())
        );
    }

    #[test]
    fn word_count_conversions() {
        assert_eq!(WordCount::try_from(12).unwrap(), WordCount::Twelve);
        assert_eq!(WordCount::try_from(24).unwrap().entropy_len(), 32);
        assert!(WordCount::try_from(18).is_err());
    }
}
