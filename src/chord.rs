//! Decoding of chord payloads returned by `CML C1`.
//!
//! The action word packs up to twelve 10-bit action codes, least significant
//! field first, in reverse program order. The phrase is a run of hex numbers
//! with no delimiters, split greedily into 4, 3 or 2 digit tokens.

use serde::Serialize;

pub const ACTION_SLOTS: usize = 12;
pub const ACTION_BITS: u32 = 10;
pub const ACTION_MASK: u128 = (1 << ACTION_BITS) - 1;

const PHRASE_TOKEN_WIDTHS: [usize; 3] = [4, 3, 2];

/// A chord as stored on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Chord {
    pub index: u32,
    pub actions_hex: String,
    pub actions: Vec<u16>,
    pub phrase_hex: String,
    pub phrase: Vec<u16>,
}

impl Chord {
    /// Placeholder returned when the device has no readable chord at `index`.
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Builds a chord from `CML C1` payload tokens.
    ///
    /// Phrase fragments after the first are concatenated. Fewer than two tokens
    /// yields [`Chord::empty`].
    pub fn from_tokens<S: AsRef<str>>(index: u32, tokens: &[S]) -> Self {
        let [actions_hex, fragments @ ..] = tokens else {
            return Self::empty(index);
        };
        if fragments.is_empty() {
            return Self::empty(index);
        }

        let actions_hex = actions_hex.as_ref().to_string();
        let phrase_hex: String = fragments.iter().map(|fragment| fragment.as_ref()).collect();

        Self {
            index,
            actions: decode_actions(&actions_hex),
            phrase: decode_phrase(&phrase_hex),
            actions_hex,
            phrase_hex,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions_hex.is_empty() && self.phrase_hex.is_empty()
    }
}

/// Decodes the bit-packed action word. Malformed hex yields no actions.
pub fn decode_actions(hex: &str) -> Vec<u16> {
    let Some(value) = parse_action_word(hex) else {
        return Vec::new();
    };

    let mut actions: Vec<u16> = (0..ACTION_SLOTS as u32)
        .map(|slot| ((value >> (slot * ACTION_BITS)) & ACTION_MASK) as u16)
        .filter(|&action| action != 0)
        .collect();
    actions.reverse();
    actions
}

/// Decodes a delimiter-free phrase, trying 4, 3 then 2 hex digits at each
/// position and skipping a character when none of them parse.
pub fn decode_phrase(hex: &str) -> Vec<u16> {
    let bytes = hex.as_bytes();
    let mut phrase = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let token = PHRASE_TOKEN_WIDTHS.iter().find_map(|&width| {
            let digits = bytes.get(pos..pos + width)?;
            parse_hex_digits(digits).map(|value| (value, width))
        });

        match token {
            Some((value, width)) => {
                // At most four digits, so the value always fits.
                phrase.push(value as u16);
                pos += width;
            }
            None => pos += 1,
        }
    }

    phrase
}

fn parse_action_word(hex: &str) -> Option<u128> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    // Only the low 120 bits are inspected, so wider words keep their low bits.
    parse_hex_digits(digits.as_bytes())
}

fn parse_hex_digits(digits: &[u8]) -> Option<u128> {
    if digits.is_empty() {
        return None;
    }

    digits.iter().try_fold(0_u128, |acc, &b| {
        let nibble = char::from(b).to_digit(16)?;
        Some((acc << 4) | u128::from(nibble))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_actions(actions: &[u16]) -> String {
        let value = actions
            .iter()
            .rev()
            .enumerate()
            .fold(0_u128, |acc, (slot, &action)| {
                acc | (u128::from(action) << (slot as u32 * ACTION_BITS))
            });
        format!("{value:X}")
    }

    #[test]
    fn action_lists_survive_encoding() {
        let cases: [&[u16]; 5] = [
            &[],
            &[1],
            &[97, 98, 99],
            &[1023, 1, 512, 300],
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 1023],
        ];
        for actions in cases {
            assert_eq!(decode_actions(&encode_actions(actions)), actions);
        }
    }

    #[test]
    fn every_action_list_length_survives_encoding() {
        // Deterministic mix of boundary and mid-range codes in [1, 1023].
        let mut seed = 0x2545_f491_u32;
        let mut next_code = || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (((seed >> 16) % 1023) + 1) as u16
        };

        for len in 0..=ACTION_SLOTS {
            let lows = vec![1; len];
            let highs = vec![ACTION_MASK as u16; len];
            let alternating: Vec<u16> = (0..len)
                .map(|i| if i % 2 == 0 { 1 } else { 1023 })
                .collect();
            let mids: Vec<u16> = (0..len).map(|i| 500 + i as u16).collect();

            for actions in [lows, highs, alternating, mids] {
                assert_eq!(decode_actions(&encode_actions(&actions)), actions);
            }
            for _ in 0..32 {
                let actions: Vec<u16> = (0..len).map(|_| next_code()).collect();
                assert_eq!(decode_actions(&encode_actions(&actions)), actions);
            }
        }
    }

    #[test]
    fn actions_come_back_in_program_order() {
        // Field 0 holds 0x002, field 1 holds 0x001.
        assert_eq!(decode_actions("402"), vec![1, 2]);
    }

    #[test]
    fn malformed_action_words_decode_to_nothing() {
        assert!(decode_actions("0").is_empty());
        assert!(decode_actions("").is_empty());
        assert!(decode_actions("xyz").is_empty());
        assert!(decode_actions("-1").is_empty());
        assert!(decode_actions("12 34").is_empty());
    }

    #[test]
    fn accepts_prefixed_and_lowercase_words() {
        assert_eq!(decode_actions("0x402"), vec![1, 2]);
        assert_eq!(decode_actions("3ff"), vec![1023]);
    }

    #[test]
    fn oversized_word_uses_low_fields_only() {
        // 33 digits: the leading digit lies beyond the twelfth field.
        let hex = format!("F{}", "0".repeat(31) + "1");
        assert_eq!(decode_actions(&hex), vec![1]);
    }

    #[test]
    fn phrase_prefers_four_digit_tokens() {
        assert_eq!(decode_phrase("00610062"), vec![0x0061, 0x0062]);
        assert_eq!(decode_phrase("616263"), vec![0x6162, 0x63]);
    }

    #[test]
    fn phrase_falls_back_to_shorter_tokens_at_the_end() {
        assert_eq!(decode_phrase("ABCDE"), vec![0xABCD]);
        assert_eq!(decode_phrase("ABCDEF"), vec![0xABCD, 0xEF]);
        assert_eq!(decode_phrase("ABCDEF1"), vec![0xABCD, 0xEF1]);
        assert_eq!(decode_phrase("A"), Vec::<u16>::new());
    }

    #[test]
    fn phrase_skips_characters_that_cannot_start_a_token() {
        assert_eq!(decode_phrase("zz0061"), vec![0x0061]);
        assert_eq!(decode_phrase("61g62"), vec![0x61, 0x62]);
        assert!(decode_phrase("").is_empty());
    }

    #[test]
    fn chord_joins_phrase_fragments() {
        let chord = Chord::from_tokens(4, &["402", "0061", "0062"]);
        assert_eq!(chord.index, 4);
        assert_eq!(chord.actions, vec![1, 2]);
        assert_eq!(chord.phrase_hex, "00610062");
        assert_eq!(chord.phrase, vec![0x61, 0x62]);
    }

    #[test]
    fn short_payload_gives_empty_chord() {
        let chord = Chord::from_tokens(9, &["402"]);
        assert_eq!(chord, Chord::empty(9));
        assert!(chord.is_empty());
    }
}
