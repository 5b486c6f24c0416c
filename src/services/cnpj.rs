//! CNPJ (Brazilian company tax id) checksum validation and formatting.

const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rest = 11 - sum % 11;
    if rest >= 10 {
        0
    } else {
        rest
    }
}

/// Validate a CNPJ in any punctuation. Exactly 14 digits are required, all
/// identical digits are rejected, and both mod-11 check digits must match.
pub fn is_valid(input: &str) -> bool {
    let digits: Vec<u32> = input.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 14 {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12], &FIRST_WEIGHTS);
    if first != digits[12] {
        return false;
    }
    let second = check_digit(&digits[..13], &SECOND_WEIGHTS);
    second == digits[13]
}

/// `"11222333000181"` → `"11.222.333/0001-81"`. Input that is not 14 digits
/// is returned unchanged.
pub fn format(input: &str) -> String {
    let d = digits_only(input);
    if d.len() != 14 {
        return input.trim().to_string();
    }
    format!(
        "{}.{}.{}/{}-{}",
        &d[0..2],
        &d[2..5],
        &d[5..8],
        &d[8..12],
        &d[12..14]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "11222333000181";

    #[test]
    fn test_valid_cnpj() {
        assert!(is_valid(VALID));
        assert!(is_valid("11.222.333/0001-81"));
        assert!(is_valid("45.997.418/0001-53"));
    }

    #[test]
    fn test_every_single_digit_mutation_fails() {
        let digits: Vec<char> = VALID.chars().collect();
        for pos in 0..digits.len() {
            for replacement in '0'..='9' {
                if replacement == digits[pos] {
                    continue;
                }
                let mut mutated = digits.clone();
                mutated[pos] = replacement;
                let candidate: String = mutated.into_iter().collect();
                assert!(!is_valid(&candidate), "{} should be invalid", candidate);
            }
        }
    }

    #[test]
    fn test_rejects_wrong_length_and_repeated_digits() {
        assert!(!is_valid("1122233300018"));
        assert!(!is_valid("112223330001812"));
        assert!(!is_valid("00000000000000"));
        assert!(!is_valid("11111111111111"));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_format() {
        assert_eq!(format(VALID), "11.222.333/0001-81");
        assert_eq!(format("123"), "123");
    }
}
