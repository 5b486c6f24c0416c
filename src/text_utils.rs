//! Text folding helpers shared by category names and receipt parsing.

/// Replace Latin accented letters with their unaccented ASCII base.
/// Characters without a mapping are returned unchanged.
pub fn fold_diacritics(s: &str) -> String {
    s.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        _ => c,
    }
}

/// Lowercase slug with words joined by single hyphens.
///
/// `"Alimentação"` and `"alimentacao"` produce the same slug, which is what
/// makes category names unique regardless of accents and case. ASCII
/// punctuation is dropped; other characters that do not fold (`"日本"`,
/// emoji) are kept lowercased so they stay distinct.
pub fn slugify(s: &str) -> String {
    let folded = fold_diacritics(s).to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    let mut pending_hyphen = false;

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() || !(c.is_ascii() || c.is_whitespace()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
    }

    slug
}

/// Lowercased, accent-free form used for keyword matching.
pub fn fold_lower(s: &str) -> String {
    fold_diacritics(s).to_lowercase()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_strips_accents_and_case() {
        assert_eq!(slugify("Alimentação"), "alimentacao");
        assert_eq!(slugify("  Pet   Shop "), "pet-shop");
        assert_eq!(slugify("Farmácia & Saúde"), "farmacia-saude");
        assert_eq!(slugify("FARMACIA"), slugify("farmácia"));
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_keeps_unfoldable_characters() {
        assert_eq!(slugify("🍕"), "🍕");
        assert_ne!(slugify("🍕"), slugify("🚗"));
        assert_eq!(slugify("Ωmega Ações"), "ωmega-acoes");
    }

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("  a \n b\t c "), "a b c");
    }
}
