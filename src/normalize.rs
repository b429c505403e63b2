//! Turns raw user input into a search key.

/// Characters trimmed from either end of the term.
const BOUNDARY_CHARS: &[char] = &[
    '<', '>', '"', '-', '?', '`', '!', '[', ']', '(', ')', '{', '}', '/', '\\', ':', ';', ',',
    '$', '*', '#', '%', '^', '|', '~', '=', '+', '@',
];

/// Characters removed wherever they occur.
const EMBEDDED_CHARS: &[char] = &['(', ')', '<', '>', '[', ']', '&', '\\', '\n'];

/// Cleans a raw search term.
///
/// Whitespace and boundary punctuation are trimmed from both ends, trailing
/// apostrophes are dropped, and bracket-like characters are removed anywhere
/// in the term. Case is preserved. Input with no alphanumeric character left
/// yields an empty string, which callers must treat as invalid input rather
/// than as a term with no matches.
pub fn normalize(raw: &str) -> String {
    let mut text: String = raw.chars().filter(|c| !EMBEDDED_CHARS.contains(c)).collect();
    loop {
        let trimmed = text
            .trim_matches(|c: char| c.is_whitespace() || BOUNDARY_CHARS.contains(&c))
            .trim_end_matches('\'');
        if trimmed.len() == text.len() {
            break;
        }
        text = trimmed.to_string();
    }
    if !text.chars().any(char::is_alphanumeric) {
        return String::new();
    }
    text
}

/// Display form of a stored lemma: underscores become spaces.
pub fn display_form(lemma: &str) -> String {
    lemma.replace('_', " ").trim().to_string()
}

/// Key used by the lemma index: display form, lowercased.
pub fn search_key(term: &str) -> String {
    display_form(term).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace_and_keeps_case() {
        assert_eq!(normalize("  Cat  "), "Cat");
    }

    #[test]
    fn strips_boundary_punctuation() {
        assert_eq!(normalize("\"hello?\""), "hello");
        assert_eq!(normalize("-- word; "), "word");
        assert_eq!(normalize("{set}"), "set");
        assert_eq!(normalize("dogs'"), "dogs");
    }

    #[test]
    fn keeps_inner_apostrophes_and_hyphens() {
        assert_eq!(normalize("o'clock"), "o'clock");
        assert_eq!(normalize("well-being"), "well-being");
        assert_eq!(normalize("'tis"), "'tis");
    }

    #[test]
    fn removes_embedded_brackets() {
        assert_eq!(normalize("a(b)c"), "abc");
        assert_eq!(normalize("ro<c>k & roll"), "rock  roll");
        assert_eq!(normalize("line\nbreak"), "linebreak");
        assert_eq!(normalize("back\\slash"), "backslash");
    }

    #[test]
    fn punctuation_only_input_is_empty() {
        assert_eq!(normalize("$$$"), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("?!-"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "  Cat  ",
            "\"(hello)\"",
            " -' word '- ",
            "x)'",
            "[[nested]]'''",
            "a & b",
            "$$$",
            "  ' - ' ",
            "don't'",
            "\t:tab;\n",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn search_key_folds_case_and_underscores() {
        assert_eq!(search_key("Ice_Cream"), "ice cream");
        assert_eq!(display_form(" true_cat "), "true cat");
    }
}
