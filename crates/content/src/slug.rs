//! URL path cleaning.

use rslug::slugify;

// Various quotation marks: '"''""„‛`«»‹›
const QUOTATION_MARKS: [char; 13] = [
    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}', '\u{0060}',
    '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
];

/// Turn arbitrary text (a title or a user-supplied path hint) into a
/// path-safe slug.
///
/// Quotation marks are stripped before slugifying so that `Don't Panic`
/// becomes `dont-panic` rather than `don-t-panic`. The result may be empty
/// when the input has no sluggable characters.
pub fn clean(text: impl AsRef<str>) -> String {
    let stripped: String = text.as_ref().chars().filter(|c| !QUOTATION_MARKS.contains(c)).collect();
    slugify!(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Hello", "hello")]
    #[case("Hello World", "hello-world")]
    #[case("Don't Panic", "dont-panic")]
    #[case("\u{201C}Quoted\u{201D} Title", "quoted-title")]
    #[case("already-a-slug", "already-a-slug")]
    #[case("", "")]
    fn test_clean(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean(input), expected);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = clean("Some Title, With Punctuation!");
        assert_eq!(clean(&once), once);
    }
}
