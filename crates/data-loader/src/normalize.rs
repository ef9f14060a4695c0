//! Title name normalization.
//!
//! The same rule is applied to stored names, alternate names and incoming
//! catalog names, so two names are considered equal iff their normalized
//! forms are identical.

const LEADING_ARTICLES: [&str; 3] = ["the", "a", "an"];

/// Normalize a title for equality comparison.
///
/// Lowercases, turns every non-alphanumeric character (including `_`) into a
/// space, collapses whitespace and drops one leading English article when
/// something remains after it.
///
/// Example: "The Matrix" -> "matrix", "Knives Out!" -> "knives out"
pub fn normalize_title(input: &str) -> String {
    let lowered = input.to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let words: Vec<&str> = spaced.split_whitespace().collect();
    let words = match words.split_first() {
        Some((first, rest)) if !rest.is_empty() && LEADING_ARTICLES.contains(first) => rest,
        _ => &words[..],
    };
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_and_case_collapse() {
        assert_eq!(normalize_title("The Matrix"), normalize_title("matrix"));
        assert_eq!(normalize_title("The Matrix"), "matrix");
        assert_eq!(normalize_title("A Quiet Place"), "quiet place");
        assert_eq!(normalize_title("An Education"), "education");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(normalize_title("Knives Out!"), "knives out");
        assert_eq!(normalize_title("  Spider-Man:   Far_From   Home "), "spider man far from home");
        assert_eq!(normalize_title("#Roxy"), "roxy");
    }

    #[test]
    fn test_article_only_titles_survive() {
        // A lone article is the whole title, not a prefix
        assert_eq!(normalize_title("The"), "the");
        assert_eq!(normalize_title("It"), "it");
    }

    #[test]
    fn test_article_only_stripped_at_start() {
        assert_eq!(normalize_title("Theory of Everything"), "theory of everything");
        assert_eq!(normalize_title("Beauty and the Beast"), "beauty and the beast");
    }

    #[test]
    fn test_unicode_letters_kept() {
        assert_eq!(normalize_title("Amélie"), "amélie");
        assert_eq!(normalize_title("LÉON"), normalize_title("léon"));
    }

    #[test]
    fn test_stable_on_normalized_input() {
        for name in ["The Matrix", "A-ha!", "  The  Lord of the Rings ", "Jallikattu"] {
            let once = normalize_title(name);
            assert_eq!(normalize_title(&once), once);
        }
        assert_eq!(normalize_title(""), "");
        assert_eq!(normalize_title("..."), "");
    }
}
