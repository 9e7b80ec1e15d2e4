/// Truncate to at most `max` characters, respecting char boundaries.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Capitalize the first letter of each whitespace-separated word.
pub(crate) fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters are not split.
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("battery life"), "Battery Life");
        assert_eq!(title_case("ditch witch"), "Ditch Witch");
        assert_eq!(title_case(""), "");
    }
}
