//! Longest-prefix category matcher

/// Result of matching an entry against the label set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Matched label, spelled the way the entry spelled it
    pub label: Option<String>,
    /// Trimmed text following the label (the whole input when unmatched)
    pub remainder: String,
    /// Display text: `=label=`, `=label= (remainder)` or the input unchanged
    pub text: String,
}

/// Matches entry text against a fixed set of category labels.
///
/// Labels are kept sorted by descending length so the first hit is always
/// the longest one; a short label never shadows a longer label that starts
/// with it.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    labels: Vec<String>,
}

impl CategoryMatcher {
    /// Create a matcher over the given labels
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .filter(|l: &String| !l.is_empty())
            .collect();
        labels.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        Self { labels }
    }

    /// Labels in matching order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of known labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Classify already-normalized entry content
    pub fn classify(&self, content: &str) -> Classification {
        let unmatched = || Classification {
            label: None,
            remainder: content.to_string(),
            text: content.to_string(),
        };

        if content.is_empty() {
            return unmatched();
        }

        let Some(end) = self
            .labels
            .iter()
            .find_map(|label| prefix_end(content, label))
        else {
            return unmatched();
        };

        let label = &content[..end];
        let remainder = content[end..].trim();
        let text = if remainder.is_empty() {
            format!("={}=", label)
        } else {
            format!("={}= ({})", label, remainder)
        };

        Classification {
            label: Some(label.to_string()),
            remainder: remainder.to_string(),
            text,
        }
    }
}

/// Byte offset where `label` ends in `text`, if `text` starts with it
/// (ignoring case) and the label is followed by whitespace or nothing.
fn prefix_end(text: &str, label: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in label.chars() {
        let (_, actual) = chars.next()?;
        if !eq_ignore_case(expected, actual) {
            return None;
        }
    }

    match chars.next() {
        None => Some(text.len()),
        Some((idx, c)) if c.is_whitespace() => Some(idx),
        Some(_) => None,
    }
}

fn eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Lowercase the first character when it is uppercase; the rest is untouched
pub(crate) fn lowercase_initial(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => first.to_lowercase().chain(chars).collect(),
        _ => text.to_string(),
    }
}

/// Extract the category from a rendered `=label=...` line
pub fn label_of(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('=')?;
    let end = rest.find('=')?;
    let label = &rest[..end];
    (!label.is_empty()).then_some(label)
}

/// Whether two rendered lines carry the same category (case-insensitive)
pub fn same_label(a: &str, b: &str) -> bool {
    match (label_of(a), label_of(b)) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> CategoryMatcher {
        CategoryMatcher::new(["уд", "пианино", "уд155", "занятие гитарой", "гитара"])
    }

    #[test]
    fn test_longest_label_wins() {
        let result = matcher().classify("уд155 подробности");
        assert_eq!(result.label.as_deref(), Some("уд155"));
        assert_eq!(result.text, "=уд155= (подробности)");
    }

    #[test]
    fn test_short_label_still_matches_alone() {
        let result = matcher().classify("уд гаммы");
        assert_eq!(result.label.as_deref(), Some("уд"));
        assert_eq!(result.remainder, "гаммы");
    }

    #[test]
    fn test_label_order_is_by_length() {
        let m = matcher();
        assert_eq!(m.labels()[0], "занятие гитарой");
        assert_eq!(m.labels().last().unwrap(), "уд");
        assert_eq!(m.len(), 5);
    }

    #[test]
    fn test_multi_word_label() {
        let result = matcher().classify("занятие гитарой 40 минут");
        assert_eq!(result.text, "=занятие гитарой= (40 минут)");
    }

    #[test]
    fn test_label_without_remainder() {
        let result = matcher().classify("пианино");
        assert_eq!(result.text, "=пианино=");
        assert_eq!(result.remainder, "");
    }

    #[test]
    fn test_requires_word_boundary() {
        let result = matcher().classify("удача пришла");
        assert_eq!(result.label, None);
        assert_eq!(result.text, "удача пришла");
    }

    #[test]
    fn test_case_insensitive_keeps_input_spelling() {
        let result = matcher().classify("ПИАНИНО этюд");
        assert_eq!(result.label.as_deref(), Some("ПИАНИНО"));
        assert_eq!(result.text, "=ПИАНИНО= (этюд)");
    }

    #[test]
    fn test_tab_counts_as_boundary() {
        let result = matcher().classify("гитара\tбарре");
        assert_eq!(result.text, "=гитара= (барре)");
    }

    #[test]
    fn test_empty_content() {
        let result = matcher().classify("");
        assert_eq!(result.label, None);
        assert_eq!(result.text, "");
    }

    #[test]
    fn test_empty_label_set() {
        let m = CategoryMatcher::new(Vec::<String>::new());
        assert!(m.is_empty());
        assert_eq!(m.classify("пианино").text, "пианино");
    }

    #[test]
    fn test_lowercase_initial() {
        assert_eq!(lowercase_initial("Пианино Этюд"), "пианино Этюд");
        assert_eq!(lowercase_initial("yoga"), "yoga");
        assert_eq!(lowercase_initial("1 Thing"), "1 Thing");
        assert_eq!(lowercase_initial(""), "");
    }

    #[test]
    fn test_label_of() {
        assert_eq!(label_of("=пианино= (этюд)"), Some("пианино"));
        assert_eq!(label_of("=бег="), Some("бег"));
        assert_eq!(label_of("просто текст"), None);
        assert_eq!(label_of("=незакрыто"), None);
        assert_eq!(label_of("=="), None);
    }

    #[test]
    fn test_same_label() {
        assert!(same_label("=Пианино= (a)", "=пианино= (b)"));
        assert!(!same_label("=пианино=", "=гитара="));
        assert!(!same_label("пианино", "пианино"));
    }
}
