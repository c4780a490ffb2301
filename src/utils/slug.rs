/// Derive a URL-safe organization slug from a display name.
///
/// Lowercases, collapses every non-alphanumeric run into a single hyphen, and
/// trims leading/trailing hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
    }

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(slugify("Acme,  Inc."), "acme-inc");
    }

    #[test]
    fn trims_edge_separators() {
        assert_eq!(slugify("  --Acme--  "), "acme");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(slugify("!!!"), "");
    }
}
