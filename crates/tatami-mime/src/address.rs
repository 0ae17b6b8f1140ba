//! Mailbox address normalization.

/// Extracts and normalizes the first address in a `From`-style header.
///
/// `Coach Name <Coach@Example.COM>` becomes `coach@example.com`. Returns
/// `None` when no plausible `local@domain` address is present.
#[must_use]
pub fn normalize_address(value: &str) -> Option<String> {
    let candidate = match (value.rfind('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => first_bare_address(value),
    };

    let address = candidate.trim().trim_matches('"').to_ascii_lowercase();
    let (local, domain) = address.split_once('@')?;
    let valid = !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace);
    valid.then_some(address)
}

/// `a@b (Comment), c@d` -> `a@b`.
fn first_bare_address(value: &str) -> &str {
    let first = value.split(',').next().unwrap_or(value);
    first.split('(').next().unwrap_or(first)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn angle_brackets_and_case() {
        assert_eq!(
            normalize_address("\"Ivanov, Coach\" <Coach@Example.COM>").as_deref(),
            Some("coach@example.com")
        );
    }

    #[test]
    fn bare_address_with_comment() {
        assert_eq!(
            normalize_address("club@dojo.org (Dojo)").as_deref(),
            Some("club@dojo.org")
        );
    }

    #[test]
    fn rejects_non_addresses() {
        assert_eq!(normalize_address("undisclosed-recipients"), None);
        assert_eq!(normalize_address("<@example.com>"), None);
        assert_eq!(normalize_address("a b@example.com"), None);
        assert_eq!(normalize_address(""), None);
    }
}
