//! Strict extractors for provider responses.
//!
//! The provider returns free text. Name-finding stages accept only a
//! plausible personal name; email-finding stages run every candidate through
//! syntactic validation, a blocked-prefix list and a TLD exclusion list,
//! then deduplicate.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
}

/// Local parts that indicate a role or machine mailbox, not a person worth
/// contacting.
pub const BLOCKED_LOCAL_PREFIXES: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "legal",
    "privacy",
    "abuse",
    "postmaster",
    "mailer-daemon",
    "spam",
    "unsubscribe",
    "webmaster",
];

/// Top-level domains excluded from outreach.
pub const EXCLUDED_TLDS: &[&str] = &["edu", "gov", "mil"];

/// A parsed personal name, split into first/last parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullName {
    pub first: String,
    pub last: String,
}

impl FullName {
    pub fn full(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}

/// Validate a single candidate email address.
pub fn is_valid_email(email: &str) -> bool {
    let Some(m) = EMAIL_RE.find(email) else {
        return false;
    };
    if m.start() != 0 || m.end() != email.len() {
        return false;
    }

    let lower = email.to_lowercase();
    let Some((local, domain)) = lower.split_once('@') else {
        return false;
    };

    if BLOCKED_LOCAL_PREFIXES.iter().any(|p| local.starts_with(p)) {
        return false;
    }

    match domain.rsplit('.').next() {
        Some(tld) => !EXCLUDED_TLDS.contains(&tld),
        None => false,
    }
}

/// Scan free text for valid email addresses, lowercased and deduplicated in
/// first-seen order.
pub fn extract_valid_emails(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in EMAIL_RE.find_iter(text) {
        let candidate = m.as_str().to_lowercase();
        if is_valid_email(&candidate) && !seen.contains(&candidate) {
            seen.push(candidate);
        }
    }
    seen
}

/// Accept a response only when it is a plausible personal name.
///
/// Rejects "not found" sentinels, anything longer than four words or 64
/// characters, and any word containing digits, `@` or other non-name
/// characters. The prompts instruct the provider to answer with just the
/// name, so a full sentence is treated as no result.
pub fn parse_full_name(text: &str) -> Option<FullName> {
    let cleaned = text
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '.' | ':' | '*'))
        .trim();
    if cleaned.is_empty() || cleaned.len() > 64 {
        return None;
    }

    let lower = cleaned.to_lowercase();
    if lower == "unknown"
        || lower == "n/a"
        || lower == "none"
        || lower.contains("not found")
        || lower.contains("not_found")
        || lower.contains("no name")
    {
        return None;
    }

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) {
        return None;
    }
    for word in &words {
        let ok = word
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, '\'' | '-' | '.'));
        if !ok {
            return None;
        }
    }

    // First and last words of a name start uppercase; particles in the
    // middle ("van", "de") may not.
    let starts_upper = |w: &str| w.chars().next().is_some_and(|c| c.is_uppercase());
    if !starts_upper(words[0]) || !starts_upper(words[words.len() - 1]) {
        return None;
    }

    Some(FullName {
        first: words[0].to_string(),
        last: words[1..].join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_personal_addresses() {
        assert!(is_valid_email("owner@acme.com"));
        assert!(is_valid_email("jane@gmail.com"));
        assert!(is_valid_email("j.doe+leads@acme.io"));
    }

    #[test]
    fn rejects_blocked_prefixes_and_tlds() {
        assert!(!is_valid_email("noreply@acme.com"));
        assert!(!is_valid_email("legal@acme.edu"));
        assert!(!is_valid_email("no-reply@acme.com"));
        assert!(!is_valid_email("privacy@acme.com"));
        assert!(!is_valid_email("jane@university.edu"));
        assert!(!is_valid_email("jane@agency.gov"));
        assert!(!is_valid_email("jane@base.mil"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("@acme.com"));
        assert!(!is_valid_email("jane@acme"));
        assert!(!is_valid_email("jane doe@acme.com"));
    }

    #[test]
    fn extraction_dedupes_and_preserves_order() {
        let text = "Try Jane@Acme.com or bob@acme.com. Also jane@acme.com \
                    and noreply@acme.com.";
        assert_eq!(
            extract_valid_emails(text),
            vec!["jane@acme.com".to_string(), "bob@acme.com".to_string()]
        );
    }

    #[test]
    fn extraction_of_empty_text() {
        assert!(extract_valid_emails("no addresses here").is_empty());
    }

    #[test]
    fn plausible_names_are_accepted() {
        let name = parse_full_name("Jane Doe").unwrap();
        assert_eq!(name.first, "Jane");
        assert_eq!(name.last, "Doe");

        let name = parse_full_name("  \"Mary O'Brien-Smith\"  ").unwrap();
        assert_eq!(name.first, "Mary");
        assert_eq!(name.last, "O'Brien-Smith");

        let name = parse_full_name("Ludwig van Beethoven").unwrap();
        assert_eq!(name.last, "van Beethoven");
    }

    #[test]
    fn sentinels_and_sentences_are_rejected() {
        assert!(parse_full_name("NOT_FOUND").is_none());
        assert!(parse_full_name("not found").is_none());
        assert!(parse_full_name("Unknown").is_none());
        assert!(parse_full_name("n/a").is_none());
        assert!(parse_full_name("The owner of this business is Jane Doe").is_none());
        assert!(parse_full_name("Jane").is_none());
        assert!(parse_full_name("jane doe").is_none());
        assert!(parse_full_name("Jane Doe123").is_none());
        assert!(parse_full_name("contact owner@acme.com").is_none());
        assert!(parse_full_name("").is_none());
    }

    proptest! {
        #[test]
        fn blocked_prefixes_never_validate(
            prefix in proptest::sample::select(BLOCKED_LOCAL_PREFIXES.to_vec()),
            rest in "[a-z0-9]{0,8}",
            domain in "[a-z]{2,10}",
        ) {
            let email = format!("{prefix}{rest}@{domain}.com");
            prop_assert!(!is_valid_email(&email));
        }

        #[test]
        fn excluded_tlds_never_validate(
            local in "[a-z][a-z0-9]{0,8}",
            domain in "[a-z]{2,10}",
            tld in proptest::sample::select(EXCLUDED_TLDS.to_vec()),
        ) {
            let email = format!("{local}@{domain}.{tld}");
            prop_assert!(!is_valid_email(&email));
        }

        #[test]
        fn extracted_emails_are_unique(text in ".{0,200}") {
            let emails = extract_valid_emails(&text);
            let mut deduped = emails.clone();
            deduped.dedup();
            prop_assert_eq!(emails.len(), deduped.len());
            for email in &emails {
                prop_assert!(is_valid_email(email));
            }
        }
    }
}
