//! Candidate substring patterns from raw statement descriptions.
//!
//! Bank descriptions bury the merchant name in processor noise
//! (`"CHECKCARD PURCHASE STARBUCKS #1234 SEATTLE WA"`). The extractor
//! uppercases, splits on the separators processors use, drops short and
//! numeric tokens plus a fixed noise vocabulary, and keeps at most the first
//! two survivors: the lead token alone and, when a second survives, the
//! two-token phrase.

fn is_separator(c: char) -> bool {
    matches!(
        c,
        '*' | '#' | '@' | '!' | '-' | '_' | '/' | '\\' | '.' | ',' | '+' | '&'
    )
}

/// Banking boilerplate that never identifies a merchant. Uppercase only;
/// callers uppercase before filtering.
fn is_noise(token: &str) -> bool {
    matches!(
        token,
        // processor vocabulary
        "ACH" | "ATM" | "AUTH" | "AUTOPAY" | "BILL" | "CARD" | "CHECK" | "CHECKCARD"
            | "CREDIT" | "DEBIT" | "DEPOSIT" | "ONLINE" | "PAYMENT" | "PENDING" | "POS"
            | "PPD" | "PURCHASE" | "RECURRING" | "REF" | "TRANSFER" | "TST" | "TXN"
            | "VISA" | "WEB" | "WITHDRAWAL"
            // filler words
            | "AND" | "FOR" | "FROM" | "THE" | "WITH"
            // corporate suffixes
            | "COMPANY" | "CORP" | "INC" | "LLC" | "LTD"
            // url fragments
            | "COM" | "HTTP" | "HTTPS" | "NET" | "ORG" | "WWW"
    )
}

/// Extracts up to two candidate patterns from a description: the first
/// significant token, and the two-token phrase when a second one survives.
/// Tokens shorter than three characters or made only of digits are dropped,
/// so store numbers and two-letter state codes never become patterns.
pub fn extract_patterns(description: &str) -> Vec<String> {
    let upper = description.to_uppercase();
    let significant: Vec<&str> = upper
        .split(|c: char| c.is_whitespace() || is_separator(c))
        .filter(|t| t.len() >= 3)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !is_noise(t))
        .take(2)
        .collect();

    match significant.as_slice() {
        [] => Vec::new(),
        [first] => vec![(*first).to_string()],
        [first, second, ..] => vec![(*first).to_string(), format!("{first} {second}")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_processor_noise_and_store_numbers() {
        assert_eq!(
            extract_patterns("CHECKCARD PURCHASE STARBUCKS #1234 SEATTLE WA"),
            vec!["STARBUCKS", "STARBUCKS SEATTLE"]
        );
    }

    #[test]
    fn splits_on_processor_separators() {
        assert_eq!(
            extract_patterns("SQ *BLUE BOTTLE COFFEE"),
            vec!["BLUE", "BLUE BOTTLE"]
        );
        assert_eq!(
            extract_patterns("PAYPAL*GITHUB.COM"),
            vec!["PAYPAL", "PAYPAL GITHUB"]
        );
    }

    #[test]
    fn single_survivor_yields_one_pattern() {
        assert_eq!(extract_patterns("ACH DEPOSIT NETFLIX"), vec!["NETFLIX"]);
    }

    #[test]
    fn all_noise_yields_nothing() {
        assert!(extract_patterns("ATM WITHDRAWAL 001234").is_empty());
        assert!(extract_patterns("").is_empty());
        assert!(extract_patterns("  # * / ").is_empty());
    }

    #[test]
    fn lowercase_input_is_uppercased() {
        assert_eq!(
            extract_patterns("starbucks coffee"),
            vec!["STARBUCKS", "STARBUCKS COFFEE"]
        );
    }

    #[test]
    fn short_tokens_fall_to_the_length_filter() {
        // "WA" and "of" are too short; digits-only tokens go regardless of length.
        assert_eq!(extract_patterns("WA 12 of ACME"), vec!["ACME"]);
    }

    #[test]
    fn mixed_alphanumerics_survive_the_digit_filter() {
        assert_eq!(
            extract_patterns("7ELEVEN 36512"),
            vec!["7ELEVEN"]
        );
    }
}
