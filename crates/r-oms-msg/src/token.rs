//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use chrono::{Local, Timelike};
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 3;

/// Mint a correlation token of the form `HHMM_<epoch-millis>_<suffix>`.
///
/// The time-of-day prefix keeps tokens human-sortable in captured logs,
/// the millisecond timestamp keeps them unique across operations, and the
/// random suffix disambiguates tokens minted within the same millisecond.
pub fn make_token() -> String {
    let now = Local::now();
    let millis = now.timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!(
        "{:02}{:02}_{}_{}",
        now.hour(),
        now.minute(),
        millis,
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_shape_is_stable() {
        let token = make_token();
        let parts: Vec<&str> = token.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), SUFFIX_LEN);
    }

    #[test]
    fn tokens_are_unique_within_a_burst() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(make_token()));
        }
    }
}
