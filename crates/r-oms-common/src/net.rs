//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Shared primitives and utilities for the R-OMS runtime."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Small address validation helpers used by the sequencer's fail-fast
//! input checks. Daemon addresses are dotted-quad IPv4 in this fleet;
//! hostnames are accepted for the relay host only.

/// Syntactic IPv4 check. Octet range is enforced; leading zeros are allowed
/// because several daemon configs in the field carry them.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    let candidate = candidate.trim();
    let octets: Vec<&str> = candidate.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    octets
        .iter()
        .all(|octet| !octet.is_empty() && octet.len() <= 3 && octet.parse::<u16>().map_or(false, |v| v <= 255))
}

/// Port check mirroring the classic TCP range; zero is rejected.
pub fn is_valid_port(port: u16) -> bool {
    port > 0
}

/// Extract the first dotted-quad from a free-form host string. Node hosts
/// may look like `10.82.104.210:19776 (8/9)` when they come from status
/// displays; the address alone is what the transport needs.
pub fn extract_ipv4(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if bytes[start].is_ascii_digit() {
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
                end += 1;
            }
            let slice = &raw[start..end];
            let trimmed = slice.trim_end_matches('.');
            if is_valid_ipv4(trimmed) {
                return Some(trimmed.to_owned());
            }
            start = end;
        }
        start += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_ipv4("10.0.0.5"));
        assert!(is_valid_ipv4("255.255.255.255"));
        assert!(!is_valid_ipv4("10.0.0"));
        assert!(!is_valid_ipv4("10.0.0.256"));
        assert!(!is_valid_ipv4("example.com"));
    }

    #[test]
    fn extracts_address_from_annotated_host() {
        assert_eq!(
            extract_ipv4("10.82.104.210:19776 (8/9)").as_deref(),
            Some("10.82.104.210")
        );
        assert_eq!(extract_ipv4("no address here"), None);
    }

    #[test]
    fn rejects_zero_port() {
        assert!(!is_valid_port(0));
        assert!(is_valid_port(19765));
    }
}
