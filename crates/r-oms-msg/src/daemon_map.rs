//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Message schema helpers and protocol codecs."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;

/// Logical unit name to network address.
pub type DaemonMap = BTreeMap<String, String>;

/// Units that must never appear in a relay-level connect: sub-units are
/// connected through their grouping daemon in a later step, and controller
/// clients are not addressable at this level.
const EXCLUDED_UNITS: [&str; 4] = ["MMc", "PreSd", "PostSd", "VPd"];

/// Legacy unit name still used by operators and persisted state.
const LEGACY_UNIT: &str = "MMd";
/// Current logical name the fleet answers to.
const CANONICAL_UNIT: &str = "SPd";

/// Rewrite a unit name to the form the fleet expects on the wire.
pub fn canonical_unit(name: &str) -> &str {
    if name == LEGACY_UNIT {
        CANONICAL_UNIT
    } else {
        name
    }
}

/// Undo [`canonical_unit`] when surfacing result keys upward.
pub fn legacy_unit(name: &str) -> &str {
    if name == CANONICAL_UNIT {
        LEGACY_UNIT
    } else {
        name
    }
}

/// Drop units outside the relay-connect allow-list and rewrite the legacy
/// alias to its canonical name. The rewrite is symmetric with
/// [`legacy_unit`]: whatever substitution happens here is undone on the
/// inbound result keys.
pub fn sanitize_daemon_map(map: &DaemonMap) -> DaemonMap {
    let mut out = DaemonMap::new();
    for (name, address) in map {
        if EXCLUDED_UNITS.contains(&name.as_str()) {
            continue;
        }
        out.insert(canonical_unit(name).to_owned(), address.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_disallowed_units_and_rewrites_alias() {
        let mut map = DaemonMap::new();
        map.insert("EMd".into(), "10.0.0.5".into());
        map.insert("MMd".into(), "10.0.0.6".into());
        map.insert("MMc".into(), "10.0.0.7".into());
        map.insert("PreSd".into(), "10.0.0.8".into());
        map.insert("PostSd".into(), "10.0.0.9".into());
        map.insert("VPd".into(), "10.0.0.10".into());

        let sanitized = sanitize_daemon_map(&map);
        assert_eq!(sanitized.len(), 2);
        assert_eq!(sanitized.get("EMd").map(String::as_str), Some("10.0.0.5"));
        assert_eq!(sanitized.get("SPd").map(String::as_str), Some("10.0.0.6"));
    }

    #[test]
    fn alias_rewrite_is_reversible() {
        assert_eq!(canonical_unit("MMd"), "SPd");
        assert_eq!(legacy_unit("SPd"), "MMd");
        assert_eq!(legacy_unit(canonical_unit("MMd")), "MMd");
        // non-alias names pass through untouched both ways
        assert_eq!(canonical_unit("EMd"), "EMd");
        assert_eq!(legacy_unit("EMd"), "EMd");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let mut map = DaemonMap::new();
        map.insert("EMd".into(), "10.0.0.5".into());
        map.insert("SPd".into(), "10.0.0.6".into());
        let once = sanitize_daemon_map(&map);
        let twice = sanitize_daemon_map(&once);
        assert_eq!(once, twice);
    }
}
