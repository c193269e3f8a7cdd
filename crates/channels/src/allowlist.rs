use std::collections::BTreeSet;

use tracing::{info, warn};

/// Optional admission filter over sender identifiers.
///
/// Built once from a comma-separated configuration string of E.164 phone
/// numbers and immutable afterwards. An empty configuration disables the
/// filter entirely — a distinct state from an enabled list, not inferred
/// from set emptiness at query time.
#[derive(Debug, Clone)]
pub struct Allowlist {
    numbers: BTreeSet<String>,
    enabled: bool,
}

impl Allowlist {
    /// Parse a configuration string. Invalid entries are dropped with a
    /// warning each; they never abort construction. Zero valid entries
    /// leaves the filter disabled.
    #[must_use]
    pub fn from_config_str(raw: &str) -> Self {
        let mut numbers = BTreeSet::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if is_valid_e164(entry) {
                numbers.insert(entry.to_string());
            } else {
                warn!(
                    entry,
                    "invalid allow-list entry, expected E.164 like +60123456789"
                );
            }
        }

        let enabled = !numbers.is_empty();
        if enabled {
            info!(count = numbers.len(), "allow-list enabled");
        } else {
            info!("allow-list disabled, accepting messages from all senders");
        }
        Self { numbers, enabled }
    }

    /// Membership test; pure and side-effect free. Always true when the
    /// filter is disabled. No normalization is applied — callers supply
    /// identifiers already in canonical E.164 form.
    #[must_use]
    pub fn is_allowed(&self, sender_id: &str) -> bool {
        !self.enabled || self.numbers.contains(sender_id)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validated entries, for introspection and startup logging.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.numbers.iter().map(String::as_str)
    }
}

/// E.164 check: `+`, then 2–15 digits with a non-zero first digit.
#[must_use]
pub fn is_valid_e164(candidate: &str) -> bool {
    let Some(digits) = candidate.strip_prefix('+') else {
        return false;
    };
    (2..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}
