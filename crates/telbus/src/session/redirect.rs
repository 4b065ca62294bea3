// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Aspect redirection.
//!
//! The configured attribute-group to substitute-aspect rules are applied
//! transparently before registering and before sending, so callers keep
//! addressing the nominal aspect. The bootstrap configuration-query
//! channels are exempt: they are resolved before (and in order to load)
//! the redirection table itself.

use crate::config::REDIRECT_EXEMPT_GROUPS;
use crate::session::key::DataDescription;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Atomic snapshot of the redirection rules, reloaded on (re)connect.
pub struct RedirectionTable {
    rules: ArcSwap<HashMap<u64, u64>>,
}

impl RedirectionTable {
    pub fn empty() -> Self {
        Self {
            rules: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Swap in a fresh rule snapshot.
    pub fn reload(&self, rules: HashMap<u64, u64>) {
        self.rules.store(Arc::new(rules));
    }

    /// Apply the substitute aspect for the description's attribute group,
    /// if one is configured and the group is not exempt.
    pub fn substitute(&self, description: DataDescription) -> DataDescription {
        if REDIRECT_EXEMPT_GROUPS.contains(&description.attribute_group) {
            return description;
        }
        match self.rules.load().get(&description.attribute_group) {
            Some(aspect) => description.with_aspect(*aspect),
            None => description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ATG_CONFIG_REQUEST;

    #[test]
    fn test_substitution_applies_configured_rule() {
        let table = RedirectionTable::empty();
        table.reload(HashMap::from([(100, 9)]));

        let redirected = table.substitute(DataDescription::new(100, 1, 0));
        assert_eq!(redirected.aspect, 9);
        assert_eq!(redirected.attribute_group, 100);

        let untouched = table.substitute(DataDescription::new(200, 1, 0));
        assert_eq!(untouched.aspect, 1);
    }

    #[test]
    fn test_bootstrap_groups_are_never_redirected() {
        let table = RedirectionTable::empty();
        table.reload(HashMap::from([(ATG_CONFIG_REQUEST, 9)]));

        let description = DataDescription::new(ATG_CONFIG_REQUEST, 1, 0);
        assert_eq!(table.substitute(description), description);
    }

    #[test]
    fn test_reload_replaces_previous_rules() {
        let table = RedirectionTable::empty();
        table.reload(HashMap::from([(100, 9)]));
        table.reload(HashMap::from([(300, 5)]));

        assert_eq!(table.substitute(DataDescription::new(100, 1, 0)).aspect, 1);
        assert_eq!(table.substitute(DataDescription::new(300, 1, 0)).aspect, 5);
    }
}
