// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Language-agnostic security policies (LASP).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Policies implemented by this agent.
pub const DEFAULT_SUPPORTED_POLICIES: [&str; 7] = [
    "record_sql",
    "attributes_include",
    "allow_raw_exception_messages",
    "custom_events",
    "custom_parameters",
    "custom_instrumentation_editor",
    "message_parameters",
];

/// One policy as returned by preconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
}

/// Echo of an accepted policy in the connect payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyEcho {
    pub enabled: bool,
}

/// Policies in force for a session, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityPolicies(BTreeMap<String, PolicyState>);

impl SecurityPolicies {
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.0.get(name).map(|state| state.enabled)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PolicyState)> {
        self.0.iter().map(|(name, state)| (name.as_str(), state))
    }
}

impl FromIterator<(String, PolicyState)> for SecurityPolicies {
    fn from_iter<I: IntoIterator<Item = (String, PolicyState)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Set of policy names the agent knows how to enforce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedPolicies(BTreeSet<String>);

impl SupportedPolicies {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Names of policies marked required that are not supported, sorted.
    #[must_use]
    pub fn unsupported_required(&self, policies: &SecurityPolicies) -> Vec<String> {
        policies
            .iter()
            .filter(|(name, state)| state.required && !self.contains(name))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Policies echoed back on connect: every supported policy the
    /// collector sent, with its enabled flag.
    #[must_use]
    pub fn accepted(&self, policies: &SecurityPolicies) -> BTreeMap<String, PolicyEcho> {
        policies
            .iter()
            .filter(|(name, _)| self.contains(name))
            .map(|(name, state)| {
                (
                    name.to_string(),
                    PolicyEcho {
                        enabled: state.enabled,
                    },
                )
            })
            .collect()
    }
}

impl Default for SupportedPolicies {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_POLICIES)
    }
}
