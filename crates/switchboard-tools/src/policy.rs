// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// How a tool call should be handled before it runs.
///
/// The gateway currently executes every tool automatically (there is no
/// interactive operator in the loop), so only [`ApprovalPolicy::Auto`] is
/// exercised today. The enum stays three-valued because hooks can veto a
/// call (`preToolUse` returning non-zero aborts it), which is the moral
/// equivalent of `Deny` decided at runtime rather than declared statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    Auto,
    Ask,
    Deny,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_policy_equality() {
        assert_eq!(ApprovalPolicy::Auto, ApprovalPolicy::Auto);
        assert_ne!(ApprovalPolicy::Auto, ApprovalPolicy::Deny);
    }

    #[test]
    fn approval_policy_serde_roundtrip() {
        let s = serde_json::to_string(&ApprovalPolicy::Ask).unwrap();
        assert_eq!(s, "\"ask\"");
        let back: ApprovalPolicy = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ApprovalPolicy::Ask);
    }
}
