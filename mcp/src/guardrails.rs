//! Command safety filter.
//!
//! Every batch of CLI commands is checked here before it can reach a device.
//! [`validate`] is pure: no I/O, no state beyond the compiled rule table.
//!
//! ## Decision policy (per command, batch order, first violation wins)
//!
//! 1. Reject if the normalized command matches any rule in [`DENY_RULES`].
//! 2. Reject if it starts with the `no` keyword, does not mention `show`, and
//!    is not one of the [`NEGATION_EXCEPTIONS`].
//! 3. Otherwise accept.
//!
//! Normalization is trim + lowercase; patterns are also compiled
//! case-insensitive.
//!
//! Rule 2 also refuses some harmless `no ...` commands.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// One blocked class of commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenyRule {
    pub label: &'static str,
    pub pattern: &'static str,
}

const fn rule(label: &'static str, pattern: &'static str) -> DenyRule {
    DenyRule { label, pattern }
}

/// Destructive or disruptive commands, matched against normalized text.
pub const DENY_RULES: &[DenyRule] = &[
    // Shutdown/reload operations
    rule("device reload", r"\breload\b"),
    rule("device shutdown", r"\bshutdown\b"),
    rule("device reboot", r"\breboot\b"),
    rule("device halt", r"\bhalt\b"),
    // Interfaces
    rule("interface shutdown", r"interface\s+.*\s+shutdown"),
    rule("interface removal", r"no\s+interface"),
    // Configuration and file erasure
    rule("erase", r"\berase\b"),
    rule("flash file deletion", r"\bdelete\b.*\bflash:"),
    rule("nvram file deletion", r"\bdelete\b.*\bnvram:"),
    rule("write erase", r"\bwrite\s+erase\b"),
    rule("clear configuration", r"\bclear\s+config"),
    // Factory reset
    rule("factory reset", r"\bfactory-reset\b"),
    rule("factory reset", r"\breset\s+factory"),
    // Critical services
    rule("disable IP routing", r"no\s+ip\s+routing"),
    rule("disable service", r"no\s+service"),
    // Dynamic routing protocols
    rule("routing protocol removal", r"no\s+router\s+(bgp|ospf|eigrp|rip)"),
    // VLANs
    rule("VLAN removal", r"no\s+vlan\s+\d+"),
    // Access control
    rule("access-list removal", r"no\s+access-list"),
    rule("access-group removal", r"no\s+ip\s+access-group"),
    // Users and authentication
    rule("local user removal", r"no\s+username"),
    rule("AAA removal", r"no\s+aaa"),
    rule("enable secret removal", r"no\s+enable\s+secret"),
];

/// `no ...` prefixes that only touch debug or terminal-session settings.
pub const NEGATION_EXCEPTIONS: &[&str] = &["no debug", "no terminal"];

const NEGATION_KEYWORD: &str = "no";
const READ_ONLY_KEYWORD: &str = "show";

static COMPILED_RULES: LazyLock<Vec<(DenyRule, Regex)>> = LazyLock::new(|| {
    DENY_RULES
        .iter()
        .map(|rule| {
            let regex = RegexBuilder::new(rule.pattern)
                .case_insensitive(true)
                .build()
                .expect("deny rule patterns are valid regexes");
            (*rule, regex)
        })
        .collect()
});

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectCause {
    Pattern(DenyRule),
    Negation,
}

/// A batch refused by the filter. `command` is the offending command as
/// submitted (before normalization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRejected {
    pub command: String,
    pub cause: RejectCause,
}

impl std::fmt::Display for ValidationRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            RejectCause::Pattern(rule) => write!(
                f,
                "BLOCKED: Command '{}' matches dangerous pattern '{}' ({}). \
                 This operation could disrupt network services or device availability. \
                 Destructive operations are not allowed through this MCP server.",
                self.command, rule.pattern, rule.label
            ),
            RejectCause::Negation => write!(
                f,
                "BLOCKED: Command '{}' starts with '{}' and appears to be \
                 a configuration removal command. Such operations are not allowed.",
                self.command, NEGATION_KEYWORD
            ),
        }
    }
}

impl std::error::Error for ValidationRejected {}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(ValidationRejected),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }

    /// Human-readable denial message, `None` when allowed.
    pub fn reason(&self) -> Option<String> {
        match self {
            Verdict::Allowed => None,
            Verdict::Rejected(rejection) => Some(rejection.to_string()),
        }
    }
}

/// Check a command batch. Any single unsafe command rejects the whole batch.
pub fn validate<S: AsRef<str>>(commands: &[S]) -> Verdict {
    for command in commands {
        let original = command.as_ref();
        if let Some(cause) = check(&original.trim().to_lowercase()) {
            return Verdict::Rejected(ValidationRejected {
                command: original.to_string(),
                cause,
            });
        }
    }
    Verdict::Allowed
}

fn check(normalized: &str) -> Option<RejectCause> {
    if let Some((rule, _)) = COMPILED_RULES
        .iter()
        .find(|(_, regex)| regex.is_match(normalized))
    {
        return Some(RejectCause::Pattern(*rule));
    }

    // `no` followed by an argument; a bare `no` is not a removal.
    let negated = normalized
        .strip_prefix(NEGATION_KEYWORD)
        .is_some_and(|rest| rest.starts_with(char::is_whitespace));
    if negated
        && !normalized.contains(READ_ONLY_KEYWORD)
        && !NEGATION_EXCEPTIONS
            .iter()
            .any(|exception| normalized.contains(exception))
    {
        return Some(RejectCause::Negation);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(commands: &[&str]) -> ValidationRejected {
        match validate(commands) {
            Verdict::Rejected(r) => r,
            Verdict::Allowed => panic!("expected {commands:?} to be rejected"),
        }
    }

    #[test]
    fn all_rules_compile() {
        assert_eq!(COMPILED_RULES.len(), DENY_RULES.len());
    }

    #[test]
    fn reload_is_blocked() {
        let verdict = validate(&["reload"]);
        assert!(!verdict.is_safe());
        assert!(verdict.reason().unwrap().contains("reload"));
    }

    #[test]
    fn vlan_removal_uses_vlan_rule() {
        let r = rejected(&["no vlan 10"]);
        match r.cause {
            RejectCause::Pattern(rule) => assert_eq!(rule.label, "VLAN removal"),
            RejectCause::Negation => panic!("expected the VLAN rule"),
        }
    }

    #[test]
    fn username_removal_is_blocked() {
        let r = rejected(&["no username admin"]);
        assert_eq!(
            r.cause,
            RejectCause::Pattern(rule("local user removal", r"no\s+username"))
        );
    }

    #[test]
    fn no_debug_is_allowed() {
        assert_eq!(validate(&["no debug all"]), Verdict::Allowed);
        assert_eq!(validate(&["no terminal monitor"]), Verdict::Allowed);
    }

    #[test]
    fn generic_negation_is_blocked() {
        let r = rejected(&["no logging buffered"]);
        assert_eq!(r.cause, RejectCause::Negation);
        assert!(r.to_string().contains("no logging buffered"));
        assert!(r.to_string().contains("configuration removal"));
    }

    #[test]
    fn negation_with_show_passes() {
        assert!(validate(&["no-op show run | include no ip"]).is_safe());
        assert!(validate(&["no show"]).is_safe());
    }

    #[test]
    fn negation_keyword_must_be_a_whole_word() {
        assert!(validate(&["nothing to see"]).is_safe());
        assert!(validate(&["notify"]).is_safe());
    }

    #[test]
    fn bare_negation_keyword_passes() {
        assert!(validate(&["no"]).is_safe());
        assert!(validate(&["  NO  "]).is_safe());
        assert!(!validate(&["no\tlogging console"]).is_safe());
    }

    #[test]
    fn read_only_commands_pass() {
        let verdict = validate(&["show version", "show ip interface brief"]);
        assert_eq!(verdict, Verdict::Allowed);
        assert_eq!(verdict.reason(), None);
    }

    #[test]
    fn empty_batch_passes() {
        let empty: [&str; 0] = [];
        assert!(validate(&empty).is_safe());
    }

    #[test]
    fn first_offending_command_is_reported() {
        let r = rejected(&["show version", "erase nvram:", "reload"]);
        assert_eq!(r.command, "erase nvram:");
        assert!(r.to_string().contains("'erase nvram:'"));
    }

    #[test]
    fn case_and_whitespace_do_not_matter() {
        let mixed = rejected(&["  ReLoAd  "]);
        let plain = rejected(&["reload"]);
        assert_eq!(mixed.cause, plain.cause);
        assert_eq!(mixed.command, "  ReLoAd  ");
    }

    #[test]
    fn interface_shutdown_variants() {
        assert!(!validate(&["interface Gi0/1 shutdown"]).is_safe());
        assert!(!validate(&["no interface Loopback0"]).is_safe());
        // bare `shutdown` inside interface mode hits the device shutdown rule
        assert!(!validate(&["shutdown"]).is_safe());
    }

    #[test]
    fn storage_and_factory_reset() {
        for cmd in [
            "delete flash:config.text",
            "delete /force nvram:startup-config",
            "write erase",
            "clear configuration lock",
            "factory-reset all",
            "reset factory",
        ] {
            assert!(!validate(&[cmd]).is_safe(), "{cmd} should be blocked");
        }
    }

    #[test]
    fn routing_and_acl_removal() {
        for cmd in [
            "no ip routing",
            "no service dhcp",
            "no router ospf 1",
            "no router bgp 65000",
            "no access-list 101",
            "no ip access-group 101 in",
            "no aaa new-model",
            "no enable secret",
        ] {
            assert!(
                matches!(rejected(&[cmd]).cause, RejectCause::Pattern(_)),
                "{cmd} should match an explicit rule"
            );
        }
    }

    #[test]
    fn accepts_strings_and_owned_values() {
        let owned = vec!["show clock".to_string()];
        assert!(validate(&owned).is_safe());
    }
}
