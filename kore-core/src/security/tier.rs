use super::{STANDARD_ALLOWED_COMMANDS, STRICT_ALLOWED_COMMANDS};

/// Security posture governing command allow-listing and environment
/// sanitization defaults. Configurable via `security.tier` in `kore-config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityTier {
    /// Tiny command allow-list, strict env allow-list.
    Strict,
    /// Broader allow-list for common dev tools, still denylisted.
    Standard,
    /// Only the shared denylist is enforced; no allow-list.
    Permissive,
}

impl SecurityTier {
    /// The command allow-list for this tier, or `None` when the tier has
    /// none (Permissive relies on the denylist alone).
    pub fn command_allowlist(self) -> Option<&'static [&'static str]> {
        match self {
            SecurityTier::Strict => Some(STRICT_ALLOWED_COMMANDS),
            SecurityTier::Standard => Some(STANDARD_ALLOWED_COMMANDS),
            SecurityTier::Permissive => None,
        }
    }
}

impl Default for SecurityTier {
    fn default() -> Self {
        SecurityTier::Standard
    }
}
