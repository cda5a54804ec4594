//! Onboarding step enum, tracking where a member is in the flow.

use serde::{Deserialize, Serialize};

/// The steps of one member's onboarding.
///
/// Progresses linearly: Created → RoleAssigned → WorkspaceProvisioned →
/// AwaitingWelcomeAck → AwaitingConductAck → AwaitingEmail →
/// AwaitingCodeEntry → Verified → AwaitingCleanupAck → Completed.
/// Any step that waits on the member may instead end in Abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Created,
    RoleAssigned,
    WorkspaceProvisioned,
    AwaitingWelcomeAck,
    AwaitingConductAck,
    AwaitingEmail,
    AwaitingCodeEntry,
    Verified,
    AwaitingCleanupAck,
    Completed,
    Abandoned,
}

impl OnboardingStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStep) -> bool {
        use OnboardingStep::*;
        if target == Abandoned {
            return !self.is_terminal();
        }
        self.next() == Some(target)
    }

    /// Whether this step is terminal (the session is over).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Whether the session suspends on member input in this step.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::AwaitingWelcomeAck
                | Self::AwaitingConductAck
                | Self::AwaitingEmail
                | Self::AwaitingCodeEntry
                | Self::AwaitingCleanupAck
        )
    }

    /// Whether the temporary workspace and role exist in this step.
    pub fn holds_workspace(&self) -> bool {
        !matches!(
            self,
            Self::Created | Self::RoleAssigned | Self::Completed | Self::Abandoned
        )
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            Created => Some(RoleAssigned),
            RoleAssigned => Some(WorkspaceProvisioned),
            WorkspaceProvisioned => Some(AwaitingWelcomeAck),
            AwaitingWelcomeAck => Some(AwaitingConductAck),
            AwaitingConductAck => Some(AwaitingEmail),
            AwaitingEmail => Some(AwaitingCodeEntry),
            AwaitingCodeEntry => Some(Verified),
            Verified => Some(AwaitingCleanupAck),
            AwaitingCleanupAck => Some(Completed),
            Completed | Abandoned => None,
        }
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::Created
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::RoleAssigned => "role_assigned",
            Self::WorkspaceProvisioned => "workspace_provisioned",
            Self::AwaitingWelcomeAck => "awaiting_welcome_ack",
            Self::AwaitingConductAck => "awaiting_conduct_ack",
            Self::AwaitingEmail => "awaiting_email",
            Self::AwaitingCodeEntry => "awaiting_code_entry",
            Self::Verified => "verified",
            Self::AwaitingCleanupAck => "awaiting_cleanup_ack",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OnboardingStep; 11] = [
        OnboardingStep::Created,
        OnboardingStep::RoleAssigned,
        OnboardingStep::WorkspaceProvisioned,
        OnboardingStep::AwaitingWelcomeAck,
        OnboardingStep::AwaitingConductAck,
        OnboardingStep::AwaitingEmail,
        OnboardingStep::AwaitingCodeEntry,
        OnboardingStep::Verified,
        OnboardingStep::AwaitingCleanupAck,
        OnboardingStep::Completed,
        OnboardingStep::Abandoned,
    ];

    #[test]
    fn valid_transitions() {
        use OnboardingStep::*;
        let transitions = [
            (Created, RoleAssigned),
            (RoleAssigned, WorkspaceProvisioned),
            (WorkspaceProvisioned, AwaitingWelcomeAck),
            (AwaitingWelcomeAck, AwaitingConductAck),
            (AwaitingConductAck, AwaitingEmail),
            (AwaitingEmail, AwaitingCodeEntry),
            (AwaitingCodeEntry, Verified),
            (Verified, AwaitingCleanupAck),
            (AwaitingCleanupAck, Completed),
            (AwaitingEmail, Abandoned),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use OnboardingStep::*;
        // Skip steps
        assert!(!Created.can_transition_to(WorkspaceProvisioned));
        assert!(!AwaitingEmail.can_transition_to(Verified));
        // Go backward
        assert!(!AwaitingCodeEntry.can_transition_to(AwaitingEmail));
        // Terminal
        assert!(!Completed.can_transition_to(Created));
        assert!(!Completed.can_transition_to(Abandoned));
        assert!(!Abandoned.can_transition_to(Abandoned));
        // Self-transition
        assert!(!AwaitingEmail.can_transition_to(AwaitingEmail));
    }

    #[test]
    fn next_walks_forward_path() {
        let mut current = OnboardingStep::default();
        let mut seen = vec![current];
        while let Some(next) = current.next() {
            seen.push(next);
            current = next;
        }
        assert_eq!(current, OnboardingStep::Completed);
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn workspace_held_only_mid_flow() {
        use OnboardingStep::*;
        for step in ALL {
            let expected = !matches!(step, Created | RoleAssigned | Completed | Abandoned);
            assert_eq!(step.holds_workspace(), expected, "{step}");
        }
    }

    #[test]
    fn waiting_steps() {
        let waiting: Vec<_> = ALL.iter().filter(|s| s.is_waiting()).collect();
        assert_eq!(waiting.len(), 5);
        assert!(waiting.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn display_matches_serde() {
        for step in ALL {
            let display = format!("{step}");
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{display}\""), json, "Display and serde should match for {step:?}");
        }
    }
}
