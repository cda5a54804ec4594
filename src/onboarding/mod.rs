//! Onboarding system: one isolated, multi-step session per joining member.
//!
//! A session provisions a temporary role and private workspace, walks the
//! member through the welcome, code-of-conduct and email verification
//! steps, then promotes them and tears the workspace down. The pure
//! transitions live in `machine`; `session` performs their effects and
//! waits on the event bus; `manager` starts sessions and routes events.

pub mod escalation;
pub mod machine;
pub mod manager;
pub mod prompts;
pub mod registry;
pub mod reset;
pub mod routes;
pub mod session;
pub mod state;

pub use escalation::EscalationHandler;
pub use machine::{Effect, Input, SessionState};
pub use manager::{OnboardingManager, SessionHandle};
pub use registry::{SessionRegistry, SessionSummary, WatchEntry};
pub use reset::{ResetReport, reset_server};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use session::{OnboardingDeps, OnboardingSession};
pub use state::OnboardingStep;
