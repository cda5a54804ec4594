//! Bouncer: member onboarding agent for a community chat server.

pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod names;
pub mod notifier;
pub mod onboarding;
pub mod platform;
