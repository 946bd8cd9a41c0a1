//! Core types for the call assistant
//!
//! This crate provides the data model shared by every other crate:
//! - Dialogue stages, turns and the ephemeral per-call session
//! - The durable call record and its lifecycle
//! - Leads, quality tiers and the summary/notification sub-documents
//! - Business profiles as delivered by the profile store
//! - Error types

pub mod business;
pub mod call;
pub mod conversation;
pub mod error;
pub mod lead;
pub mod phone;

pub use business::{BusinessProfile, FaqEntry, NotificationPreferences};
pub use call::{
    format_transcript, CallDirection, CallRecord, CallStatus, Finalization, RecordingRef,
};
pub use conversation::{BusinessContext, CallSession, CollectedInfo, Stage, Turn, TurnRole};
pub use error::{Error, Result};
pub use lead::{
    AiSummary, ExtractedLeadInfo, Lead, NotificationRecord, NotificationStatus, QualityTier,
    SummaryStatus,
};
pub use phone::{digits_only, is_phone_like, phone_key};
