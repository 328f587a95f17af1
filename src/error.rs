//! Error types shared by the codecs

use crate::native::NativeTriggerType;
use thiserror::Error;

/// A duration, calendar name, number or timestamp failed to parse.
///
/// Codec call sites always catch this and substitute a named default.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid duration: {0:?}")]
    Duration(String),

    #[error("unknown day of week: {0:?}")]
    Weekday(String),

    #[error("unknown month: {0:?}")]
    Month(String),

    #[error("unknown week of month: {0:?}")]
    WeekOfMonth(String),

    #[error("unknown trigger kind: {0:?}")]
    TriggerKind(String),

    #[error("invalid timestamp: {0:?}")]
    Timestamp(String),

    #[error("invalid number: {0:?}")]
    Number(String),
}

/// An optional native field cannot be set on this trigger type.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{feature} is not supported on {trigger} triggers")]
pub struct UnsupportedFeature {
    pub feature: &'static str,
    pub trigger: NativeTriggerType,
}
