//! Taskdeck - Core library
//!
//! Trigger and task model for the native Task Scheduler, the codecs between
//! the model and native definitions, and the hosts that store them.

pub mod action_codec;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod duration;
pub mod error;
pub mod history;
pub mod legacy;
pub mod local_store;
pub mod models;
pub mod native;
pub mod native_xml;
pub mod repository;
pub mod scheduler;
pub mod schtasks;
pub mod storage;
pub mod task_codec;
pub mod trigger_codec;
pub mod xml;

pub use models::*;
