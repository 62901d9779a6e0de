// src/dispatch/mod.rs

pub mod client;
pub mod codec;

pub use client::{AlarmApi, DispatchClient, DispatchError};
pub use codec::{AlarmStatus, CreateAlarmRequest};
