//! Key identity normalization and the held-key state machine.

pub mod identity;
pub mod pressed;

pub use identity::{normalize_label, KeyId, KeyIdentity};
pub use pressed::{KeyChange, PressedKeySet};
