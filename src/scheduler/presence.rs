//! Startup check for another running instance

pub trait Presence {
    /// Whether this process may start its loop
    fn may_run(&self) -> bool;
}

/// Used when no desktop integration can detect other instances
#[derive(Debug, Default)]
pub struct Unchecked;

impl Presence for Unchecked {
    fn may_run(&self) -> bool {
        true
    }
}
