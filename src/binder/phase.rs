use std::fmt;

/// Where a binder is in its mount-to-unmount lifecycle.
///
/// ```text
/// Uncreated -> Active -> TearingDown -> Destroyed
///                ^            |             |
///                +------------+-------------+   (remount)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Never mounted.
    #[default]
    Uncreated,
    Active,
    /// Unmounted, destruction deferred until the next scheduling tick.
    TearingDown,
    Destroyed,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncreated => "uncreated",
            Self::Active => "active",
            Self::TearingDown => "tearing_down",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
