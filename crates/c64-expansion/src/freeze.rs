//! Freeze button timing.
//!
//! Pressing the button pulls NMI low at once. The cartridge logic sees
//! the press `FREEZE_DELAY` ticks later, at which point the drivers'
//! `freeze` hooks switch to Ultimax. The driver clears NMI itself when
//! the freezer software releases it.
//!
//! ```text
//! Idle --press--> Pending { due } --clock == due--> Frozen --release--> Idle
//! ```

/// Ticks between the button press and the freeze hooks firing.
pub const FREEZE_DELAY: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreezeState {
    #[default]
    Idle,
    /// NMI raised; hooks fire when the port clock reaches `due`.
    Pending { due: u64 },
    /// Hooks have run; NMI held until a driver releases it.
    Frozen,
}

impl FreezeState {
    /// State after a button press at `clock`.
    #[must_use]
    pub fn pressed(clock: u64) -> Self {
        Self::Pending {
            due: clock + FREEZE_DELAY,
        }
    }

    /// Move `Pending` to `Frozen` once `clock` reaches the due tick.
    /// Returns true on the tick the hooks must run.
    pub fn expire(&mut self, clock: u64) -> bool {
        match *self {
            Self::Pending { due } if clock >= due => {
                *self = Self::Frozen;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
            Self::Frozen => "frozen",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_on_due_tick() {
        let mut state = FreezeState::pressed(100);
        for clock in 101..100 + FREEZE_DELAY {
            assert!(!state.expire(clock), "fired early at {clock}");
        }
        assert!(state.expire(100 + FREEZE_DELAY));
        assert_eq!(state, FreezeState::Frozen);
        assert!(!state.expire(200));
    }

    #[test]
    fn idle_never_expires() {
        let mut state = FreezeState::Idle;
        assert!(!state.expire(u64::MAX));
        assert_eq!(state, FreezeState::Idle);
    }
}
