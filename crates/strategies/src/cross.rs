// In crates/strategies/src/cross.rs

/// Direction of a detected crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Crossing {
    Up,
    Down,
    None,
}

/// Which side of a reference line a series is on.
///
/// A crossing is reported only on a transition: strictly above after being
/// not-above, or strictly below after being above. Equality never changes
/// the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CrossState {
    is_above: bool,
}

impl CrossState {
    pub(crate) fn seed(value: f64, reference: f64) -> Self {
        Self {
            is_above: value > reference,
        }
    }

    pub(crate) fn is_above(&self) -> bool {
        self.is_above
    }

    pub(crate) fn decide(&mut self, value: f64, reference: f64) -> Crossing {
        if value > reference && !self.is_above {
            self.is_above = true;
            Crossing::Up
        } else if value < reference && self.is_above {
            self.is_above = false;
            Crossing::Down
        } else {
            Crossing::None
        }
    }
}
