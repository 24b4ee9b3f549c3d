use super::ButtonSample;

/// Edges and latches observed for one button in one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonTransition {
    pub pressed_edge: bool,
    pub released: bool,
    /// The press being released had crossed the hold threshold.
    pub was_held: bool,
    /// The hold threshold was crossed this block.
    pub hold_crossed: bool,
    /// Hold time of the current press, or of the press just released.
    pub held_ms: u32,
}

/// Remembers the previous state of one button between blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonTracker {
    was_pressed: bool,
    hold_latched: bool,
    last_held_ms: u32,
}

impl ButtonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold threshold is strict: `held_ms > threshold_ms`.
    pub fn update(&mut self, sample: ButtonSample, threshold_ms: u32) -> ButtonTransition {
        let mut transition = ButtonTransition::default();

        if sample.pressed {
            transition.pressed_edge = !self.was_pressed;
            if transition.pressed_edge {
                self.hold_latched = false;
            }
            self.last_held_ms = sample.held_ms;
            if sample.held_ms > threshold_ms && !self.hold_latched {
                self.hold_latched = true;
                transition.hold_crossed = true;
            }
            transition.held_ms = sample.held_ms;
        } else if self.was_pressed {
            transition.released = true;
            transition.was_held = self.hold_latched;
            transition.held_ms = self.last_held_ms;
            self.hold_latched = false;
        }

        self.was_pressed = sample.pressed;
        transition
    }

    pub fn is_pressed(&self) -> bool {
        self.was_pressed
    }

    /// Pressed and past the hold threshold.
    pub fn is_held(&self) -> bool {
        self.was_pressed && self.hold_latched
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A click is pending. `flushed` is a previous single click on another
    /// layer that resolved now.
    Pending { flushed: Option<usize> },
    /// Second release inside the window on the same layer.
    Double(usize),
}

/// Single/double click disambiguation for the record button.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickCounter {
    click_count: u8,
    last_release_ms: u64,
    target: usize,
}

impl ClickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.click_count == 1
    }

    /// Resolves a pending single click once the window has passed.
    pub fn expire(&mut self, now_ms: u64, window_ms: u32) -> Option<usize> {
        if self.click_count == 1 && now_ms.saturating_sub(self.last_release_ms) >= window_ms as u64 {
            self.click_count = 0;
            return Some(self.target);
        }
        None
    }

    pub fn release(&mut self, now_ms: u64, window_ms: u32, target: usize) -> ClickOutcome {
        let gap = now_ms.saturating_sub(self.last_release_ms);
        if self.click_count == 1 && gap < window_ms as u64 && self.target == target {
            self.click_count = 0;
            return ClickOutcome::Double(target);
        }

        let flushed = (self.click_count == 1).then_some(self.target);
        self.click_count = 1;
        self.last_release_ms = now_ms;
        self.target = target;
        ClickOutcome::Pending { flushed }
    }

    pub fn reset(&mut self) {
        self.click_count = 0;
    }
}
