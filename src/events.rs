/// Discrete input delivered by the display layer during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// Window close or a quit key.
    Quit,
    /// Any other key press; never advances.
    Key,
    /// Mouse button or finger down.
    PointerDown,
}

/// Request to move to the next media item. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceToken;

/// What the unifier decided for a single control-loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSignal {
    Idle,
    Advance,
    Shutdown,
}
