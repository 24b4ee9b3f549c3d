use serde::{Deserialize, Serialize};

/// Input source that can be routed to the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputChannel {
    #[default]
    Guitar,
    Mic,
    Line,
}

impl InputChannel {
    pub const ALL: [InputChannel; 3] = [InputChannel::Guitar, InputChannel::Mic, InputChannel::Line];

    /// Advance order of the channel button: Guitar -> Mic -> Line -> Guitar.
    pub fn next(self) -> Self {
        match self {
            InputChannel::Guitar => InputChannel::Mic,
            InputChannel::Mic => InputChannel::Line,
            InputChannel::Line => InputChannel::Guitar,
        }
    }

    /// Picks this source's frame out of the codec input pair.
    ///
    /// The mic preamp feeds the left codec input and the guitar preamp the
    /// right one; line is a true stereo pair.
    #[inline]
    pub fn select(self, left: f32, right: f32) -> (f32, f32) {
        match self {
            InputChannel::Mic => (left, left),
            InputChannel::Guitar => (right, right),
            InputChannel::Line => (left, right),
        }
    }

    pub fn is_stereo(self) -> bool {
        matches!(self, InputChannel::Line)
    }

    pub fn label(self) -> &'static str {
        match self {
            InputChannel::Guitar => "Guitar",
            InputChannel::Mic => "Mic",
            InputChannel::Line => "Line",
        }
    }

    /// Logical level of the source relay for this channel.
    pub fn source_relay(self) -> bool {
        !matches!(self, InputChannel::Line)
    }
}

/// What the relay collaborators should do after a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingDecision {
    pub channel: InputChannel,
    /// Logical state: ON for Guitar and Mic, OFF for Line.
    pub source_relay: bool,
    pub bypass_relay: bool,
}

/// Tracks the user's channel choice and whether it overrides the channel a
/// layer was recorded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelRouter {
    selected_channel: InputChannel,
    override_active: bool,
}

impl ChannelRouter {
    pub fn new(initial: InputChannel) -> Self {
        Self {
            selected_channel: initial,
            override_active: false,
        }
    }

    pub fn selected_channel(&self) -> InputChannel {
        self.selected_channel
    }

    pub fn override_active(&self) -> bool {
        self.override_active
    }

    /// Channel button press.
    pub fn advance(&mut self) -> InputChannel {
        self.selected_channel = self.selected_channel.next();
        self.override_active = true;
        self.selected_channel
    }

    /// Two-position selector moved to a new source.
    pub fn select_manual(&mut self, channel: InputChannel) {
        if channel != self.selected_channel {
            self.selected_channel = channel;
            self.override_active = true;
        }
    }

    /// Two-position selector observed for the first time; no override.
    pub fn select_initial(&mut self, channel: InputChannel) {
        self.selected_channel = channel;
    }

    /// A layer-select click landed. `recorded` is the clicked layer's
    /// recorded channel, `changed` whether the selection moved.
    pub fn on_layer_selected(&mut self, changed: bool, recorded: Option<InputChannel>) {
        if !self.override_active
            && let Some(channel) = recorded
        {
            self.selected_channel = channel;
        }
        if changed {
            self.override_active = false;
        }
    }

    /// Channel to show and route given the selected layer's recorded channel.
    pub fn active_channel(&self, selected_layer_recorded: Option<InputChannel>) -> InputChannel {
        match selected_layer_recorded {
            Some(recorded) if !self.override_active => recorded,
            _ => self.selected_channel,
        }
    }

    pub fn routing(&self, channel: InputChannel, bypass_engaged: bool) -> RoutingDecision {
        RoutingDecision {
            channel,
            source_relay: channel.source_relay(),
            bypass_relay: bypass_engaged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_cycle() {
        let mut router = ChannelRouter::new(InputChannel::Guitar);
        assert_eq!(router.advance(), InputChannel::Mic);
        assert_eq!(router.advance(), InputChannel::Line);
        assert_eq!(router.advance(), InputChannel::Guitar);
        assert!(router.override_active());
    }

    #[test]
    fn test_recorded_channel_wins_without_override() {
        let router = ChannelRouter::new(InputChannel::Guitar);
        assert_eq!(router.active_channel(Some(InputChannel::Line)), InputChannel::Line);
        assert_eq!(router.active_channel(None), InputChannel::Guitar);
    }

    #[test]
    fn test_override_wins_until_layer_changes() {
        let mut router = ChannelRouter::new(InputChannel::Guitar);
        router.advance();
        assert_eq!(router.active_channel(Some(InputChannel::Line)), InputChannel::Mic);

        // Override pending: the clicked layer's channel is not adopted, but the
        // override clears because the selection moved.
        router.on_layer_selected(true, Some(InputChannel::Line));
        assert_eq!(router.selected_channel(), InputChannel::Mic);
        assert!(!router.override_active());

        // Next click adopts the recorded channel.
        router.on_layer_selected(true, Some(InputChannel::Line));
        assert_eq!(router.selected_channel(), InputChannel::Line);
    }

    #[test]
    fn test_reselecting_same_layer_keeps_override() {
        let mut router = ChannelRouter::new(InputChannel::Guitar);
        router.advance();
        router.on_layer_selected(false, Some(InputChannel::Line));
        assert!(router.override_active());
        assert_eq!(router.selected_channel(), InputChannel::Mic);
    }

    #[test]
    fn test_relay_truth_table() {
        let router = ChannelRouter::default();
        assert!(router.routing(InputChannel::Guitar, false).source_relay);
        assert!(router.routing(InputChannel::Mic, false).source_relay);
        assert!(!router.routing(InputChannel::Line, false).source_relay);
        assert!(router.routing(InputChannel::Line, true).bypass_relay);
    }

    #[test]
    fn test_source_selection() {
        assert_eq!(InputChannel::Mic.select(0.1, 0.9), (0.1, 0.1));
        assert_eq!(InputChannel::Guitar.select(0.1, 0.9), (0.9, 0.9));
        assert_eq!(InputChannel::Line.select(0.1, 0.9), (0.1, 0.9));
        assert!(InputChannel::Line.is_stereo());
    }
}
