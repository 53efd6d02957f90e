use parley_realtime::AudioClip;

/// Outcome of one user turn, including any tool round-trips it took.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnResult {
    /// Audio deltas concatenated in arrival order.
    pub audio: AudioClip,
    pub transcript: String,
    pub response_item_id: Option<String>,
    pub tool_calls: usize,
}

impl TurnResult {
    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }
}
