//! Flush modes and stream states shared by the streaming codecs.

/// Flush modes for streaming compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    /// No flush - buffer data for optimal compression.
    #[default]
    None,

    /// Sync flush - emit all pending output, remain compressible.
    /// DEFLATE appends an empty stored block to byte-align the stream.
    Sync,

    /// Full flush - emit all pending output and forget history.
    /// Data after a full flush never references data before it.
    Full,

    /// Block flush - complete the current block only.
    Block,

    /// Finish - complete stream with trailer.
    Finish,
}

impl Flush {
    /// Whether this mode forces buffered input out as a block.
    pub fn emits_block(self) -> bool {
        !matches!(self, Flush::None)
    }
}

/// Stream state for tracking progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Stream not started.
    #[default]
    Initial,
    /// Stream in progress.
    Active,
    /// Stream finished successfully.
    Finished,
    /// Stream encountered error.
    Error,
}

impl StreamState {
    /// Check if stream is in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Finished | StreamState::Error)
    }

    /// Check if stream can accept more input.
    pub fn can_write(self) -> bool {
        matches!(self, StreamState::Initial | StreamState::Active)
    }

    /// Name used in `InvalidState` errors.
    pub fn name(self) -> &'static str {
        match self {
            StreamState::Initial => "initial",
            StreamState::Active => "active",
            StreamState::Finished => "finished",
            StreamState::Error => "error",
        }
    }
}
