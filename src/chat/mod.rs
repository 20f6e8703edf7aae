pub mod prompt;
pub mod protocol;
pub mod turn;

pub use protocol::{NDJSON_CONTENT_TYPE, NdjsonDecoder, StreamEvent};
pub use turn::{
    ChatRequest, ChatResponse, PreparedTurn, prepare_turn, run_blocking_turn,
    spawn_streaming_turn,
};
