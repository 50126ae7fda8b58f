pub mod post_event;

pub use post_event::{
    DisconnectInfo, PostEvent, RATE_LIMIT_CODE, StreamMessage, parse_stream_message,
};
