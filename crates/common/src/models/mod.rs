pub mod directive;
pub mod instrument;
pub mod order;
pub mod post;
pub mod signal;

pub use directive::{TradeDirection, TradeDirective};
pub use instrument::Instrument;
pub use order::{OrderReceipt, OrderSide};
pub use post::StreamPost;
pub use signal::{ExtractedSignal, SignalCandidate};
