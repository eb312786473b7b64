pub mod cancel;
pub mod clock;
pub mod context;
pub mod fallback;
pub mod feed;
pub mod generation;
pub mod parser;
pub mod prompt;
pub mod recommender;
pub mod urls;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use clock::{Clock, SystemClock};
pub use context::{ContextAggregator, ContextSource};
pub use feed::{FeedAssembler, FeedPage, UrlProbe};
pub use generation::{GeminiClient, ModelInvoker, TextGenerator};
pub use recommender::Recommender;
