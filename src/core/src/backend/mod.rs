mod http;

pub use http::HttpBackend;

use buddy_protocol::LogEntry;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::ChatError;

/// Raw bytes of one turn's event stream, in transport order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

/// Control surface of the pipeline backend.
///
/// Implementations must deliver stream bytes in order. `cancel_stream` must
/// succeed when no turn is active so local and remote cancellation can race.
pub trait Backend: Send + Sync + 'static {
    /// Submit user input and open the turn's event stream.
    fn open_stream<'a>(
        &'a self,
        thread_id: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<ByteStream, ChatError>>;

    /// Ask the backend to stop the thread's active turn.
    fn cancel_stream<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<(), ChatError>>;

    /// Full ordered log of the thread.
    fn fetch_entries<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LogEntry>, ChatError>>;
}
