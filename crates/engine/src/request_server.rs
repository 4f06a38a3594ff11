//! Request Server (spec.md §4.D).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;

use blocks::DataSource;
use protocol::{Request, Response, ResponseCode, BLOCK_SIZE};

use crate::collab::{MessageChannel, OutboundMessage, RequestHandler};
use crate::error::EngineError;
use crate::state::SharedState;

/// Tracks in-flight response-write workers spawned by a single upload so
/// `close()` can drain them (spec.md §5, Cancellation).
pub(crate) struct InFlight {
    tasks: AsyncMutex<JoinSet<()>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self {
            tasks: AsyncMutex::new(JoinSet::new()),
        }
    }

    async fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(future);
    }

    /// Waits for every outstanding worker to finish. Results are
    /// discarded: in-flight writes are allowed to finish, but nothing
    /// downstream acts on their outcome once a close is underway.
    pub(crate) async fn drain(&self) {
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}

/// Dispatches inbound `Request` messages scoped to one upload's
/// `(folder, path)` to its `DataSource`, replying on the shared channel.
pub(crate) struct RequestServerHandler {
    pub(crate) folder: String,
    pub(crate) path: String,
    pub(crate) source: Arc<dyn DataSource>,
    pub(crate) state: Arc<SharedState>,
    pub(crate) channel: Arc<dyn MessageChannel>,
    pub(crate) in_flight: Arc<InFlight>,
}

#[async_trait]
impl RequestHandler for RequestServerHandler {
    async fn handle(&self, request: Request) {
        if !request.matches(&self.folder, &self.path) {
            return;
        }

        if request.offset < 0 || request.size < 0 {
            tracing::warn!(
                id = request.id,
                offset = request.offset,
                size = request.size,
                "rejecting out-of-range request"
            );
            self.state.set_error(EngineError::Precondition(format!(
                "request {} out of range: offset={} size={}",
                request.id, request.offset, request.size
            )));
            return;
        }

        if request.size as u32 > BLOCK_SIZE {
            tracing::warn!(
                id = request.id,
                size = request.size,
                limit = BLOCK_SIZE,
                "rejecting oversized request"
            );
            self.state.set_error(EngineError::DataSource(blocks::BlocksError::BlockSizeOutOfRange {
                requested: request.size as u32,
                limit: BLOCK_SIZE,
            }));
            return;
        }

        let hex_hash = checksums::hex_lower(&request.hash);
        tracing::debug!(
            id = request.id,
            offset = request.offset,
            size = request.size,
            hash = %hex_hash,
            "serving block request"
        );

        match self.source.hashes() {
            Ok(known) if !known.contains(&hex_hash) => {
                tracing::warn!(id = request.id, hash = %hex_hash, "requested hash is not part of this upload's block set");
                self.state.set_error(EngineError::MissingData);
                return;
            }
            Ok(_) => {}
            Err(source_error) => {
                self.state.set_error(EngineError::DataSource(source_error));
                return;
            }
        }

        let source = Arc::clone(&self.source);
        let offset = request.offset as u64;
        let size = request.size as u32;
        let expected_hash = hex_hash.clone();
        let read = tokio::task::spawn_blocking(move || source.block(offset, size, &expected_hash));

        let channel = Arc::clone(&self.channel);
        let state = Arc::clone(&self.state);
        let id = request.id;
        self.in_flight
            .spawn(async move {
                let bytes = match read.await {
                    Ok(Ok(bytes)) => bytes,
                    Ok(Err(source_error)) => {
                        state.set_error(EngineError::DataSource(source_error));
                        return;
                    }
                    Err(join_error) => {
                        state.set_error(EngineError::TaskFailed(join_error.to_string()));
                        return;
                    }
                };

                let response = Response {
                    id,
                    code: ResponseCode::NoError,
                    data: bytes,
                };
                let completion = channel.send(OutboundMessage::Response(response));
                match completion.await {
                    Ok(()) => {
                        tracing::debug!(id, hash = %hex_hash, "response written");
                        state.mark_sent(hex_hash);
                    }
                    Err(wire_error) => {
                        tracing::warn!(id, error = %wire_error, "response write failed");
                        state.set_error(EngineError::Wire(wire_error.to_string()));
                    }
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocks::InMemorySource;
    use test_support::InMemoryChannel;

    #[tokio::test]
    async fn scoped_match_serves_exactly_the_requested_bytes() {
        let data = vec![0x41u8; 1024];
        let source: Arc<dyn DataSource> = Arc::new(InMemorySource::new(data.clone()));
        let blocks = source.blocks().unwrap();
        let channel = Arc::new(InMemoryChannel::new());
        let state = Arc::new(SharedState::new());
        let handler = RequestServerHandler {
            folder: "f".to_string(),
            path: "file.bin".to_string(),
            source,
            state: Arc::clone(&state),
            channel: channel.clone(),
            in_flight: Arc::new(InFlight::new()),
        };

        let block = &blocks[0];
        let request = Request {
            id: 7,
            folder: "f".to_string(),
            name: "file.bin".to_string(),
            offset: block.offset as i64,
            size: block.size as i32,
            hash: block.hash.to_vec(),
        };
        handler.handle(request).await;

        let responses = channel.sent_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data, data);
        assert_eq!(state.sent_count(), 1);
    }

    #[tokio::test]
    async fn non_matching_request_is_ignored() {
        let source: Arc<dyn DataSource> = Arc::new(InMemorySource::new(vec![1u8; 10]));
        let channel = Arc::new(InMemoryChannel::new());
        let state = Arc::new(SharedState::new());
        let handler = RequestServerHandler {
            folder: "f".to_string(),
            path: "file.bin".to_string(),
            source,
            state: Arc::clone(&state),
            channel: channel.clone(),
            in_flight: Arc::new(InFlight::new()),
        };

        let request = Request {
            id: 1,
            folder: "other".to_string(),
            name: "file.bin".to_string(),
            offset: 0,
            size: 10,
            hash: vec![0u8; 32],
        };
        handler.handle(request).await;

        assert!(channel.sent_responses().is_empty());
        assert_eq!(state.sent_count(), 0);
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_as_block_size_out_of_range() {
        let source: Arc<dyn DataSource> = Arc::new(InMemorySource::new(vec![1u8; 10]));
        let channel = Arc::new(InMemoryChannel::new());
        let state = Arc::new(SharedState::new());
        let handler = RequestServerHandler {
            folder: "f".to_string(),
            path: "file.bin".to_string(),
            source,
            state: Arc::clone(&state),
            channel,
            in_flight: Arc::new(InFlight::new()),
        };

        let request = Request {
            id: 1,
            folder: "f".to_string(),
            name: "file.bin".to_string(),
            offset: 0,
            size: (BLOCK_SIZE + 1) as i32,
            hash: vec![0u8; 32],
        };
        handler.handle(request).await;
        assert!(!state.is_completed());
        assert!(state.has_error());
    }

    #[tokio::test]
    async fn unknown_hash_is_rejected_as_missing_data() {
        let data = vec![0x41u8; 10];
        let source: Arc<dyn DataSource> = Arc::new(InMemorySource::new(data));
        let channel = Arc::new(InMemoryChannel::new());
        let state = Arc::new(SharedState::new());
        let handler = RequestServerHandler {
            folder: "f".to_string(),
            path: "file.bin".to_string(),
            source,
            state: Arc::clone(&state),
            channel: channel.clone(),
            in_flight: Arc::new(InFlight::new()),
        };

        // In-range, but the hash doesn't correspond to any block this
        // source actually produced.
        let request = Request {
            id: 1,
            folder: "f".to_string(),
            name: "file.bin".to_string(),
            offset: 0,
            size: 10,
            hash: vec![0u8; 32],
        };
        handler.handle(request).await;

        assert!(channel.sent_responses().is_empty());
        assert!(state.has_error());
    }
}
