//! Strict-FIFO playout queue for provider audio chunks.
//!
//! Providers deliver response audio in bursts that can outpace the host
//! sink. [`PlayoutQueue`] buffers chunks and plays them one at a time in
//! arrival order. On interruption (barge-in) the queue is cleared so the
//! assistant stops talking after the current chunk, without truncating it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::AudioError;
use crate::core::realtime::RealtimeAudioData;

/// Host playback seam.
///
/// `play` must resolve when the chunk has finished playing; the queue uses
/// that completion to chain the next chunk.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, chunk: RealtimeAudioData) -> Result<(), AudioError>;
}

struct PlayoutInner {
    queue: Mutex<VecDeque<RealtimeAudioData>>,
    draining: AtomicBool,
    sink: Arc<dyn AudioSink>,
}

/// FIFO queue that serializes audio chunks into an [`AudioSink`].
///
/// Exactly one chunk is audible at a time. `enqueue` during playback only
/// appends; `clear` drops queued chunks but never the one currently playing.
#[derive(Clone)]
pub struct PlayoutQueue {
    inner: Arc<PlayoutInner>,
}

impl PlayoutQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            inner: Arc::new(PlayoutInner {
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                sink,
            }),
        }
    }

    /// Append a chunk and start playback if the queue was idle.
    pub fn enqueue(&self, chunk: RealtimeAudioData) {
        self.inner.queue.lock().push_back(chunk);
        self.start_drain();
    }

    /// Drop all unplayed chunks. The chunk currently in the sink keeps
    /// playing to completion.
    pub fn clear(&self) {
        let dropped = {
            let mut queue = self.inner.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            debug!(dropped, "cleared playout queue");
        }
    }

    /// Number of chunks waiting to be played (excludes the one in the sink).
    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }

    /// True from the start of playback until the queue runs dry.
    pub fn is_playing(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    fn start_drain(&self) {
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let next = inner.queue.lock().pop_front();
                match next {
                    Some(chunk) => {
                        if let Err(e) = inner.sink.play(chunk).await {
                            // Skip the failed chunk and keep draining so one
                            // bad chunk cannot wedge playback.
                            warn!("audio sink failed, skipping chunk: {e}");
                        }
                    }
                    None => {
                        inner.draining.store(false, Ordering::SeqCst);
                        // An enqueue may have raced the flag reset. Take the
                        // drain role back if so, otherwise stop.
                        if inner.queue.lock().is_empty() {
                            break;
                        }
                        if inner.draining.swap(true, Ordering::SeqCst) {
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::sync::Mutex as AsyncMutex;

    fn chunk(id: u8) -> RealtimeAudioData {
        RealtimeAudioData {
            data: Bytes::from(vec![id]),
            sample_rate: 16000,
            item_id: None,
            response_id: None,
        }
    }

    /// Sink that records chunk ids and holds each chunk until the test
    /// releases it through the gate channel.
    struct GatedSink {
        started: Mutex<Vec<u8>>,
        finished: Mutex<Vec<u8>>,
        gate: AsyncMutex<mpsc::Receiver<()>>,
    }

    impl GatedSink {
        fn new(gate: mpsc::Receiver<()>) -> Self {
            Self {
                started: Mutex::new(Vec::new()),
                finished: Mutex::new(Vec::new()),
                gate: AsyncMutex::new(gate),
            }
        }
    }

    #[async_trait]
    impl AudioSink for GatedSink {
        async fn play(&self, chunk: RealtimeAudioData) -> Result<(), AudioError> {
            let id = chunk.data[0];
            self.started.lock().push(id);
            self.gate.lock().await.recv().await;
            self.finished.lock().push(id);
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_chunks_play_in_arrival_order() {
        let (tx, rx) = mpsc::channel(8);
        let sink = Arc::new(GatedSink::new(rx));
        let queue = PlayoutQueue::new(sink.clone());

        queue.enqueue(chunk(1));
        queue.enqueue(chunk(2));
        queue.enqueue(chunk(3));
        settle().await;

        // Only the first chunk is in the sink; the rest wait their turn.
        assert_eq!(*sink.started.lock(), vec![1]);
        assert!(queue.is_playing());
        assert_eq!(queue.len(), 2);

        for _ in 0..3 {
            tx.send(()).await.unwrap();
            settle().await;
        }

        assert_eq!(*sink.finished.lock(), vec![1, 2, 3]);
        assert!(!queue.is_playing());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_only_unplayed_chunks() {
        let (tx, rx) = mpsc::channel(8);
        let sink = Arc::new(GatedSink::new(rx));
        let queue = PlayoutQueue::new(sink.clone());

        queue.enqueue(chunk(1));
        queue.enqueue(chunk(2));
        queue.enqueue(chunk(3));
        settle().await;
        assert_eq!(*sink.started.lock(), vec![1]);

        // Interruption while chunk 1 is still in the sink.
        queue.clear();
        assert_eq!(queue.len(), 0);

        tx.send(()).await.unwrap();
        settle().await;

        // Chunk 1 finished normally; 2 and 3 never reached the sink.
        assert_eq!(*sink.finished.lock(), vec![1]);
        assert_eq!(*sink.started.lock(), vec![1]);
        assert!(!queue.is_playing());
    }

    #[tokio::test]
    async fn test_enqueue_after_drain_restarts_playback() {
        let (tx, rx) = mpsc::channel(8);
        let sink = Arc::new(GatedSink::new(rx));
        let queue = PlayoutQueue::new(sink.clone());

        queue.enqueue(chunk(1));
        tx.send(()).await.unwrap();
        settle().await;
        assert!(!queue.is_playing());

        queue.enqueue(chunk(2));
        settle().await;
        assert_eq!(*sink.started.lock(), vec![1, 2]);

        tx.send(()).await.unwrap();
        settle().await;
        assert_eq!(*sink.finished.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_clear_while_idle_is_noop() {
        let (_tx, rx) = mpsc::channel(8);
        let sink = Arc::new(GatedSink::new(rx));
        let queue = PlayoutQueue::new(sink);

        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.is_playing());
    }

    /// Sink that fails every chunk; draining must continue past failures.
    struct FailingSink {
        attempts: Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl AudioSink for FailingSink {
        async fn play(&self, chunk: RealtimeAudioData) -> Result<(), AudioError> {
            self.attempts.lock().push(chunk.data[0]);
            Err(AudioError::Sink("device gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_advances_to_next_chunk() {
        let sink = Arc::new(FailingSink {
            attempts: Mutex::new(Vec::new()),
        });
        let queue = PlayoutQueue::new(sink.clone());

        queue.enqueue(chunk(1));
        queue.enqueue(chunk(2));
        settle().await;

        assert_eq!(*sink.attempts.lock(), vec![1, 2]);
        assert!(!queue.is_playing());
    }
}
