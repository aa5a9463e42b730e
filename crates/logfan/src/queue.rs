//! Per-plugin log line buffer.
//!
//! A multi-producer single-consumer FIFO with a cheaply observable depth.
//! The queue is deliberately unbounded: backpressure is sampling-based
//! (the pressure monitor watches depth over time), never blocking. The
//! producer fans each line out to every plugin synchronously and must not
//! stall on a slow one.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Unbounded FIFO of raw log lines
pub struct OutputQueue {
    sender: Sender<String>,
    receiver: Receiver<String>,
    /// Number of lines currently buffered (approximate under contention)
    depth: AtomicUsize,
    /// Total lines ever enqueued
    total_enqueued: AtomicU64,
    /// Total lines ever dequeued
    total_dequeued: AtomicU64,
}

impl OutputQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            depth: AtomicUsize::new(0),
            total_enqueued: AtomicU64::new(0),
            total_dequeued: AtomicU64::new(0),
        }
    }

    /// Append a line. Never blocks.
    pub fn enqueue(&self, line: String) {
        // Both channel ends live as long as `self`, so the send cannot
        // observe a disconnect.
        if self.sender.send(line).is_ok() {
            self.depth.fetch_add(1, Ordering::Relaxed);
            self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pop the oldest line without blocking
    pub fn try_dequeue(&self) -> Option<String> {
        match self.receiver.try_recv() {
            Ok(line) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                self.total_dequeued.fetch_add(1, Ordering::Relaxed);
                Some(line)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Approximate number of buffered lines
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Drop everything currently buffered. Returns the number of lines
    /// discarded.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            self.depth.fetch_sub(dropped, Ordering::Relaxed);
        }
        dropped
    }

    /// Get statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.depth(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_dequeued: self.total_dequeued.load(Ordering::Relaxed),
        }
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub depth: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
}
