//! Per-barrier command buffers

use crossbeam::queue::SegQueue;

/// Commands recorded by frame jobs and replayed sequentially at a barrier
///
/// Any number of workers may push concurrently; the owner drains the buffer
/// in FIFO order once every producer has finished.
#[derive(Debug)]
pub struct BarrierBuffer<T> {
    queue: SegQueue<T>,
}

impl<T> BarrierBuffer<T> {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Record a command (callable from any job)
    pub fn push(&self, command: T) {
        self.queue.push(command);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every recorded command, oldest first
    pub fn drain(&mut self) -> Vec<T> {
        let mut commands = Vec::with_capacity(self.queue.len());
        while let Some(command) = self.queue.pop() {
            commands.push(command);
        }
        commands
    }

    /// Discard everything recorded so far; returns how many were dropped
    pub fn discard(&mut self) -> usize {
        let mut dropped = 0;
        while self.queue.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

impl<T> Default for BarrierBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
