//! Bounded frame buffer between the decode thread and the render loop.
//!
//! One mutex guards the slot array, both cursors and the occupied count.
//! Two condition variables carry the "not full" and "not empty" edges.
//! The decode thread blocks in [`FrameQueue::push`] when the buffer fills
//! up (backpressure is the only overload policy; frames are never dropped
//! or overwritten here). The render loop only ever calls the non-blocking
//! [`FrameQueue::try_pop`], so a starved decoder can never stall a tick.
//!
//! [`FrameQueue::close`] is the shutdown path: it wakes every waiter, makes
//! all further pushes fail, and leaves already-buffered frames drainable.
//! Without it, stopping the render loop would leave the decode thread
//! parked forever inside a full-queue wait.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::decoder::frame::FrameData;

/// Default number of in-flight frames between decode and render.
pub const DEFAULT_CAPACITY: usize = 10;

/// Returned by [`FrameQueue::push`] once the queue has been shut down.
/// Hands the rejected frame back to the caller.
#[derive(Debug)]
pub struct QueueClosed(pub FrameData);

struct QueueState {
    slots: Vec<Option<FrameData>>,
    write_index: usize,
    read_index: usize,
    count: usize,
    closed: bool,
}

pub struct FrameQueue {
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl FrameQueue {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        let mut slots = Vec::new();
        slots.resize_with(capacity, || None);
        Self {
            state: Mutex::new(QueueState {
                slots,
                write_index: 0,
                read_index: 0,
                count: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    // A panic on the other side must not wedge this thread.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a frame, blocking while the queue is full.
    ///
    /// Fails only once the queue is closed, returning the frame untouched
    /// so the caller can decide what to do with it.
    pub fn push(&self, frame: FrameData) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        while state.count == state.slots.len() && !state.closed {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.closed {
            return Err(QueueClosed(frame));
        }
        let capacity = state.slots.len();
        let index = state.write_index;
        state.slots[index] = Some(frame);
        state.write_index = (index + 1) % capacity;
        state.count += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest frame, or `None` if the queue is empty.
    /// Never blocks; an empty queue is an underrun, not an error.
    pub fn try_pop(&self) -> Option<FrameData> {
        let mut state = self.lock();
        if state.count == 0 {
            return None;
        }
        let capacity = state.slots.len();
        let index = state.read_index;
        let frame = state.slots[index].take();
        debug_assert!(frame.is_some(), "occupied slot at read cursor was empty");
        state.read_index = (index + 1) % capacity;
        state.count -= 1;
        self.not_full.notify_one();
        frame
    }

    /// Shuts the queue down: blocked pushers wake up and fail, further
    /// pushes fail immediately, buffered frames stay drainable through
    /// [`try_pop`](Self::try_pop). Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    // 2x2 canvas filled with the id, so ordering checks can tell frames apart
    // and torn writes would show up as mixed bytes.
    fn frame(id: u8) -> FrameData {
        FrameData::new(vec![id; 12], 2, 2)
    }

    fn id_of(frame: &FrameData) -> u8 {
        frame.buffer[0]
    }

    // ── Basic operations ─────────────────────────────────────────

    #[test]
    fn try_pop_on_empty_returns_none() {
        let queue = FrameQueue::new(4);
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn push_then_pop_round_trips() {
        let queue = FrameQueue::new(4);
        queue.push(frame(7)).unwrap();
        assert_eq!(queue.len(), 1);

        let popped = queue.try_pop().expect("one frame buffered");
        assert_eq!(id_of(&popped), 7);
        assert!(queue.try_pop().is_none(), "second pop finds nothing");
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = FrameQueue::new(8);
        for id in 0..8 {
            queue.push(frame(id)).unwrap();
        }
        for id in 0..8 {
            assert_eq!(id_of(&queue.try_pop().unwrap()), id);
        }
    }

    #[test]
    fn cursors_wrap_around_capacity() {
        let queue = FrameQueue::new(3);
        let mut next = 0u8;
        let mut expect = 0u8;
        // Interleave pushes and pops so both cursors lap the slot array.
        for _ in 0..5 {
            queue.push(frame(next)).unwrap();
            next += 1;
            queue.push(frame(next)).unwrap();
            next += 1;
            assert!(queue.len() <= queue.capacity());
            assert_eq!(id_of(&queue.try_pop().unwrap()), expect);
            expect += 1;
            assert_eq!(id_of(&queue.try_pop().unwrap()), expect);
            expect += 1;
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_one_alternates() {
        let queue = FrameQueue::new(1);
        for id in 0..4 {
            queue.push(frame(id)).unwrap();
            assert_eq!(queue.len(), 1);
            assert_eq!(id_of(&queue.try_pop().unwrap()), id);
        }
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = FrameQueue::new(0);
    }

    // ── Backpressure ─────────────────────────────────────────────

    #[test]
    fn full_queue_blocks_push_until_pop() {
        let queue = Arc::new(FrameQueue::new(2));
        queue.push(frame(1)).unwrap();
        queue.push(frame(2)).unwrap();

        let third_pushed = Arc::new(AtomicBool::new(false));
        let producer = {
            let queue = Arc::clone(&queue);
            let third_pushed = Arc::clone(&third_pushed);
            thread::spawn(move || {
                queue.push(frame(3)).unwrap();
                third_pushed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(
            !third_pushed.load(Ordering::SeqCst),
            "push into a full queue must block"
        );
        assert_eq!(queue.len(), 2, "blocked push must not overwrite anything");

        // Freeing one slot releases the blocked producer.
        assert_eq!(id_of(&queue.try_pop().unwrap()), 1);
        producer.join().unwrap();
        assert!(third_pushed.load(Ordering::SeqCst));

        assert_eq!(id_of(&queue.try_pop().unwrap()), 2);
        assert_eq!(id_of(&queue.try_pop().unwrap()), 3);
        assert!(queue.try_pop().is_none());
    }

    // ── Shutdown ─────────────────────────────────────────────────

    #[test]
    fn close_wakes_blocked_producer() {
        let queue = Arc::new(FrameQueue::new(1));
        queue.push(frame(1)).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(2)))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let rejected = producer
            .join()
            .unwrap()
            .expect_err("push must fail after close");
        assert_eq!(id_of(&rejected.0), 2, "rejected frame comes back intact");

        // The queue is still valid and drainable.
        assert_eq!(id_of(&queue.try_pop().unwrap()), 1);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn push_after_close_fails_immediately() {
        let queue = FrameQueue::new(4);
        queue.close();
        let rejected = queue.push(frame(9)).expect_err("closed queue rejects pushes");
        assert_eq!(id_of(&rejected.0), 9);
        assert!(queue.is_empty());
    }

    #[test]
    fn close_is_idempotent_and_keeps_buffered_frames() {
        let queue = FrameQueue::new(4);
        queue.push(frame(1)).unwrap();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(id_of(&queue.try_pop().unwrap()), 1);
        assert!(queue.try_pop().is_none());
    }

    // ── Cross-thread integrity ───────────────────────────────────

    #[test]
    fn frames_cross_threads_in_order_and_untorn() {
        const FRAMES: u8 = 100;
        let queue = Arc::new(FrameQueue::new(4));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for id in 0..FRAMES {
                    queue.push(frame(id)).unwrap();
                }
                queue.close();
            })
        };

        let mut expected = 0u8;
        loop {
            match queue.try_pop() {
                Some(popped) => {
                    assert_eq!(popped.buffer.len(), FrameData::expected_len(2, 2));
                    assert!(
                        popped.buffer.iter().all(|&byte| byte == expected),
                        "frame {expected} arrived torn"
                    );
                    assert!(queue.len() <= queue.capacity());
                    expected += 1;
                }
                None if queue.is_closed() => break,
                None => thread::yield_now(),
            }
        }
        assert_eq!(expected, FRAMES, "every pushed frame was consumed");
        producer.join().unwrap();
    }
}
