//! One-way hand-off from background threads to the UI thread.
//!
//! The watcher thread owns a [`UiDispatcher`] and never touches UI state; the
//! UI thread drains the matching [`UiQueue`] from its own event loop.

use crossbeam_channel::{unbounded, Receiver, Sender};

pub fn channel<T>() -> (UiDispatcher<T>, UiQueue<T>) {
    let (tx, rx) = unbounded();
    (UiDispatcher { tx }, UiQueue { rx })
}

#[derive(Debug)]
pub struct UiDispatcher<T> {
    tx: Sender<T>,
}

impl<T> Clone for UiDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> UiDispatcher<T> {
    /// Returns `false` once the UI side has gone away.
    pub fn send(&self, message: T) -> bool {
        self.tx.send(message).is_ok()
    }
}

#[derive(Debug)]
pub struct UiQueue<T> {
    rx: Receiver<T>,
}

impl<T> UiQueue<T> {
    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Blocks for the next message; `None` when every dispatcher is dropped.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn messages_from_worker_arrive_in_order() {
        let (dispatcher, queue) = channel();
        let worker = thread::spawn(move || {
            for i in 0..3 {
                assert!(dispatcher.send(i));
            }
        });
        worker.join().expect("worker");

        assert_eq!(queue.drain(), vec![0, 1, 2]);
        assert!(queue.drain().is_empty());
        assert_eq!(queue.recv(), None);
    }

    #[test]
    fn send_reports_closed_queue() {
        let (dispatcher, queue) = channel::<&str>();
        drop(queue);
        assert!(!dispatcher.send("late"));
    }
}
