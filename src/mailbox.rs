//! Last-writer-wins frame hand-off between the acquisition side and the
//! pose pipeline.
//!
//! The publisher never blocks. The mailbox drains whatever has queued up and
//! keeps only the newest frame; everything older is counted and dropped.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::debug;
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{PoseError, PoseResult};
use crate::types::JointFrame;

/// Outcome of waiting for a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameWait {
    Frame(JointFrame),
    /// Nothing arrived within the timeout; the source is still open
    Timeout,
    /// The source is exhausted and will never produce another frame
    Closed,
}

/// Anything the calibrator can pull frames from.
pub trait FrameSource {
    fn next_frame(&mut self, timeout: Duration) -> PoseResult<FrameWait>;
}

pub fn frame_mailbox() -> (FramePublisher, FrameMailbox) {
    let (tx, rx) = channel::unbounded();
    (FramePublisher { tx }, FrameMailbox { rx, discarded: 0 })
}

#[derive(Clone)]
pub struct FramePublisher {
    tx: Sender<JointFrame>,
}

impl FramePublisher {
    pub fn publish(&self, frame: JointFrame) -> PoseResult<()> {
        self.tx.send(frame).map_err(|_| PoseError::FrameSourceClosed)
    }
}

pub struct FrameMailbox {
    rx: Receiver<JointFrame>,
    discarded: u64,
}

impl FrameMailbox {
    /// Newest queued frame, if any, without blocking.
    pub fn latest(&mut self) -> Option<JointFrame> {
        let mut newest = None;
        while let Ok(frame) = self.rx.try_recv() {
            if newest.replace(frame).is_some() {
                self.discarded += 1;
            }
        }
        newest
    }

    /// Newest frame, waiting up to `timeout` if none is queued.
    pub fn wait_latest(&mut self, timeout: Duration) -> FrameWait {
        if let Some(frame) = self.latest() {
            return FrameWait::Frame(frame);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                // Anything that raced in behind it supersedes it
                let frame = match self.latest() {
                    Some(newer) => {
                        self.discarded += 1;
                        newer
                    }
                    None => first,
                };
                FrameWait::Frame(frame)
            }
            Err(RecvTimeoutError::Timeout) => FrameWait::Timeout,
            Err(RecvTimeoutError::Disconnected) => FrameWait::Closed,
        }
    }

    /// Frames dropped because a newer one was already queued.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl FrameSource for FrameMailbox {
    fn next_frame(&mut self, timeout: Duration) -> PoseResult<FrameWait> {
        let before = self.discarded;
        let wait = self.wait_latest(timeout);
        if self.discarded > before {
            debug!("mailbox dropped {} stale frame(s)", self.discarded - before);
        }
        Ok(wait)
    }
}

/// Deterministic replay: frames are handed out in order, never dropped.
impl FrameSource for VecDeque<JointFrame> {
    fn next_frame(&mut self, _timeout: Duration) -> PoseResult<FrameWait> {
        Ok(match self.pop_front() {
            Some(frame) => FrameWait::Frame(frame),
            None => FrameWait::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;
    use std::thread;

    fn frame(t: f64) -> JointFrame {
        JointFrame::new(t, vec![Vec3::zeros()])
    }

    #[test]
    fn test_latest_keeps_newest_and_counts_backlog() {
        let (publisher, mut mailbox) = frame_mailbox();
        for i in 0..5 {
            publisher.publish(frame(i as f64)).unwrap();
        }
        assert_eq!(mailbox.latest().map(|f| f.timestamp), Some(4.0));
        assert_eq!(mailbox.discarded(), 4);
        assert!(mailbox.latest().is_none());
    }

    #[test]
    fn test_wait_times_out_when_empty() {
        let (_publisher, mut mailbox) = frame_mailbox();
        assert_eq!(mailbox.wait_latest(Duration::from_millis(5)), FrameWait::Timeout);
    }

    #[test]
    fn test_closed_after_publisher_dropped() {
        let (publisher, mut mailbox) = frame_mailbox();
        publisher.publish(frame(1.0)).unwrap();
        drop(publisher);
        assert_eq!(mailbox.wait_latest(Duration::from_millis(5)), FrameWait::Frame(frame(1.0)));
        assert_eq!(mailbox.wait_latest(Duration::from_millis(5)), FrameWait::Closed);
    }

    #[test]
    fn test_publish_fails_once_mailbox_dropped() {
        let (publisher, mailbox) = frame_mailbox();
        drop(mailbox);
        assert_eq!(publisher.publish(frame(0.0)), Err(PoseError::FrameSourceClosed));
    }

    #[test]
    fn test_wait_receives_from_other_thread() {
        let (publisher, mut mailbox) = frame_mailbox();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            publisher.publish(frame(7.0)).unwrap();
        });
        let got = mailbox.wait_latest(Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(got, FrameWait::Frame(frame(7.0)));
    }

    #[test]
    fn test_vecdeque_source_replays_in_order() {
        let mut queue: VecDeque<JointFrame> = (0..3).map(|i| frame(i as f64)).collect();
        let mut seen = Vec::new();
        while let FrameWait::Frame(f) = queue.next_frame(Duration::ZERO).unwrap() {
            seen.push(f.timestamp);
        }
        assert_eq!(seen, vec![0.0, 1.0, 2.0]);
    }
}
