//! Delayed "please wait" notice for long blocking waits.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Prints `message` once if it is still alive after `delay`.
///
/// Cancelled on [`DelayedNotice::finish`] or on drop, so an early `?` return
/// never leaves the timer thread behind.
pub struct DelayedNotice {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    shown: Arc<AtomicBool>,
}

impl DelayedNotice {
    pub fn start(message: String, delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let shown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shown);

        let handle = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(delay) {
                if !super::is_quiet() {
                    eprint!("{}", message);
                    let _ = io::stderr().flush();
                }
                flag.store(true, Ordering::SeqCst);
            }
        });

        Self {
            cancel: Some(tx),
            handle: Some(handle),
            shown,
        }
    }

    /// Stop the timer. Prints "Done" and returns true if the notice had been shown.
    pub fn finish(mut self) -> bool {
        let shown = self.stop();
        if shown && !super::is_quiet() {
            eprintln!("Done");
        }
        shown
    }

    fn stop(&mut self) -> bool {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.shown.load(Ordering::SeqCst)
    }
}

impl Drop for DelayedNotice {
    fn drop(&mut self) {
        self.stop();
    }
}
