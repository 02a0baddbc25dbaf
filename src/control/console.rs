//! Console key handler: lets an operator switch sources by typing a digit
//! at stdin, or print a status snapshot with `m`, the interactive
//! complement to the HTTP control plane (spec.md §4.7).
//!
//! Reading stdin is an inherently blocking operation with no portable way
//! to interrupt it mid-read, so `stop` only asks the thread to exit on its
//! *next* line; it does not join. That's fine here since the thread holds
//! only a `Weak<Switcher>` and exits on its own once the switcher (and
//! therefore the process) is going away.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{info, warn};

use crate::arbiter::SwitchReason;
use crate::switcher::Switcher;

pub struct ConsoleController {
    shutdown: Arc<AtomicBool>,
}

impl ConsoleController {
    pub fn spawn(switcher: Arc<Switcher>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let weak: Weak<Switcher> = Arc::downgrade(&switcher);
        drop(switcher);

        let _ = std::thread::Builder::new()
            .name("mswitch-console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if thread_shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    let Ok(line) = line else { break };
                    let Some(switcher) = weak.upgrade() else { break };
                    handle_line(&switcher, line.trim());
                }
                info!("console controller exiting");
            });

        Self { shutdown }
    }

    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn handle_line(switcher: &Switcher, line: &str) {
    if line.is_empty() {
        return;
    }
    if line.eq_ignore_ascii_case("m") {
        let status = switcher.snapshot();
        info!("console: status {status:?}");
        return;
    }
    match line.parse::<i64>() {
        Ok(index) => match switcher.switch_to(index, SwitchReason::Manual) {
            Ok(()) => info!("console: switched to source {index}"),
            Err(err) => warn!("console: {err}"),
        },
        Err(_) => warn!("console: unrecognized command {line:?}, expected a source index or 'm'"),
    }
}
