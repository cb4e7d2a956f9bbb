// fsdlink - a flight simulation network client
// Copyright (C) 2017-2018  Datong Sun (dndx@idndx.com)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Process-wide state that used to be global, passed explicitly to
//! the client and the airspace monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Default)]
pub struct Context {
    shutdown: Arc<AtomicBool>,
    session_thread: Arc<OnceLock<ThreadId>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Records the calling thread as the session thread. Only the first call counts.
    pub fn mark_session_thread(&self) {
        let _ = self.session_thread.set(thread::current().id());
    }

    pub fn is_session_thread(&self) -> bool {
        self.session_thread.get() == Some(&thread::current().id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_shared_between_clones() {
        let c = Context::new();
        let other = c.clone();

        assert!(!other.is_shutting_down());
        c.request_shutdown();
        assert!(other.is_shutting_down());
    }

    #[test]
    fn test_session_thread() {
        let c = Context::new();
        assert!(!c.is_session_thread());

        c.mark_session_thread();
        assert!(c.is_session_thread());

        let other = c.clone();
        let on_other = thread::spawn(move || other.is_session_thread()).join().unwrap();
        assert!(!on_other);
    }
}
