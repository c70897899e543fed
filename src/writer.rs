//! Lets search threads persist important results to disk asynchronously
//!
//! Lines are appended to an in-memory buffer under a mutex; a dedicated file
//! thread swaps the active buffer for an empty one and writes the inactive
//! buffer out, so search threads never block on disk. The file thread wakes
//! when the buffer reaches a line threshold or enough time has passed since
//! the last write, and flushes once more on shutdown.

use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_LINES_IN_BUFFER: usize = 1000;
const MAX_TIME_BETWEEN_WRITES: Duration = Duration::from_secs(1);

struct WriterState {
    is_running: bool,
    lines_in_active_buffer: usize,
    last_write: Instant,
    active_buffer: String,
}

struct WriterShared {
    state: Mutex<WriterState>,
    cond: Condvar,
}

impl WriterShared {
    fn should_write_to_disk(state: &WriterState) -> bool {
        state.lines_in_active_buffer >= MAX_LINES_IN_BUFFER
            || state.last_write.elapsed() > MAX_TIME_BETWEEN_WRITES
    }
}

/// An append-only writer with its own file thread. Thread safe.
pub struct Writer {
    shared: Arc<WriterShared>,
    file_thread: Option<JoinHandle<()>>,
}

impl Writer {
    /// Opens `file_path` for appending and starts the file thread
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let shared = Arc::new(WriterShared {
            state: Mutex::new(WriterState {
                is_running: true,
                lines_in_active_buffer: 0,
                last_write: Instant::now(),
                active_buffer: String::new(),
            }),
            cond: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let path: PathBuf = file_path.as_ref().to_owned();
        let file_thread = thread::spawn(move || save_to_file(thread_shared, path));

        Self {
            shared,
            file_thread: Some(file_thread),
        }
    }

    /// Queues one line for writing
    pub fn add_line(&self, line: &str) {
        let mut state = self.shared.state.lock().unwrap();

        state.lines_in_active_buffer += 1;
        state.active_buffer.push_str(line);
        state.active_buffer.push('\n');

        // trigger a write to disk
        if WriterShared::should_write_to_disk(&state) {
            self.shared.cond.notify_one();
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.is_running = false;
        }
        self.shared.cond.notify_one();

        if let Some(thread) = self.file_thread.take() {
            // a panicking file thread only loses buffered lines
            let _ = thread.join();
        }
    }
}

fn save_to_file(shared: Arc<WriterShared>, file_path: PathBuf) {
    let file = OpenOptions::new().create(true).append(true).open(&file_path);

    let mut file = match file {
        Ok(file) => file,
        Err(err) => {
            log::error!("Failed to open the file {}: {}", file_path.display(), err);
            return;
        }
    };

    let mut inactive_buffer = String::new();
    let mut state: MutexGuard<WriterState> = shared.state.lock().unwrap();

    loop {
        // avoid writing lines one by one, so wait until we have enough data
        while state.is_running && !WriterShared::should_write_to_disk(&state) {
            state = shared.cond.wait(state).unwrap();
        }

        let is_running = state.is_running;

        // swap buffers and unlock so search threads are not blocked on disk
        std::mem::swap(&mut state.active_buffer, &mut inactive_buffer);
        state.lines_in_active_buffer = 0;
        state.last_write = Instant::now();
        drop(state);

        if let Err(err) = file.write_all(inactive_buffer.as_bytes()) {
            log::error!("Failed to write to {}: {}", file_path.display(), err);
        }
        inactive_buffer.clear();

        if !is_running {
            return;
        }

        state = shared.state.lock().unwrap();
    }
}
