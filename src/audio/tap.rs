use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Double-buffered handoff of the live buffer from the audio thread to the
/// analysis thread.
///
/// The writer copies a completed block into the back slot and publishes it
/// with an atomic index swap; the reader copies out of the front slot. The
/// two sides never contend on the same slot except in the one-tick window
/// right after a swap, where the writer skips the publish instead of
/// waiting. The reader therefore observes data at worst one block stale and
/// never torn.
struct TapShared {
    slots: [Mutex<Vec<f32>>; 2],
    front: AtomicUsize,
}

#[derive(Clone)]
pub struct TapWriter {
    shared: Arc<TapShared>,
}

pub struct TapReader {
    shared: Arc<TapShared>,
    scratch: Vec<f32>,
}

/// Create a connected writer/reader pair for blocks of `block_size` samples.
pub fn buffer_tap(block_size: usize) -> (TapWriter, TapReader) {
    let shared = Arc::new(TapShared {
        slots: [
            Mutex::new(vec![0.0; block_size]),
            Mutex::new(vec![0.0; block_size]),
        ],
        front: AtomicUsize::new(0),
    });
    let writer = TapWriter {
        shared: Arc::clone(&shared),
    };
    let reader = TapReader {
        shared,
        scratch: vec![0.0; block_size],
    };
    (writer, reader)
}

impl TapWriter {
    /// Publish one block. Never blocks: if the back slot is still being read
    /// (only possible for one reader tick after a swap), the publish is
    /// skipped and `false` is returned.
    pub fn publish(&self, block: &[f32]) -> bool {
        let back = 1 - self.shared.front.load(Ordering::Acquire);
        match self.shared.slots[back].try_lock() {
            Ok(mut slot) => {
                let n = block.len().min(slot.len());
                slot[..n].copy_from_slice(&block[..n]);
                drop(slot);
                self.shared.front.store(back, Ordering::Release);
                true
            }
            Err(_) => false,
        }
    }
}

impl TapReader {
    /// Copy of the most recently published block.
    pub fn read(&mut self) -> &[f32] {
        let front = self.shared.front.load(Ordering::Acquire);
        let slot = self.shared.slots[front].lock().unwrap();
        self.scratch.copy_from_slice(&slot);
        drop(slot);
        &self.scratch
    }
}
