use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Receives encoded descriptors, one call per descriptor.
pub trait Uploader: Send + Sync {
    /// Returns the uploader's name for logging.
    fn name(&self) -> &str;

    /// Take ownership of one encoded descriptor.
    fn upload_data(&self, data: Vec<u8>) -> Result<()>;
}

/// Forwards descriptors to a tokio task over a bounded channel.
///
/// `upload_data` blocks while the channel is full, so it must be called
/// from outside the async runtime (the decode loop runs on a blocking
/// thread).
pub struct ChannelUploader {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelUploader {
    pub fn new(queue_size: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (Self { tx }, rx)
    }
}

impl Uploader for ChannelUploader {
    fn name(&self) -> &str {
        "channel"
    }

    fn upload_data(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .blocking_send(data)
            .context("descriptor receiver closed")
    }
}

/// Keeps every descriptor in memory.
#[derive(Default)]
pub struct MemoryUploader {
    items: Mutex<Vec<Vec<u8>>>,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Remove and return everything uploaded so far.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.items.lock())
    }
}

impl Uploader for MemoryUploader {
    fn name(&self) -> &str {
        "memory"
    }

    fn upload_data(&self, data: Vec<u8>) -> Result<()> {
        self.items.lock().push(data);
        Ok(())
    }
}
