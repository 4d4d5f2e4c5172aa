use crate::{PeerwatchError, Result};
use async_trait::async_trait;
use copypasta::{ClipboardContext, ClipboardProvider};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn set_contents(&self, content: &str) -> Result<()>;
}

/// The desktop clipboard. The context is kept for the life of the value so
/// X11 keeps serving the selection after a copy.
pub struct SystemClipboard {
    context: Mutex<ClipboardContext>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let context = ClipboardContext::new().map_err(|e| {
            PeerwatchError::Clipboard(format!("Failed to create clipboard context: {}", e))
        })?;

        Ok(Self {
            context: Mutex::new(context),
        })
    }
}

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn set_contents(&self, content: &str) -> Result<()> {
        let mut ctx = self.context.lock().await;
        ctx.set_contents(content.to_owned()).map_err(|e| {
            PeerwatchError::Clipboard(format!("Failed to set clipboard contents: {}", e))
        })
    }
}

/// In-memory clipboard for tests and headless use.
#[derive(Default)]
pub struct MemoryClipboard {
    contents: StdMutex<Option<String>>,
    fail: bool,
}

impl MemoryClipboard {
    pub fn failing() -> Self {
        Self {
            contents: StdMutex::new(None),
            fail: true,
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn set_contents(&self, content: &str) -> Result<()> {
        if self.fail {
            return Err(PeerwatchError::Clipboard("clipboard unavailable".to_string()));
        }
        *self.contents.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.to_owned());
        Ok(())
    }
}
