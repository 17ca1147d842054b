use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::backend::common::dtos::TerminalDims;
use crate::backend::common::errors::CoreResult;

/// Opaque reference to a pseudo-terminal owned by a [`PtyService`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PtyHandle(pub String);

impl fmt::Display for PtyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtySpawnRequest {
    pub cwd: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dims: TerminalDims,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    Data(Vec<u8>),
    /// Always the last event for a handle.
    Exit(Option<i32>),
}

pub struct PtySpawned {
    pub handle: PtyHandle,
    pub events: mpsc::UnboundedReceiver<PtyEvent>,
}

/// Pseudo-terminal provider. Output and exit arrive on the channel returned
/// by `spawn`, in the order the child produced them.
#[async_trait]
pub trait PtyService: Send + Sync {
    async fn spawn(&self, request: PtySpawnRequest) -> CoreResult<PtySpawned>;

    async fn write(&self, handle: &PtyHandle, bytes: &[u8]) -> CoreResult<()>;

    async fn resize(&self, handle: &PtyHandle, dims: TerminalDims) -> CoreResult<()>;

    /// Terminates the child. The exit still arrives as a [`PtyEvent::Exit`].
    async fn close(&self, handle: &PtyHandle) -> CoreResult<()>;
}
