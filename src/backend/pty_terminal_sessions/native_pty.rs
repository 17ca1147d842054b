use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::pty_service::{PtyEvent, PtyHandle, PtyService, PtySpawnRequest, PtySpawned};
use super::terminal_scope::render_terminal_command;
use crate::backend::common::constants::PTY_READ_BUFFER_BYTES;
use crate::backend::common::dtos::TerminalDims;
use crate::backend::common::errors::{CoreError, CoreResult};

struct NativePtyEntry {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

type EntryMap = Arc<Mutex<HashMap<String, NativePtyEntry>>>;

/// [`PtyService`] backed by the host's pseudo-terminals. Each child gets a
/// blocking reader thread that forwards output into the event channel.
#[derive(Default)]
pub struct NativePtyService {
    entries: EntryMap,
}

impl NativePtyService {
    pub fn new() -> Self {
        NativePtyService::default()
    }
}

fn lock_entries(entries: &EntryMap) -> MutexGuard<'_, HashMap<String, NativePtyEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn pty_size(dims: TerminalDims) -> PtySize {
    PtySize {
        rows: dims.rows,
        cols: dims.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

#[async_trait]
impl PtyService for NativePtyService {
    async fn spawn(&self, request: PtySpawnRequest) -> CoreResult<PtySpawned> {
        let command_rendered = render_terminal_command(&request.program, &request.args);
        let pair = native_pty_system()
            .openpty(pty_size(request.dims))
            .map_err(|error| CoreError::external("Failed to create PTY", error))?;

        let mut command = CommandBuilder::new(&request.program);
        for arg in &request.args {
            command.arg(arg);
        }
        command.cwd(&request.cwd);
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let mut child = pair.slave.spawn_command(command).map_err(|error| {
            tracing::warn!(command = %command_rendered, %error, "pty.spawn.failed");
            CoreError::external(&format!("Failed to spawn {command_rendered}"), error)
        })?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|error| CoreError::external("Failed to attach PTY reader", error))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|error| CoreError::external("Failed to attach PTY writer", error))?;
        let killer = child.clone_killer();

        let handle_id = Uuid::new_v4().to_string();
        lock_entries(&self.entries).insert(
            handle_id.clone(),
            NativePtyEntry {
                master: pair.master,
                writer,
                killer,
            },
        );

        let (sender, events) = mpsc::unbounded_channel();
        let entries = self.entries.clone();
        let thread_handle_id = handle_id.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; PTY_READ_BUFFER_BYTES];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(count) => {
                        if sender.send(PtyEvent::Data(buffer[..count].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::debug!(handle = %thread_handle_id, %error, "pty.read.stopped");
                        break;
                    }
                }
            }

            let exit_code = match child.wait() {
                Ok(status) => i32::try_from(status.exit_code()).ok(),
                Err(error) => {
                    tracing::debug!(handle = %thread_handle_id, %error, "pty.wait.failed");
                    None
                }
            };
            lock_entries(&entries).remove(&thread_handle_id);
            let _ = sender.send(PtyEvent::Exit(exit_code));
        });

        tracing::debug!(handle = %handle_id, command = %command_rendered, "pty.spawn.created");
        Ok(PtySpawned {
            handle: PtyHandle(handle_id),
            events,
        })
    }

    async fn write(&self, handle: &PtyHandle, bytes: &[u8]) -> CoreResult<()> {
        let mut entries = lock_entries(&self.entries);
        let entry = entries
            .get_mut(&handle.0)
            .ok_or_else(|| CoreError::not_found("pty", handle.0.clone()))?;
        entry
            .writer
            .write_all(bytes)
            .and_then(|_| entry.writer.flush())
            .map_err(|error| CoreError::external("Failed to write to PTY", error))
    }

    async fn resize(&self, handle: &PtyHandle, dims: TerminalDims) -> CoreResult<()> {
        let entries = lock_entries(&self.entries);
        let entry = entries
            .get(&handle.0)
            .ok_or_else(|| CoreError::not_found("pty", handle.0.clone()))?;
        entry
            .master
            .resize(pty_size(dims))
            .map_err(|error| CoreError::external("Failed to resize PTY", error))
    }

    async fn close(&self, handle: &PtyHandle) -> CoreResult<()> {
        let mut entries = lock_entries(&self.entries);
        let Some(entry) = entries.get_mut(&handle.0) else {
            return Ok(());
        };
        entry
            .killer
            .kill()
            .map_err(|error| CoreError::external("Failed to terminate PTY child", error))
    }
}
