//! PTY process handling: spawn, reader thread, writer, resize.
//!
//! Each shell pane owns one [`PtyProcess`]. A dedicated OS thread performs
//! the blocking reads from the PTY master and forwards byte chunks to the
//! hub over an unbounded channel; the hub feeds them into the pane's
//! emulator, so the reader thread never touches grid state. Reads arrive
//! at kernel-chosen boundaries — reassembling split escape sequences is
//! the emulator's job, not this module's.

// Rust guideline compliant 2026-03

use std::io::{Read, Write};
use std::thread;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc::UnboundedSender;

/// Events forwarded from PTY reader threads to the hub.
#[derive(Debug)]
pub enum PtyEvent {
    /// Raw output bytes read from the PTY master.
    Output {
        /// Pane the bytes belong to.
        pane: u16,
        /// The bytes, exactly as read.
        data: Vec<u8>,
    },
    /// The reader hit EOF; the child has exited or closed its side.
    Exited {
        /// Pane whose child exited.
        pane: u16,
    },
}

/// A spawned shell bound to a PTY pair.
///
/// Dropping the value kills and reaps the child.
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader_thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("reader_alive", &self.reader_thread.is_some())
            .finish_non_exhaustive()
    }
}

impl PtyProcess {
    /// Spawn `shell` on a fresh PTY of the given dimensions.
    ///
    /// Output chunks and the eventual EOF are delivered to `events`
    /// tagged with `pane`.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY cannot be opened or the shell cannot
    /// be spawned.
    pub fn spawn(
        shell: &str,
        cols: u16,
        rows: u16,
        pane: u16,
        events: UnboundedSender<PtyEvent>,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system.openpty(size).context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.env("TERM", "xterm-256color");
        if let Some(home) = dirs::home_dir() {
            cmd.cwd(home);
        }
        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn shell: {shell}"))?;
        // Close our copy of the slave so reads see EOF when the child exits.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .context("Failed to take PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        let reader_thread = spawn_reader_thread(reader, pane, events);

        Ok(Self {
            master: pair.master,
            writer,
            child,
            reader_thread: Some(reader_thread),
        })
    }

    /// Write input bytes to the child.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write or flush fails.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Resize the PTY (delivers SIGWINCH to the child).
    ///
    /// # Errors
    ///
    /// Returns an error if the resize ioctl fails.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    /// Reap the child after its reader reported EOF.
    ///
    /// Returns the exit code when one is available (`None` when the child
    /// was killed by a signal or the wait failed).
    pub fn wait_exit(&mut self) -> Option<i32> {
        match self.child.wait() {
            Ok(status) => Some(status.exit_code() as i32),
            Err(e) => {
                log::warn!("Failed to wait for PTY child: {e}");
                None
            }
        }
    }

    /// Kill the child process if running and reap it.
    pub fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            log::debug!("PTY child kill: {e}");
        }
        let _ = self.child.wait();
        if let Some(handle) = self.reader_thread.take() {
            // The reader unblocks once the master sees EOF.
            let _ = handle.join();
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Blocking read loop bridging the PTY master into the hub channel.
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    pane: u16,
    events: UnboundedSender<PtyEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("PTY reader thread started for pane {pane}");
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let data = buf[..n].to_vec();
                    if events.send(PtyEvent::Output { pane, data }).is_err() {
                        // Hub is gone; nothing left to deliver to.
                        break;
                    }
                }
                Err(e) => {
                    log::error!("PTY read error on pane {pane}: {e}");
                    break;
                }
            }
        }
        let _ = events.send(PtyEvent::Exited { pane });
        log::debug!("PTY reader thread exiting for pane {pane}");
    })
}
