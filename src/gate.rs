/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::Context;
use nix::{
    fcntl::{fcntl, FcntlArg, FdFlag, OFlag},
    unistd::pipe2,
};
use std::os::fd::{AsRawFd, OwnedFd};
use tracing::trace;

/// Start gate for a workload.
///
/// The workload's stdin is the read end of a pipe and its command starts with a blocking `read`.
/// Closing the write end delivers EOF, which lets the workload proceed to its CPU-bound phase.
///
/// The writer is close-on-exec so that no helper process can hold the gate open. The reader is
/// inheritable because the control plane resolves `/dev/fd/<n>` through the helper that starts
/// the container.
#[derive(Debug)]
pub struct Gate {
    reader: Option<OwnedFd>,
    writer: Option<OwnedFd>,
    stdin_path: String,
}
impl Gate {
    pub fn new() -> anyhow::Result<Self> {
        let (reader, writer) = pipe2(OFlag::O_CLOEXEC).context("Failed to create gate pipe")?;
        fcntl(reader.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::empty()))
            .context("Failed to make gate reader inheritable")?;

        let stdin_path = format!("/dev/fd/{}", reader.as_raw_fd());
        trace!("armed gate {}", stdin_path);

        Ok(Self {
            reader: Some(reader),
            writer: Some(writer),
            stdin_path,
        })
    }

    /// Path the workload should use as its standard input.
    pub fn stdin_path(&self) -> &str {
        &self.stdin_path
    }

    /// Opens the gate. Calling this more than once does nothing.
    pub fn release(&mut self) {
        if self.writer.take().is_some() {
            trace!("released gate {}", self.stdin_path);
        }
        self.reader.take();
    }

    /// Closes whichever endpoints are still open without going through a release.
    pub fn close(&mut self) {
        self.writer.take();
        self.reader.take();
    }

    pub fn is_released(&self) -> bool {
        self.writer.is_none()
    }
}
