//! In-memory pipes: a fixed ring buffer shared by a read fd and a write fd,
//! with blocking backpressure in both directions via `Channel::PipeRead`/
//! `PipeWrite`.

use alloc::sync::Arc;

use crate::error::SysError;
use crate::file::{FILE_TABLE, File, FileType};
use crate::proc::{self, Channel, current_proc};
use crate::spinlock::SpinLock;
use crate::vm::VA;

const PIPESIZE: usize = 512;

#[derive(Debug)]
struct PipeInner {
    data: [u8; PIPESIZE],
    num_read: usize,
    num_write: usize,
    read_open: bool,
    write_open: bool,
}

#[derive(Debug)]
pub struct Pipe {
    inner: SpinLock<PipeInner>,
}

impl Pipe {
    /// Allocates a pipe and a read/write file pair bound to it.
    pub fn alloc() -> Result<(File, File), SysError> {
        let mut f0 = File::alloc().map_err(SysError::from)?;
        let mut f1 = match File::alloc() {
            Ok(f) => f,
            Err(e) => {
                f0.close();
                return Err(e.into());
            }
        };

        let Ok(pipe) = Arc::try_new(Pipe {
            inner: SpinLock::new(
                PipeInner {
                    data: [0; PIPESIZE],
                    num_read: 0,
                    num_write: 0,
                    read_open: true,
                    write_open: true,
                },
                "pipe",
            ),
        }) else {
            f0.close();
            f1.close();
            return Err(SysError::OutOfMemory);
        };

        {
            let mut f0_inner = FILE_TABLE.inner[f0.id].lock();
            f0_inner.r#type = FileType::Pipe {
                pipe: Arc::clone(&pipe),
            };
            f0_inner.readable = true;
            f0_inner.writeable = false;
        }
        {
            let mut f1_inner = FILE_TABLE.inner[f1.id].lock();
            f1_inner.r#type = FileType::Pipe { pipe };
            f1_inner.readable = false;
            f1_inner.writeable = true;
        }

        Ok((f0, f1))
    }

    /// The `Arc`'s address, stable and unique for the pipe's lifetime, used
    /// as the `Channel` key for sleep/wakeup.
    fn id(&self) -> usize {
        self as *const Pipe as usize
    }

    /// Closes the read or write end. The other end observes this the next
    /// time it would block.
    pub fn close(&self, writeable: bool) {
        let mut inner = self.inner.lock();

        if writeable {
            inner.write_open = false;
            proc::wakeup(Channel::PipeRead(self.id()));
        } else {
            inner.read_open = false;
            proc::wakeup(Channel::PipeWrite(self.id()));
        }
    }

    pub fn write(&self, addr: VA, n: usize) -> Result<usize, SysError> {
        let proc = current_proc();
        let mut inner = self.inner.lock();

        let mut i = 0;
        while i < n {
            if !inner.read_open || proc.is_killed() {
                return Err(SysError::IoError);
            }

            if inner.num_write == inner.num_read + PIPESIZE {
                proc::wakeup(Channel::PipeRead(self.id()));
                inner = proc::sleep(Channel::PipeWrite(self.id()), inner);
            } else {
                let mut ch = [0u8];
                if proc::copy_from_user(VA(addr.0 + i), &mut ch).is_err() {
                    break;
                }

                let index = inner.num_write % PIPESIZE;
                inner.data[index] = ch[0];
                inner.num_write += 1;
                i += 1;
            }
        }

        proc::wakeup(Channel::PipeRead(self.id()));

        Ok(i)
    }

    pub fn read(&self, addr: VA, n: usize) -> Result<usize, SysError> {
        let proc = current_proc();
        let mut inner = self.inner.lock();

        while inner.num_read == inner.num_write && inner.write_open {
            if proc.is_killed() {
                return Err(SysError::IoError);
            }

            inner = proc::sleep(Channel::PipeRead(self.id()), inner);
        }

        let mut i = 0;
        while i < n {
            if inner.num_read == inner.num_write {
                break;
            }

            let ch = inner.data[inner.num_read % PIPESIZE];
            if unsafe { proc::copy_to_user(&[ch], VA(addr.0 + i)) }.is_err() {
                return Err(SysError::IoError);
            }

            inner.num_read += 1;
            i += 1;
        }

        proc::wakeup(Channel::PipeWrite(self.id()));

        Ok(i)
    }
}
