//! Loop device attachment for squashfs images.
//!
//! The image file (or the region of it starting at the image offset) is
//! bound to a free `/dev/loopN`, read-only and auto-clearing, so the kernel
//! detaches the device by itself once the last mount of it is gone and the
//! launcher's descriptor is closed.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use ::loopdev::LoopControl;
use nix::errno::Errno;
use snow_common::types::ImageLocation;

/// Attempts at grabbing a free device when another process races us to it.
const ATTACH_ATTEMPTS: usize = 3;

/// An attached loop device. Holding it keeps the device open.
pub struct LoopDevice {
    path: PathBuf,
    device: ::loopdev::LoopDevice,
}

impl LoopDevice {
    /// Wraps an open loop device known under `path`.
    #[must_use]
    pub const fn new(path: PathBuf, device: ::loopdev::LoopDevice) -> Self {
        Self { path, device }
    }

    /// Device node, for example `/dev/loop3`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for LoopDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopDevice").field("path", &self.path).finish_non_exhaustive()
    }
}

fn errno(err: &io::Error) -> Errno {
    crate::errno_of(err)
}

/// Binds `image` to a free loop device, read-only and auto-clearing.
///
/// # Errors
///
/// Returns the errno of the first failing open or ioctl.
pub fn attach(image: &ImageLocation) -> nix::Result<LoopDevice> {
    let control = LoopControl::open().map_err(|e| errno(&e))?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let device = control.next_free().map_err(|e| errno(&e))?;
        let mut options = device
            .with()
            .offset(image.offset)
            .read_only(true)
            .autoclear(true);
        if let Some(length) = image.length {
            options = options.size_limit(length);
        }

        match options.attach(&image.path) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) && attempt < ATTACH_ATTEMPTS => {
                tracing::debug!(attempt, "loop device taken, retrying");
                continue;
            }
            Err(e) => return Err(errno(&e)),
        }

        let path = device.path().ok_or(Errno::ENODEV)?;
        tracing::info!(
            device = %path.display(),
            image = %image,
            "loop device attached"
        );
        return Ok(LoopDevice::new(path, device));
    }
}

/// Unbinds the backing file from `device` and closes it.
///
/// While the device is still mounted the kernel defers the detach until
/// the last user goes away.
///
/// # Errors
///
/// Returns the errno of the failed `LOOP_CLR_FD`.
pub fn detach(device: LoopDevice) -> nix::Result<()> {
    device.device.detach().map_err(|e| errno(&e))?;
    tracing::debug!(device = %device.path.display(), "loop device detached");
    Ok(())
}
