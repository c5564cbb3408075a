//! `/dev/mem` mmap helper — the one explicitly out-of-scope collaborator named in spec.md §1
//! ("the physical-memory mmap helper that vends base pointers to the engine"). Every binding
//! in this crate opens its MMIO window through here; nothing else touches `/dev/mem` directly.
//! Grounded on `xvc_mem.c`'s `open_port` (`open("/dev/mem", O_RDWR | O_SYNC)` +
//! `mmap(..., MAP_SHARED | MAP_LOCKED, mem_fd, addr)`) and the `libc`-based mmap wrapper in
//! `ixy.rs`'s `ixgbe.rs`.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr::NonNull;

/// A live mapping of `len` bytes of physical address space starting at `phys_addr`.
///
/// Unmapped automatically on drop. The mapping is shared and synchronous (`O_SYNC`), matching
/// the original's insistence that writes are observed by hardware without page-cache delay.
pub struct PhysMem {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is exclusively owned by this `PhysMem`; nothing else in this process
// holds the same pointer, so sending it across threads is sound as long as access remains
// synchronized by the caller (the server is single-connection, so there is no concurrent use).
unsafe impl Send for PhysMem {}

impl PhysMem {
    /// Maps `len` bytes of physical memory starting at `phys_addr` for read/write access.
    ///
    /// # Errors
    /// Returns the underlying `io::Error` if `/dev/mem` can't be opened or `mmap` fails (most
    /// commonly `EACCES` when not running as root, or `EINVAL` for a misaligned request).
    pub fn open(phys_addr: u64, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")?;

        // SAFETY: `fd` is a valid, open file descriptor for `/dev/mem`; `len` is caller-chosen
        // and nonzero in practice (callers pass fixed hardware region sizes); the returned
        // pointer is checked against `MAP_FAILED` before use.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_LOCKED,
                file.as_raw_fd(),
                phys_addr as libc::off_t,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: `addr` was just checked to not be `MAP_FAILED`, and `mmap` never returns a
        // null pointer on success.
        let base = unsafe { NonNull::new_unchecked(addr.cast::<u8>()) };
        Ok(Self { base, len })
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for PhysMem {
    fn drop(&mut self) {
        // SAFETY: `self.base`/`self.len` describe exactly the region `mmap` handed back in
        // `open`, and no other code holds a reference to it past this point.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}
