use std::io::{Error, Result};
use std::ptr;

use super::{Stack, StackPointer, MIN_STACK_SIZE};

/// Size of a [`DefaultStack`] created through [`Default`].
const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

fn page_size() -> usize {
    let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    assert!(pagesize.is_power_of_two());
    pagesize
}

/// Stack allocated with `mmap`, with an inaccessible guard page below it.
pub struct DefaultStack {
    base: StackPointer,
    mmap_len: usize,
}

impl DefaultStack {
    /// Allocates a stack with at least `size` usable bytes.
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(MIN_STACK_SIZE);

        // One extra page for the guard, the whole mapping rounded to pages.
        let page_size = page_size();
        let mmap_len = size
            .checked_add(page_size + page_size - 1)
            .expect("integer overflow while calculating stack size")
            & !(page_size - 1);

        cfg_if::cfg_if! {
            if #[cfg(target_os = "openbsd")] {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                let map_flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        unsafe {
            let mmap = libc::mmap(ptr::null_mut(), mmap_len, libc::PROT_NONE, map_flags, -1, 0);
            if mmap == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Unmapped again by Drop if mprotect fails.
            let out = Self {
                base: StackPointer::new_unchecked(mmap as usize + mmap_len),
                mmap_len,
            };

            // Everything above the guard page becomes usable.
            let usable = mmap_len - page_size;
            if libc::mprotect(
                mmap.cast::<u8>().add(page_size).cast(),
                usable,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                return Err(Error::last_os_error());
            }

            log::debug!(target: "cothread", "allocated {} byte stack", usable);
            Ok(out)
        }
    }

    /// Returns the number of usable bytes, excluding the guard page.
    pub fn size(&self) -> usize {
        self.mmap_len - page_size()
    }
}

impl Default for DefaultStack {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SIZE).expect("failed to allocate stack")
    }
}

impl Drop for DefaultStack {
    fn drop(&mut self) {
        unsafe {
            let mmap = self.base.get() - self.mmap_len;
            let ret = libc::munmap(mmap as _, self.mmap_len);
            debug_assert_eq!(ret, 0);
        }
    }
}

unsafe impl Stack for DefaultStack {
    #[inline]
    fn base(&self) -> StackPointer {
        self.base
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        unsafe { StackPointer::new_unchecked(self.base.get() - self.mmap_len) }
    }
}
