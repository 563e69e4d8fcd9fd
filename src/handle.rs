//! The uniform resource handle and its per-kind retain/release table.

use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::error::{check, BridgeError, BridgeResult};
use crate::sys;

/// Uniform signature shared by every native retain/release entry point.
///
/// All OpenCL object handles are pointer-width opaque values, so the per-kind
/// functions (`clRetainContext`, `clReleaseMemObject`, …) already carry this
/// exact shape.
pub type NativeRefFn = unsafe extern "system" fn(*mut c_void) -> sys::cl_int;

unsafe extern "system" fn noop(_: *mut c_void) -> sys::cl_int {
    sys::CL_SUCCESS
}

/// One row of the kind table: a diagnostic name plus the native
/// retain/release pair (no-ops for kinds the driver does not count).
pub struct KindEntry {
    pub(crate) name: &'static str,
    pub(crate) retain: NativeRefFn,
    pub(crate) release: NativeRefFn,
    pub(crate) counted: bool,
}

// Index 0 is the invalid sentinel; the indices double as the kind codes a
// dynamically typed embedder passes across the boundary.
static REGISTRY: Lazy<[KindEntry; 12]> = Lazy::new(|| {
    [
        KindEntry {
            name: "ERROR",
            retain: noop,
            release: noop,
            counted: false,
        },
        KindEntry {
            name: "cl_platform_id",
            retain: noop,
            release: noop,
            counted: false,
        },
        KindEntry {
            name: "cl_device_id",
            retain: noop,
            release: noop,
            counted: false,
        },
        KindEntry {
            name: "cl_context",
            retain: sys::clRetainContext,
            release: sys::clReleaseContext,
            counted: true,
        },
        KindEntry {
            name: "cl_program",
            retain: sys::clRetainProgram,
            release: sys::clReleaseProgram,
            counted: true,
        },
        KindEntry {
            name: "cl_kernel",
            retain: sys::clRetainKernel,
            release: sys::clReleaseKernel,
            counted: true,
        },
        KindEntry {
            name: "cl_mem",
            retain: sys::clRetainMemObject,
            release: sys::clReleaseMemObject,
            counted: true,
        },
        KindEntry {
            name: "cl_sampler",
            retain: sys::clRetainSampler,
            release: sys::clReleaseSampler,
            counted: true,
        },
        KindEntry {
            name: "cl_command_queue",
            retain: sys::clRetainCommandQueue,
            release: sys::clReleaseCommandQueue,
            counted: true,
        },
        KindEntry {
            name: "cl_event",
            retain: sys::clRetainEvent,
            release: sys::clReleaseEvent,
            counted: true,
        },
        KindEntry {
            name: "cl_program_binary",
            retain: noop,
            release: noop,
            counted: false,
        },
        KindEntry {
            name: "cl_mapped_ptr",
            retain: noop,
            release: noop,
            counted: false,
        },
    ]
});

/// The closed set of native resource categories a [`Handle`] can carry.
///
/// The discriminants are the kind codes of the embedder boundary; `Invalid`
/// is the sentinel every malformed construction degrades to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(usize)]
pub enum HandleKind {
    /// Sentinel for malformed constructions; never touches the driver.
    Invalid = 0,
    /// `cl_platform_id`, not reference counted.
    PlatformId = 1,
    /// `cl_device_id`, not reference counted.
    DeviceId = 2,
    /// `cl_context`.
    Context = 3,
    /// `cl_program`.
    Program = 4,
    /// `cl_kernel`.
    Kernel = 5,
    /// `cl_mem`.
    Mem = 6,
    /// `cl_sampler`.
    Sampler = 7,
    /// `cl_command_queue`.
    CommandQueue = 8,
    /// `cl_event`.
    Event = 9,
    /// A program binary blob, not reference counted.
    ProgramBinary = 10,
    /// A pointer returned by a map operation, not reference counted.
    MappedPtr = 11,
}

impl HandleKind {
    /// Converts a kind code from the embedder boundary; unknown codes map to
    /// the sentinel.
    pub fn from_code(code: i32) -> HandleKind {
        match code {
            1 => HandleKind::PlatformId,
            2 => HandleKind::DeviceId,
            3 => HandleKind::Context,
            4 => HandleKind::Program,
            5 => HandleKind::Kernel,
            6 => HandleKind::Mem,
            7 => HandleKind::Sampler,
            8 => HandleKind::CommandQueue,
            9 => HandleKind::Event,
            10 => HandleKind::ProgramBinary,
            11 => HandleKind::MappedPtr,
            _ => HandleKind::Invalid,
        }
    }

    /// Whether the driver reference-counts resources of this kind.
    pub fn is_counted(self) -> bool {
        self.entry().counted
    }

    pub(crate) fn entry(self) -> &'static KindEntry {
        &REGISTRY[self as usize]
    }
}

/// A handle to one native OpenCL resource of one specific kind.
///
/// The handle never dereferences the stored pointer; it only owns one unit
/// of the driver's own reference count for counted kinds. That unit is
/// either the implicit reference a fresh `clCreate*` result carries
/// ([`Handle::wrap`]) or one taken explicitly before wrapping
/// ([`Handle::wrap_retained`]). Dropping the handle returns the unit unless
/// [`Handle::release`] already did.
pub struct Handle {
    raw: *mut c_void,
    kind: HandleKind,
    entry: &'static KindEntry,
    released: AtomicBool,
}

// The stored pointer is an opaque identity; the release gate is atomic, and
// OpenCL's retain/release entry points are thread safe.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Handle {
    /// Wraps a native pointer that already carries one driver-owned
    /// reference, the standard case for results of `clCreate*` calls. No
    /// retain is performed.
    ///
    /// A null pointer for a counted kind, or the sentinel kind itself,
    /// degrades to [`Handle::invalid`] so that no native function ever sees
    /// the bad pointer.
    pub fn wrap(raw: *mut c_void, kind: HandleKind) -> Handle {
        if kind == HandleKind::Invalid || (raw.is_null() && kind.is_counted()) {
            warn!(
                "refusing to wrap {:?} @{:?}, degrading to the error sentinel",
                kind, raw
            );
            return Handle::invalid();
        }
        Handle {
            raw,
            kind,
            entry: kind.entry(),
            released: AtomicBool::new(false),
        }
    }

    /// Retains the resource, then wraps it.
    ///
    /// This is the path for pointers copied out of an info query: the driver
    /// did not hand over a reference, so the handle takes its own before it
    /// assumes ownership of one.
    pub fn wrap_retained(raw: *mut c_void, kind: HandleKind) -> BridgeResult<Handle> {
        let handle = Handle::wrap(raw, kind);
        if handle.kind == HandleKind::Invalid {
            return Err(BridgeError::InvalidHandle(format!(
                "cannot retain {:?} @{:?}",
                kind, raw
            )));
        }
        handle.retain()?;
        Ok(handle)
    }

    /// Wraps a pointer without taking ownership of any reference.
    ///
    /// Used for resources surfaced inside driver callbacks, where the caller
    /// already owns the reference through another handle. `release` and drop
    /// are no-ops on the result.
    pub fn wrap_borrowed(raw: *mut c_void, kind: HandleKind) -> Handle {
        let handle = Handle::wrap(raw, kind);
        handle.released.store(true, Ordering::Release);
        handle
    }

    /// The sentinel handle: invalid kind, null pointer, every operation a
    /// safe no-op.
    pub fn invalid() -> Handle {
        Handle {
            raw: ptr::null_mut(),
            kind: HandleKind::Invalid,
            entry: HandleKind::Invalid.entry(),
            released: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_entry(
        raw: *mut c_void,
        kind: HandleKind,
        entry: &'static KindEntry,
    ) -> Handle {
        Handle {
            raw,
            kind,
            entry,
            released: AtomicBool::new(false),
        }
    }

    /// Increments the driver's reference count for counted kinds; always
    /// succeeds for the others. The driver's status is surfaced verbatim.
    pub fn retain(&self) -> BridgeResult<()> {
        check(unsafe { (self.entry.retain)(self.raw) })
    }

    /// Decrements the driver's reference count at most once per handle.
    ///
    /// The first call forwards to the native release; every later call
    /// reports success without touching the driver, so a caller-visible
    /// release followed by the drop cannot double-release the native count.
    pub fn release(&self) -> BridgeResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("releasing {}", self.entry.name);
        check(unsafe { (self.entry.release)(self.raw) })
    }

    /// The stored native pointer.
    ///
    /// Every OpenCL handle type is a pointer-width alias, so the call site
    /// assigns this to the `cl_*` alias its native call expects. There is no
    /// runtime check that the alias matches the handle's kind.
    pub fn raw(&self) -> *mut c_void {
        self.raw
    }

    /// The kind tag selected at construction.
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Diagnostic name of the kind, e.g. `"cl_context"`.
    pub fn kind_name(&self) -> &'static str {
        self.entry.name
    }

    /// Whether the handle's owned reference has already been returned, by
    /// an explicit [`Handle::release`] or because the handle never owned one.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let status = unsafe { (self.entry.release)(self.raw) };
            if status != sys::CL_SUCCESS {
                debug!(
                    "releasing {} on drop failed with status {}",
                    self.entry.name, status
                );
            }
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Handle) -> bool {
        self.raw == other.raw && self.kind == other.kind
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {} @{:?} }}", self.entry.name, self.raw)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    fn fake_ptr() -> *mut c_void {
        0xB00F_usize as *mut c_void
    }

    #[test]
    fn test_wrap_raw_round_trip() {
        let p = fake_ptr();
        for code in 1..=11 {
            let kind = HandleKind::from_code(code);
            let handle = Handle::wrap_borrowed(p, kind);
            assert_eq!(handle.raw(), p, "raw pointer survives wrapping as {:?}", kind);
            assert_eq!(handle.kind(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_code_degrades_to_sentinel() {
        let handle = Handle::wrap(fake_ptr(), HandleKind::from_code(99));
        assert_eq!(handle.kind_name(), "ERROR");
        assert!(handle.raw().is_null(), "sentinel must not keep the pointer");
        assert!(handle.release().is_ok(), "sentinel release reports success");
        assert!(handle.retain().is_ok(), "sentinel retain reports success");
    }

    #[test]
    fn test_null_pointer_for_counted_kind_degrades_to_sentinel() {
        let handle = Handle::wrap(ptr::null_mut(), HandleKind::Context);
        assert_eq!(handle.kind(), HandleKind::Invalid);
        assert!(handle.release().is_ok());
    }

    #[test]
    fn test_null_pointer_allowed_for_uncounted_kind() {
        // Info queries legitimately return null device ids (e.g. the parent
        // of a root device).
        let handle = Handle::wrap(ptr::null_mut(), HandleKind::DeviceId);
        assert_eq!(handle.kind(), HandleKind::DeviceId);
    }

    #[test]
    fn test_uncounted_retain_release_are_noops() {
        let handle = Handle::wrap(fake_ptr(), HandleKind::PlatformId);
        assert!(handle.retain().is_ok());
        assert!(handle.release().is_ok());
        assert!(handle.release().is_ok());
    }

    static RETAINS_A: AtomicUsize = AtomicUsize::new(0);
    static RELEASES_A: AtomicUsize = AtomicUsize::new(0);
    unsafe extern "system" fn retain_a(_: *mut c_void) -> sys::cl_int {
        RETAINS_A.fetch_add(1, SeqCst);
        sys::CL_SUCCESS
    }
    unsafe extern "system" fn release_a(_: *mut c_void) -> sys::cl_int {
        RELEASES_A.fetch_add(1, SeqCst);
        sys::CL_SUCCESS
    }
    static ENTRY_A: KindEntry = KindEntry {
        name: "cl_context",
        retain: retain_a,
        release: release_a,
        counted: true,
    };

    #[test]
    fn test_retain_then_double_release_touches_driver_once_each() {
        let handle = Handle::with_entry(fake_ptr(), HandleKind::Context, &ENTRY_A);
        assert!(handle.retain().is_ok());
        assert!(handle.release().is_ok());
        assert!(handle.release().is_ok(), "second release reports success");
        drop(handle);
        assert_eq!(RETAINS_A.load(SeqCst), 1, "native retain called once");
        assert_eq!(
            RELEASES_A.load(SeqCst),
            1,
            "native release called exactly once across release/release/drop"
        );
    }

    static RELEASES_B: AtomicUsize = AtomicUsize::new(0);
    unsafe extern "system" fn release_b(_: *mut c_void) -> sys::cl_int {
        RELEASES_B.fetch_add(1, SeqCst);
        sys::CL_SUCCESS
    }
    static ENTRY_B: KindEntry = KindEntry {
        name: "cl_mem",
        retain: noop,
        release: release_b,
        counted: true,
    };

    #[test]
    fn test_drop_releases_exactly_once() {
        {
            let _handle = Handle::with_entry(fake_ptr(), HandleKind::Mem, &ENTRY_B);
        }
        assert_eq!(RELEASES_B.load(SeqCst), 1, "drop returns the owned reference");
    }

    static RELEASES_C: AtomicUsize = AtomicUsize::new(0);
    unsafe extern "system" fn release_c(_: *mut c_void) -> sys::cl_int {
        RELEASES_C.fetch_add(1, SeqCst);
        sys::CL_SUCCESS
    }
    static ENTRY_C: KindEntry = KindEntry {
        name: "cl_event",
        retain: noop,
        release: release_c,
        counted: true,
    };

    #[test]
    fn test_borrowed_handle_never_releases() {
        {
            let handle = Handle::with_entry(fake_ptr(), HandleKind::Event, &ENTRY_C);
            handle.released.store(true, Ordering::Release);
            assert!(handle.release().is_ok());
        }
        assert_eq!(RELEASES_C.load(SeqCst), 0, "borrowed views own no reference");
    }

    #[test]
    fn test_borrowed_constructor_is_disarmed() {
        let handle = Handle::wrap_borrowed(fake_ptr(), HandleKind::Context);
        assert!(handle.is_released());
        assert!(handle.release().is_ok());
    }

    #[test]
    fn test_from_code_maps_known_and_unknown_codes() {
        assert_eq!(HandleKind::from_code(3), HandleKind::Context);
        assert_eq!(HandleKind::from_code(8), HandleKind::CommandQueue);
        assert_eq!(HandleKind::from_code(0), HandleKind::Invalid);
        assert_eq!(HandleKind::from_code(-1), HandleKind::Invalid);
        assert_eq!(HandleKind::from_code(12), HandleKind::Invalid);
    }

    #[test]
    fn test_counted_flags_follow_the_kind_table() {
        assert!(HandleKind::Context.is_counted());
        assert!(HandleKind::Event.is_counted());
        assert!(!HandleKind::PlatformId.is_counted());
        assert!(!HandleKind::DeviceId.is_counted());
        assert!(!HandleKind::ProgramBinary.is_counted());
        assert!(!HandleKind::MappedPtr.is_counted());
    }

    #[test]
    fn test_display_names_the_kind_and_address() {
        let handle = Handle::wrap(fake_ptr(), HandleKind::PlatformId);
        let rendered = handle.to_string();
        assert!(
            rendered.starts_with("{ cl_platform_id @"),
            "unexpected rendering: {}",
            rendered
        );
    }
}
