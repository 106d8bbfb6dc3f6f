//! Library registration hook
//!
//! Every plugin library exports one C-linkage function named
//! [`HOOK_SYMBOL`]. The loader calls it with the values it expects; the
//! library overwrites them with its own and hands out its plugin map only
//! when all of them matched. A mismatch therefore never exposes memory whose
//! layout the loader would misread.

use std::ffi::c_void;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};

use crate::{Info, InfoMap};

/// Version of the hook protocol and of the [`Info`] layout
pub const TETHER_API_VERSION: u32 = 1;

/// Name of the symbol every plugin library exports
pub const HOOK_SYMBOL: &[u8] = b"tether_plugin_hook\0";

/// Signature of the exported hook
///
/// Arguments: `(output, api_version, info_size, info_align)`. `output`
/// receives a `*const InfoMap` on success.
pub type PluginHookFn =
    unsafe extern "C" fn(*mut *const c_void, *mut u32, *mut usize, *mut usize);

/// Values exchanged during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub api_version: u32,
    pub info_size: usize,
    pub info_align: usize,
}

impl Handshake {
    /// Values describing the [`Info`] compiled into this binary
    pub const fn current() -> Self {
        Self {
            api_version: TETHER_API_VERSION,
            info_size: size_of::<Info>(),
            info_align: align_of::<Info>(),
        }
    }
}

impl std::fmt::Display for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "api v{} (info size {}, align {})",
            self.api_version, self.info_size, self.info_align
        )
    }
}

/// Library side of the handshake, called from the exported hook.
///
/// # Safety
/// All pointers must be valid for reads and writes, as the loader guarantees.
pub unsafe fn respond(
    output: *mut *const c_void,
    api_version: *mut u32,
    info_size: *mut usize,
    info_align: *mut usize,
    plugins: &'static InfoMap,
) {
    if output.is_null() || api_version.is_null() || info_size.is_null() || info_align.is_null() {
        return;
    }

    let ours = Handshake::current();
    let requested = Handshake {
        api_version: *api_version,
        info_size: *info_size,
        info_align: *info_align,
    };

    *api_version = ours.api_version;
    *info_size = ours.info_size;
    *info_align = ours.info_align;

    if requested == ours {
        *output = plugins as *const InfoMap as *const c_void;
    }
}

/// Loader side of the handshake.
///
/// Returns the library's plugin map when the handshake matched (`None` if
/// the library matched but handed out nothing), or the values the library
/// reported when it did not.
///
/// # Safety
/// `hook` must be a hook exported by a library that stays loaded for as long
/// as the returned pointer is used.
pub unsafe fn request(hook: PluginHookFn) -> Result<Option<NonNull<InfoMap>>, Handshake> {
    let expected = Handshake::current();
    let mut reported = expected;
    let mut output: *const c_void = ptr::null();

    hook(
        &mut output,
        &mut reported.api_version,
        &mut reported.info_size,
        &mut reported.info_align,
    );

    if reported != expected {
        return Err(reported);
    }

    Ok(NonNull::new(output as *mut InfoMap))
}
