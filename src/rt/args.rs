use crate::rt::BootError;
use std::ffi::{CStr, CString};
use std::fmt;
use std::mem::size_of;

pub type WideChar = libc::wchar_t;

const ESCAPE_BASE: u32 = 0xDC00;

/// NUL-terminated wide-character string in the host's `wchar_t` layout.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WideString(Box<[WideChar]>);

impl WideString {
    /// Returns `None` if `s` contains an interior NUL.
    pub fn new(s: &str) -> Option<Self> {
        if s.contains('\0') {
            return None;
        }

        let mut units: Vec<WideChar> = if size_of::<WideChar>() == 2 {
            s.encode_utf16().map(|u| u as WideChar).collect()
        } else {
            s.chars().map(|c| c as u32 as WideChar).collect()
        };
        units.push(0);

        Some(WideString(units.into_boxed_slice()))
    }

    /// Copies a NUL-terminated wide string.
    ///
    /// # Safety
    /// `ptr` must be non-null and point at a NUL-terminated `wchar_t` array.
    pub unsafe fn from_raw(ptr: *const WideChar) -> Self {
        let mut units = Vec::new();
        let mut cursor = ptr;

        unsafe {
            while *cursor != 0 {
                units.push(*cursor);
                cursor = cursor.add(1);
            }
        }
        units.push(0);

        WideString(units.into_boxed_slice())
    }

    #[inline]
    pub fn as_ptr(&self) -> *const WideChar {
        self.0.as_ptr()
    }

    #[inline]
    pub fn units(&self) -> &[WideChar] {
        &self.0[..self.0.len() - 1]
    }

    pub fn to_string_lossy(&self) -> String {
        if size_of::<WideChar>() == 2 {
            char::decode_utf16(self.units().iter().map(|&u| u as u16))
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        } else {
            self.units()
                .iter()
                .map(|&u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    }
}

impl fmt::Debug for WideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{:?}", self.to_string_lossy())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeArg {
    Bytes(CString),
    Wide(WideString),
}

/// Transcoded argument vector. All entries share one representation and
/// slot 0 is always the canonical program path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeArgv(Vec<NativeArg>);

impl NativeArgv {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn program(&self) -> &NativeArg {
        &self.0[0]
    }

    #[inline]
    pub fn as_slice(&self) -> &[NativeArg] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NativeArg> {
        self.0.iter()
    }
}

/// Converts one host argument into wide characters.
pub trait WideDecoder {
    /// Conversions must run under the environment's default locale.
    fn uses_locale(&self) -> bool {
        false
    }

    /// Number of wide units needed for `arg`, terminator excluded.
    /// `None` if `arg` has no wide representation.
    fn decoded_len(&self, arg: &CStr) -> Option<usize>;

    /// Fills `out` (sized `decoded_len + 1`) and returns the units written.
    fn decode(&self, arg: &CStr, out: &mut [WideChar]) -> Option<usize>;
}

/// Per-byte conversion for hosts without a locale subsystem.
///
/// ASCII maps to itself, `0x80..=0xFF` maps to `0xDC00 + b`, so any byte
/// string survives the trip through a wide-only argument channel.
#[derive(Debug, Default, Copy, Clone)]
pub struct EscapeDecoder;

impl WideDecoder for EscapeDecoder {
    fn decoded_len(&self, arg: &CStr) -> Option<usize> {
        Some(arg.to_bytes().len())
    }

    fn decode(&self, arg: &CStr, out: &mut [WideChar]) -> Option<usize> {
        let bytes = arg.to_bytes();
        if out.len() <= bytes.len() {
            return None;
        }

        for (slot, &b) in out.iter_mut().zip(bytes) {
            *slot = escape_byte(b) as WideChar;
        }
        out[bytes.len()] = 0;

        Some(bytes.len())
    }
}

// libc exports setlocale but not mbstowcs.
#[cfg(any(unix, windows))]
extern "C" {
    fn mbstowcs(dest: *mut WideChar, src: *const std::ffi::c_char, n: usize) -> usize;
}

/// Multi-byte conversion through the C library's active locale.
#[cfg(any(unix, windows))]
#[derive(Debug, Default, Copy, Clone)]
pub struct LocaleDecoder;

#[cfg(any(unix, windows))]
impl WideDecoder for LocaleDecoder {
    fn uses_locale(&self) -> bool {
        true
    }

    fn decoded_len(&self, arg: &CStr) -> Option<usize> {
        let len = unsafe { mbstowcs(std::ptr::null_mut(), arg.as_ptr(), 0) };

        (len != usize::MAX).then_some(len)
    }

    fn decode(&self, arg: &CStr, out: &mut [WideChar]) -> Option<usize> {
        let written = unsafe { mbstowcs(out.as_mut_ptr(), arg.as_ptr(), out.len()) };

        (written != usize::MAX && written < out.len()).then_some(written)
    }
}

/// Switches `LC_ALL` to the environment default and restores the previous
/// locale when dropped.
#[cfg(any(unix, windows))]
pub struct LocaleOverride {
    saved: Option<CString>,
}

#[cfg(any(unix, windows))]
impl LocaleOverride {
    pub fn environment() -> Self {
        // setlocale's result points at a buffer the next call may overwrite.
        let saved = unsafe {
            let current = libc::setlocale(libc::LC_ALL, std::ptr::null());
            (!current.is_null()).then(|| CStr::from_ptr(current).to_owned())
        };

        unsafe {
            libc::setlocale(libc::LC_ALL, c"".as_ptr());
        }

        LocaleOverride { saved }
    }
}

#[cfg(any(unix, windows))]
impl Drop for LocaleOverride {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            unsafe {
                libc::setlocale(libc::LC_ALL, saved.as_ptr());
            }
        }
    }
}

/// The runtime's native argument representation.
#[derive(Copy, Clone)]
pub enum ArgRepr<'d> {
    /// Byte strings are passed through unchanged.
    Bytes,
    /// Byte strings are decoded into wide characters.
    Wide(&'d dyn WideDecoder),
}

impl fmt::Debug for ArgRepr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgRepr::Bytes => f.write_str("Bytes"),
            ArgRepr::Wide(d) => write!(f, "Wide(locale: {})", d.uses_locale()),
        }
    }
}

/// Decoder for this host: the C locale machinery where there is one,
/// the escape scheme otherwise.
pub fn host_decoder() -> &'static dyn WideDecoder {
    #[cfg(all(any(unix, windows), not(target_os = "android")))]
    {
        &LocaleDecoder
    }

    #[cfg(not(all(any(unix, windows), not(target_os = "android"))))]
    {
        &EscapeDecoder
    }
}

#[inline]
pub const fn escape_byte(b: u8) -> u32 {
    if b <= 0x7F {
        b as u32
    } else {
        ESCAPE_BASE + b as u32
    }
}

/// Inverse of [`escape_byte`]. `None` for units the escape scheme never produces.
#[inline]
pub const fn unescape_unit(u: u32) -> Option<u8> {
    match u {
        0..=0x7F => Some(u as u8),
        0xDC80..=0xDCFF => Some((u - ESCAPE_BASE) as u8),
        _ => None,
    }
}

pub fn unescape(units: &[WideChar]) -> Option<Vec<u8>> {
    units.iter().map(|&u| unescape_unit(u as u32)).collect()
}

fn alloc_vec<T>(len: usize, what: impl FnOnce() -> String) -> Result<Vec<T>, BootError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| BootError::Alloc { what: what() })?;

    Ok(v)
}

fn copy_bytes(arg: &CStr, index: usize) -> Result<CString, BootError> {
    let bytes = arg.to_bytes_with_nul();
    let mut buf = alloc_vec::<u8>(bytes.len(), || format!("argument {index}"))?;
    buf.extend_from_slice(bytes);

    CString::from_vec_with_nul(buf).map_err(|_| BootError::Convert { index })
}

fn decode_wide(
    decoder: &dyn WideDecoder,
    arg: &CStr,
    index: usize,
) -> Result<WideString, BootError> {
    let len = decoder
        .decoded_len(arg)
        .ok_or(BootError::Convert { index })?;
    let units = len.checked_add(1).ok_or_else(|| BootError::Alloc {
        what: format!("argument {index}"),
    })?;

    let mut buf = alloc_vec::<WideChar>(units, || format!("argument {index}"))?;
    buf.resize(units, 0);

    decoder
        .decode(arg, &mut buf)
        .ok_or(BootError::Convert { index })?;
    buf[len] = 0;

    Ok(WideString(buf.into_boxed_slice()))
}

/// Converts host arguments into the runtime's representation.
///
/// Slot 0 is replaced by `program`; an empty `args` yields `[program]`.
/// Nothing is returned on failure, so the runtime never sees a partial vector.
pub fn transcode(
    repr: ArgRepr<'_>,
    program: &NativeArg,
    args: &[&CStr],
) -> Result<NativeArgv, BootError> {
    let argc = args.len().max(1);
    let mut argv = alloc_vec::<NativeArg>(argc, || "argument vector".to_owned())?;

    match (repr, program) {
        (ArgRepr::Bytes, NativeArg::Bytes(_)) => {
            argv.push(program.clone());

            for (index, arg) in args.iter().enumerate().skip(1) {
                argv.push(NativeArg::Bytes(copy_bytes(arg, index)?));
            }
        }
        (ArgRepr::Wide(decoder), NativeArg::Wide(_)) => {
            argv.push(program.clone());

            #[cfg(any(unix, windows))]
            let _locale = decoder.uses_locale().then(LocaleOverride::environment);

            for (index, arg) in args.iter().enumerate().skip(1) {
                argv.push(NativeArg::Wide(decode_wide(decoder, arg, index)?));
            }
        }
        _ => return Err(BootError::ProgramRepr),
    }

    Ok(NativeArgv(argv))
}

/// For hosts whose entry point already delivers native arguments: only
/// slot 0 is replaced.
pub fn transcode_native(program: &NativeArg, args: &[NativeArg]) -> Result<NativeArgv, BootError> {
    let argc = args.len().max(1);
    let mut argv = alloc_vec::<NativeArg>(argc, || "argument vector".to_owned())?;
    argv.push(program.clone());

    for (index, arg) in args.iter().enumerate().skip(1) {
        let same_repr = matches!(
            (program, arg),
            (NativeArg::Bytes(_), NativeArg::Bytes(_)) | (NativeArg::Wide(_), NativeArg::Wide(_))
        );
        if !same_repr {
            return Err(BootError::Convert { index });
        }
        argv.push(arg.clone());
    }

    Ok(NativeArgv(argv))
}
