use std::ffi::{c_char, c_int, CStr};

#[cfg(feature = "cpython")]
use crate::rt::boot::{start, BootConfig, HostArgs};
#[cfg(feature = "cpython")]
use crate::rt::cpython::{self, CPython, RawInittab};
#[cfg(feature = "cpython")]
use crate::rt::{NativeArg, WideChar, WideString};

/// Borrows the host's `argv`. Stops early at a null entry.
///
/// # Safety
/// `argv` is null or points at `argc` pointers to NUL-terminated strings
/// that outlive `'a`.
pub unsafe fn collect_args<'a>(argc: c_int, argv: *const *const c_char) -> Vec<&'a CStr> {
    if argv.is_null() || argc <= 0 {
        return Vec::new();
    }

    let argc = argc as usize;
    let mut args = Vec::with_capacity(argc);

    for i in 0..argc {
        let arg = unsafe { *argv.add(i) };
        if arg.is_null() {
            break;
        }
        args.push(unsafe { CStr::from_ptr(arg) });
    }

    args
}

/// Borrows a NULL-terminated list of path fragments. `None` for a null list.
///
/// # Safety
/// `path` is null or points at a NULL-terminated array of NUL-terminated
/// strings that outlive `'a`.
pub unsafe fn collect_path<'a>(path: *const *const c_char) -> Option<Vec<&'a CStr>> {
    if path.is_null() {
        return None;
    }

    let mut fragments = Vec::new();
    let mut cursor = path;

    unsafe {
        while !(*cursor).is_null() {
            fragments.push(CStr::from_ptr(*cursor));
            cursor = cursor.add(1);
        }
    }

    Some(fragments)
}

/// Entry point called by the generated host `main`.
///
/// `extension_modules` and `path` may be null. Returns the process exit code.
///
/// # Safety
/// All pointers follow the C conventions documented on [`collect_args`] and
/// [`collect_path`]; `program` and `main_filename` are NUL-terminated.
#[cfg(feature = "cpython")]
#[export_name = "frozen_start"]
pub unsafe extern "C" fn frozen_start(
    argc: c_int,
    argv: *const *const c_char,
    program: *const WideChar,
    main_filename: *const c_char,
    extension_modules: *const RawInittab,
    path: *const *const c_char,
) -> c_int {
    if program.is_null() || main_filename.is_null() {
        eprintln!("frozen_start: program path and main filename are required");
        return 1;
    }

    let Some(rt) = CPython::acquire() else {
        eprintln!("frozen_start: the runtime has already been started");
        return 1;
    };

    let args = unsafe { collect_args(argc, argv) };
    let program = NativeArg::Wide(unsafe { WideString::from_raw(program) });
    let main_filename = unsafe { CStr::from_ptr(main_filename) };
    let extensions = unsafe { cpython::collect_inittab(extension_modules) };
    let path = unsafe { collect_path(path) };

    let mut config = BootConfig::new(unsafe { cpython::frozen_blobs() }, program, main_filename);
    if let Some(extensions) = &extensions {
        config = config.with_extensions(extensions);
    }
    if let Some(path) = &path {
        config = config.with_path(path);
    }

    start(rt, HostArgs::Bytes(&args), &config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn args_are_borrowed_in_order() {
        let raw = [c"prog".as_ptr(), c"-x".as_ptr(), c"\xff".as_ptr()];
        let args = unsafe { collect_args(3, raw.as_ptr()) };

        assert_eq!(args, [c"prog", c"-x", c"\xff"]);
        assert!(unsafe { collect_args(0, raw.as_ptr()) }.is_empty());
        assert!(unsafe { collect_args(2, ptr::null()) }.is_empty());
    }

    #[test]
    fn path_list_stops_at_null() {
        let raw = [c"/extra/one".as_ptr(), c"/extra/two".as_ptr(), ptr::null()];
        let path = unsafe { collect_path(raw.as_ptr()) }.unwrap();

        assert_eq!(path, [c"/extra/one", c"/extra/two"]);
        assert!(unsafe { collect_path(ptr::null()) }.is_none());

        let empty = [ptr::null::<c_char>()];
        assert_eq!(unsafe { collect_path(empty.as_ptr()) }, Some(vec![]));
    }
}
