//! CPython 3 backend. The frozen table layout predates 3.11.

#![allow(non_snake_case, non_upper_case_globals)]

use crate::rt::{
    host_decoder, ArgRepr, BootFlags, ExtensionModule, ExtensionTable, FrozenBlobs, FrozenTable,
    NativeArg, NativeArgv, Runtime, RuntimeError, TableError, WideChar,
};
use std::ffi::{c_char, c_int, CStr};
use std::ptr::{self, addr_of};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

#[repr(C)]
pub struct PyObject {
    _private: [u8; 0],
}

pub type InitFunc = unsafe extern "C" fn() -> *mut PyObject;

#[repr(C)]
pub struct RawFrozen {
    pub name: *const c_char,
    pub code: *const u8,
    pub size: c_int,
}

#[repr(C)]
pub struct RawInittab {
    pub name: *const c_char,
    pub initfunc: Option<InitFunc>,
}

extern "C" {
    static mut Py_FrozenFlag: c_int;
    static mut Py_NoSiteFlag: c_int;
    static mut Py_FileSystemDefaultEncoding: *const c_char;
    static mut PyImport_FrozenModules: *const RawFrozen;
    static mut PyExc_ImportError: *mut PyObject;

    fn PyImport_AppendInittab(name: *const c_char, initfunc: Option<InitFunc>) -> c_int;
    fn PyImport_ExtendInittab(newtab: *mut RawInittab) -> c_int;
    fn Py_SetProgramName(name: *const WideChar);
    fn Py_Initialize();
    fn Py_Finalize();
    fn PySys_SetArgv(argc: c_int, argv: *mut *mut WideChar);
    fn PySys_SetObject(name: *const c_char, v: *mut PyObject) -> c_int;
    fn PyList_New(size: isize) -> *mut PyObject;
    fn PyList_Append(list: *mut PyObject, item: *mut PyObject) -> c_int;
    fn PyUnicode_FromString(s: *const c_char) -> *mut PyObject;
    fn PyImport_AddModule(name: *const c_char) -> *mut PyObject;
    fn PyModule_GetDict(module: *mut PyObject) -> *mut PyObject;
    fn PyDict_SetItemString(dict: *mut PyObject, key: *const c_char, item: *mut PyObject) -> c_int;
    fn PyImport_ImportFrozenModule(name: *const c_char) -> c_int;
    fn PyImport_ImportModule(name: *const c_char) -> *mut PyObject;
    fn PyObject_GetAttrString(o: *mut PyObject, name: *const c_char) -> *mut PyObject;
    fn PyObject_CallObject(callable: *mut PyObject, args: *mut PyObject) -> *mut PyObject;
    fn PyErr_SetString(kind: *mut PyObject, message: *const c_char);
    fn PyErr_Print();
    fn Py_DecRef(o: *mut PyObject);

    fn PyInit_frozen_importer() -> *mut PyObject;

    static frozen_start_bootstrap: [u8; 0];
    static frozen_start_bootstrap_size: usize;
    static frozen_start_main: [u8; 0];
    static frozen_start_main_size: usize;
}

struct InstalledFrozen(Vec<RawFrozen>);

unsafe impl Send for InstalledFrozen {}
unsafe impl Sync for InstalledFrozen {}

// PyImport_FrozenModules points here for the rest of the process.
fn installed_frozen() -> &'static OnceLock<InstalledFrozen> {
    static FROZEN: OnceLock<InstalledFrozen> = OnceLock::new();

    &FROZEN
}

/// The blobs the freezing tool linked into the executable.
///
/// # Safety
/// The `frozen_start_*` symbols must be present and consistent.
pub unsafe fn frozen_blobs() -> FrozenBlobs {
    unsafe {
        FrozenBlobs {
            bootstrap: std::slice::from_raw_parts(
                addr_of!(frozen_start_bootstrap).cast::<u8>(),
                frozen_start_bootstrap_size,
            ),
            main: std::slice::from_raw_parts(
                addr_of!(frozen_start_main).cast::<u8>(),
                frozen_start_main_size,
            ),
        }
    }
}

/// Reads a sentinel-terminated `_inittab` array. `None` for a null table.
/// Entries keep their initialiser as given, null included.
///
/// # Safety
/// `table` is null or a static array ending in an entry with a null name.
pub unsafe fn collect_inittab(
    table: *const RawInittab,
) -> Option<ExtensionTable<Option<InitFunc>>> {
    if table.is_null() {
        return None;
    }

    let mut modules = Vec::new();
    let mut cursor = table;

    unsafe {
        while !(*cursor).name.is_null() {
            modules.push(ExtensionModule {
                name: CStr::from_ptr((*cursor).name),
                init: (*cursor).initfunc,
            });
            cursor = cursor.add(1);
        }
    }

    Some(ExtensionTable::new(modules))
}

// The frozen table stores sizes as a C int.
fn frozen_size(code: &[u8]) -> Result<c_int, TableError> {
    c_int::try_from(code.len()).map_err(|_| TableError)
}

fn check(rc: c_int) -> Result<(), RuntimeError> {
    if rc < 0 {
        Err(RuntimeError)
    } else {
        Ok(())
    }
}

fn owned(obj: *mut PyObject) -> Result<*mut PyObject, RuntimeError> {
    if obj.is_null() {
        Err(RuntimeError)
    } else {
        Ok(obj)
    }
}

pub struct CPython {
    _private: (),
}

impl CPython {
    pub fn acquire() -> Option<Self> {
        static ACQUIRED: AtomicBool = AtomicBool::new(false);

        ACQUIRED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CPython { _private: () })
    }
}

impl Runtime for CPython {
    type Init = Option<InitFunc>;

    fn bootstrap_module(&self) -> &'static CStr {
        c"_frozen_importlib"
    }

    fn importer(&self) -> (&'static CStr, Option<InitFunc>) {
        (c"frozen_importer", Some(PyInit_frozen_importer as InitFunc))
    }

    fn imports_bootstrap(&self) -> bool {
        false
    }

    fn arg_repr(&self) -> ArgRepr<'_> {
        ArgRepr::Wide(host_decoder())
    }

    fn set_flags(&mut self, flags: BootFlags) {
        unsafe {
            Py_FrozenFlag = flags.frozen_imports as c_int;
            Py_NoSiteFlag = flags.no_site as c_int;
            if flags.utf8_filesystem {
                Py_FileSystemDefaultEncoding = c"utf-8".as_ptr();
            }
        }
    }

    fn install_frozen(&mut self, table: FrozenTable) -> Result<(), TableError> {
        let mut raw: Vec<RawFrozen> = table
            .iter()
            .map(|m| {
                Ok(RawFrozen {
                    name: m.name.as_ptr(),
                    code: m.code.as_ptr(),
                    size: frozen_size(m.code)?,
                })
            })
            .collect::<Result<_, TableError>>()?;
        raw.push(RawFrozen {
            name: ptr::null(),
            code: ptr::null(),
            size: 0,
        });

        let installed = installed_frozen().get_or_init(|| InstalledFrozen(raw));

        unsafe {
            PyImport_FrozenModules = installed.0.as_ptr();
        }

        Ok(())
    }

    fn append_builtin(
        &mut self,
        name: &'static CStr,
        init: Option<InitFunc>,
    ) -> Result<(), TableError> {
        let rc = unsafe { PyImport_AppendInittab(name.as_ptr(), init) };

        if rc < 0 {
            Err(TableError)
        } else {
            Ok(())
        }
    }

    fn extend_builtins(
        &mut self,
        table: &ExtensionTable<Option<InitFunc>>,
    ) -> Result<(), TableError> {
        // CPython copies the entries; the names are the caller's statics.
        let mut raw: Vec<RawInittab> = table
            .modules()
            .iter()
            .map(|m| RawInittab {
                name: m.name.as_ptr(),
                initfunc: m.init,
            })
            .collect();
        raw.push(RawInittab {
            name: ptr::null(),
            initfunc: None,
        });

        let rc = unsafe { PyImport_ExtendInittab(raw.as_mut_ptr()) };

        if rc < 0 {
            Err(TableError)
        } else {
            Ok(())
        }
    }

    fn set_program_name(&mut self, program: &NativeArg) {
        if let NativeArg::Wide(program) = program {
            unsafe { Py_SetProgramName(program.as_ptr()) }
        }
    }

    fn initialize(&mut self) -> Result<(), RuntimeError> {
        unsafe { Py_Initialize() };

        Ok(())
    }

    fn set_argv(&mut self, argv: &NativeArgv) -> Result<(), RuntimeError> {
        let mut ptrs: Vec<*mut WideChar> = argv
            .iter()
            .filter_map(|arg| match arg {
                NativeArg::Wide(w) => Some(w.as_ptr().cast_mut()),
                NativeArg::Bytes(_) => None,
            })
            .collect();
        let argc = c_int::try_from(ptrs.len()).map_err(|_| RuntimeError)?;

        unsafe { PySys_SetArgv(argc, ptrs.as_mut_ptr()) };

        Ok(())
    }

    fn import_frozen(&mut self, name: &CStr) -> Result<(), RuntimeError> {
        let rc = unsafe { PyImport_ImportFrozenModule(name.as_ptr()) };

        if rc == 0 {
            unsafe {
                PyErr_SetString(PyExc_ImportError, c"frozen module not found".as_ptr());
            }
            return Err(RuntimeError);
        }

        check(rc)
    }

    fn set_search_path(&mut self, path: &[&CStr]) -> Result<(), RuntimeError> {
        unsafe {
            let list = owned(PyList_New(0))?;

            let mut result = Ok(());
            for fragment in path {
                let item = match owned(PyUnicode_FromString(fragment.as_ptr())) {
                    Ok(item) => item,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                };
                let rc = PyList_Append(list, item);
                Py_DecRef(item);
                if let Err(e) = check(rc) {
                    result = Err(e);
                    break;
                }
            }

            if result.is_ok() {
                result = check(PySys_SetObject(c"path".as_ptr(), list));
            }
            Py_DecRef(list);

            result
        }
    }

    fn set_main_file(&mut self, filename: &CStr) -> Result<(), RuntimeError> {
        unsafe {
            // Borrowed references.
            let module = owned(PyImport_AddModule(c"__main__".as_ptr()))?;
            let dict = PyModule_GetDict(module);

            let value = owned(PyUnicode_FromString(filename.as_ptr()))?;
            let rc = PyDict_SetItemString(dict, c"__file__".as_ptr(), value);
            Py_DecRef(value);

            check(rc)
        }
    }

    fn run_entry_point(&mut self, module: &CStr, callable: &CStr) -> Result<(), RuntimeError> {
        unsafe {
            let module = owned(PyImport_ImportModule(module.as_ptr()))?;
            let func = PyObject_GetAttrString(module, callable.as_ptr());
            Py_DecRef(module);
            let func = owned(func)?;

            let result = PyObject_CallObject(func, ptr::null_mut());
            Py_DecRef(func);
            let result = owned(result)?;
            Py_DecRef(result);
        }

        Ok(())
    }

    fn finalize(&mut self) {
        unsafe { Py_Finalize() }
    }

    fn print_error(&mut self) {
        unsafe { PyErr_Print() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn init_nothing() -> *mut PyObject {
        ptr::null_mut()
    }

    #[test]
    fn inittab_entries_pass_through_unchanged() {
        let raw = [
            RawInittab {
                name: c"_ssl".as_ptr(),
                initfunc: Some(init_nothing),
            },
            RawInittab {
                name: c"_placeholder".as_ptr(),
                initfunc: None,
            },
            RawInittab {
                name: ptr::null(),
                initfunc: None,
            },
        ];

        let table = unsafe { collect_inittab(raw.as_ptr()) }.unwrap();

        let names: Vec<&CStr> = table.modules().iter().map(|m| m.name).collect();
        assert_eq!(names, [c"_ssl", c"_placeholder"]);
        assert!(table.modules()[0].init.is_some());
        assert!(table.modules()[1].init.is_none());
        assert!(unsafe { collect_inittab(ptr::null()) }.is_none());
    }

    #[test]
    fn frozen_sizes_fit_a_c_int() {
        assert_eq!(frozen_size(&[0xE3, 0, 0]), Ok(3));
        assert_eq!(frozen_size(&[]), Ok(0));
    }
}
