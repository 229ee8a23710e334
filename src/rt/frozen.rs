use crate::rt::BootError;
use std::ffi::CStr;

pub const MAIN_MODULE: &CStr = c"__main__";

/// Compiled byte-code of one module, as emitted by the freezing tool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrozenModule {
    pub name: &'static CStr,
    pub code: &'static [u8],
}

/// The frozen-module table: the import machinery first, then `__main__`.
///
/// Read-only once built. Runtimes that need a C table append the sentinel
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenTable {
    modules: [FrozenModule; 2],
}

impl FrozenTable {
    pub fn new(
        bootstrap_name: &'static CStr,
        bootstrap: &'static [u8],
        main: &'static [u8],
    ) -> Result<Self, BootError> {
        if bootstrap_name == MAIN_MODULE {
            return Err(BootError::DuplicateFrozen {
                name: bootstrap_name.to_string_lossy().into_owned(),
            });
        }

        Ok(FrozenTable {
            modules: [
                FrozenModule {
                    name: bootstrap_name,
                    code: bootstrap,
                },
                FrozenModule {
                    name: MAIN_MODULE,
                    code: main,
                },
            ],
        })
    }

    #[inline]
    pub fn bootstrap(&self) -> &FrozenModule {
        &self.modules[0]
    }

    #[inline]
    pub fn main(&self) -> &FrozenModule {
        &self.modules[1]
    }

    pub fn get(&self, name: &CStr) -> Option<&FrozenModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrozenModule> {
        self.modules.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl<'a> IntoIterator for &'a FrozenTable {
    type Item = &'a FrozenModule;
    type IntoIter = std::slice::Iter<'a, FrozenModule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A natively compiled module and its initialiser.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExtensionModule<I> {
    pub name: &'static CStr,
    pub init: I,
}

/// Caller-supplied extension modules, appended in order to the runtime's
/// module-initialisation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTable<I> {
    modules: Vec<ExtensionModule<I>>,
}

impl<I> ExtensionTable<I> {
    pub fn new(modules: Vec<ExtensionModule<I>>) -> Self {
        ExtensionTable { modules }
    }

    #[inline]
    pub fn modules(&self) -> &[ExtensionModule<I>] {
        &self.modules
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<I> FromIterator<ExtensionModule<I>> for ExtensionTable<I> {
    fn from_iter<T: IntoIterator<Item = ExtensionModule<I>>>(iter: T) -> Self {
        ExtensionTable::new(iter.into_iter().collect())
    }
}
