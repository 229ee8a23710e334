use crate::rt::{BootError, NativeArgv};
use sharded_slab::{Entry, Slab};
use std::sync::OnceLock;

// Entries are never removed: the runtime may keep raw pointers into them
// until the process exits.
fn arg_buffers() -> &'static Slab<NativeArgv> {
    static BUFFERS: OnceLock<Slab<NativeArgv>> = OnceLock::new();

    BUFFERS.get_or_init(Slab::new)
}

/// Moves `argv` into process-lifetime storage.
pub fn retain_argv(argv: NativeArgv) -> Result<Entry<'static, NativeArgv>, BootError> {
    let buffers = arg_buffers();

    buffers
        .insert(argv)
        .and_then(|key| buffers.get(key))
        .ok_or_else(|| BootError::Alloc {
            what: "argument buffer slot".to_owned(),
        })
}
