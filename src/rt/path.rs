use std::ffi::CStr;

/// Root, standard library and site-packages of the compiled-in resource
/// filesystem, in search order.
pub const MINIMAL_PATH: [&CStr; 3] = [c":/", c":/stdlib", c":/site-packages"];

/// The module search path: [`MINIMAL_PATH`] followed by `extra` as given.
pub fn search_path<'a>(extra: Option<&[&'a CStr]>) -> Vec<&'a CStr> {
    let extra = extra.unwrap_or_default();

    let mut path = Vec::with_capacity(MINIMAL_PATH.len() + extra.len());
    path.extend_from_slice(&MINIMAL_PATH);
    path.extend_from_slice(extra);

    path
}
