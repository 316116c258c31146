//! Recognition of UniPi digital input directory names.
//!
//! The driver exposes every digital input as a folder named
//! `di_<group>_<index>` (one digit group, two digit zero padded index),
//! e.g. `io_group2/di_2_01`. The folder name doubles as the default
//! identifier under which the input is published.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static DIGITAL_INPUT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^di_[0-9]_[0-9]{2}$").expect("valid digital input pattern"));

/// Returns the identifier if `name` is a digital input folder name.
///
/// Only the exact canonical form matches; `di_1_1`, `di_01_01` or
/// `di_1_01_extra` are ignored.
pub fn match_name(name: &str) -> Option<&str> {
    DIGITAL_INPUT_NAME.find(name).map(|m| m.as_str())
}

/// Finds the identifier in the closest matching component of `path`.
///
/// Used for value files configured by hand, such as
/// `/sys/.../io_group2/di_2_01/di_value`.
pub fn identifier_from_path(path: &Path) -> Option<String> {
    path.components()
        .rev()
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(match_name)
        .map(str::to_string)
}
