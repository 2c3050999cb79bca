//! Container payloads and the runtime type enumeration.

mod dict;
mod list;
mod set;

pub(crate) use dict::Dict;
pub(crate) use list::List;
pub(crate) use set::Set;

use strum::Display;

/// The dynamic type of a runtime value, as shown in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Tuple,
    List,
    Dict,
    Set,
    Function,
    #[strum(serialize = "builtin_function_or_method")]
    Builtin,
    Cell,
    Module,
    Mandatory,
}
