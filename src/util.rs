use std::any::Any;

use anyhow::anyhow;

/// Turn a caught panic payload into a readable error message.
pub(crate) fn try_to_extract_panic_info(info: &(dyn Any + Send)) -> anyhow::Error {
    if let Some(message) = info.downcast_ref::<&str>() {
        anyhow!("job panicked: {message}")
    } else if let Some(message) = info.downcast_ref::<String>() {
        anyhow!("job panicked: {message}")
    } else {
        anyhow!("job panicked")
    }
}
