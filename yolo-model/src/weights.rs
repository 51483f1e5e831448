//! By-name, mismatch-tolerant weight loading.

use crate::common::*;

/// Loads matching-by-name weights into the var store.
///
/// Variables without a matching entry in the file are skipped and reported,
/// not raised; a missing or unreadable file is a hard error.
pub fn load_partial<P>(vs: &mut nn::VarStore, weights_file: P) -> Result<()>
where
    P: AsRef<Path>,
{
    let weights_file = weights_file.as_ref();
    let missing = vs.load_partial(weights_file).with_context(|| {
        format!(
            "failed to load weights from '{}'",
            weights_file.display()
        )
    })?;

    info!("load weights {}", weights_file.display());
    if !missing.is_empty() {
        warn!(
            "{} variables have no matching entry in '{}' and were skipped",
            missing.len(),
            weights_file.display()
        );
    }
    Ok(())
}
