//! Maintenance commands: decay and digest.

use super::Context;
use crate::Result;
use crate::rendering::write_digest;

/// Recomputes confidence of volatile memories.
pub fn decay(ctx: &Context) -> Result<String> {
    ctx.locked(|store| {
        let changed = store.decay_confidence()?;
        Ok(format!("Decayed confidence of {changed} memories"))
    })
}

/// Renders the digest, to stdout or into the host document.
pub fn digest(ctx: &Context, to_stdout: bool) -> Result<String> {
    if to_stdout {
        return Ok(ctx.open()?.generate_consciousness());
    }

    let target = ctx.project_root.join(&ctx.config.digest.path);
    ctx.locked(|store| {
        let text = store.generate_consciousness();
        Ok(if write_digest(&target, &text)? {
            format!("Digest written to {}", target.display())
        } else {
            format!("Digest in {} is up to date", target.display())
        })
    })
}
