//! Post-write hooks.
//!
//! A hook sees every resource after it has been committed by create, replace
//! or patch. Hooks run in registration order and the first failure stops the
//! chain; the write itself is not undone.

use crate::error::{ScimError, ScimResult};
use crate::resource::{Group, User};
use std::sync::Arc;

/// Side effects to run after a resource has been written.
///
/// Both methods default to doing nothing, so a hook only implements the
/// resource type it cares about.
pub trait WriteHook: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn after_user_write(&self, _user: &User) -> ScimResult<()> {
        Ok(())
    }

    fn after_group_write(&self, _group: &Group) -> ScimResult<()> {
        Ok(())
    }
}

pub(crate) fn run_user_hooks(hooks: &[Arc<dyn WriteHook>], user: &User) -> ScimResult<()> {
    for hook in hooks {
        hook.after_user_write(user).map_err(|e| failed(hook.as_ref(), e))?;
    }
    Ok(())
}

pub(crate) fn run_group_hooks(hooks: &[Arc<dyn WriteHook>], group: &Group) -> ScimResult<()> {
    for hook in hooks {
        hook.after_group_write(group)
            .map_err(|e| failed(hook.as_ref(), e))?;
    }
    Ok(())
}

fn failed(hook: &dyn WriteHook, error: ScimError) -> ScimError {
    log::warn!("Write hook '{}' failed: {}", hook.name(), error);
    match error {
        ScimError::Hook { .. } => error,
        other => ScimError::hook(format!("{}: {}", hook.name(), other)),
    }
}
