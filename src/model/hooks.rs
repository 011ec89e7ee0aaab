// Copyright 2025 Cowboy AI, LLC.

//! Lifecycle hooks run around save, load and remove

use async_trait::async_trait;

use super::Model;
use crate::errors::OdmResult;

/// Hooks awaited around the instance lifecycle methods.
///
/// Each pre hook finishes before the repository call starts, and the post
/// hook only runs once that call has succeeded. An error from any hook
/// aborts the operation. Every method defaults to a no-op.
#[async_trait]
pub trait ModelHooks: Send + Sync {
    /// Before the instance is saved
    async fn pre_save(&self, _model: &mut Model) -> OdmResult<()> {
        Ok(())
    }

    /// After the instance was saved
    async fn post_save(&self, _model: &mut Model) -> OdmResult<()> {
        Ok(())
    }

    /// Before the instance is loaded
    async fn pre_load(&self, _model: &mut Model) -> OdmResult<()> {
        Ok(())
    }

    /// After the instance was loaded
    async fn post_load(&self, _model: &mut Model) -> OdmResult<()> {
        Ok(())
    }

    /// Before the instance is removed
    async fn pre_remove(&self, _model: &mut Model) -> OdmResult<()> {
        Ok(())
    }

    /// After the instance was removed
    async fn post_remove(&self, _model: &mut Model) -> OdmResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

#[async_trait]
impl ModelHooks for NoHooks {}
