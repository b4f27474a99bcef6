//! # Reconcile
//!
//! One pass over a target: run its components on a copy, then merge-patch the
//! status subresource when it changed.

use super::context::{resource_key, Context};
use crate::constants::FIELD_MANAGER;
use crate::controller::{ReconcileError, Reconcilable};
use crate::observability::metrics;
use kube::api::{Api, Patch, PatchParams};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use kube_runtime::controller::Action;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info_span, Instrument};

pub async fn reconcile<T>(obj: Arc<T>, ctx: Arc<Context<T>>) -> Result<Action, ReconcileError>
where
    T: Reconcilable
        + Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + 'static,
{
    let span = info_span!(
        "reconcile",
        kind = T::KIND,
        resource.name = %obj.target_name(),
        resource.namespace = %obj.target_namespace()
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations(T::KIND);

        let mut target = (*obj).clone();
        let result = ctx.runner.run(&mut target).await;

        let patched = persist_status(&ctx, &obj, &target).await;
        metrics::observe_reconciliation_duration(T::KIND, start.elapsed().as_secs_f64());

        match (result, patched) {
            (Ok(outcome), Ok(())) => {
                ctx.reset_backoff(&resource_key(&target));
                let after = if outcome.requeue {
                    ctx.config.error_requeue_duration()
                } else {
                    ctx.config.resync_duration()
                };
                debug!("Reconciled, next pass in {}s", after.as_secs());
                Ok(Action::requeue(after))
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), patched) => {
                if let Err(patch_error) = patched {
                    error!("Failed to record error status: {}", patch_error);
                }
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn persist_status<T>(ctx: &Context<T>, before: &T, after: &T) -> Result<(), ReconcileError>
where
    T: Reconcilable
        + Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let patch = after.status_patch();
    if patch == before.status_patch() {
        return Ok(());
    }

    let api: Api<T> = Api::namespaced(ctx.client.clone(), &after.target_namespace());
    api.patch_status(
        &after.target_name(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    debug!("Status updated");
    Ok(())
}
