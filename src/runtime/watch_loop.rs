//! # Watch Loop
//!
//! Runs one `kube_runtime` controller for a target kind until shutdown.

use super::context::Context;
use super::error_policy::handle_reconciliation_error;
use super::reconcile::reconcile;
use crate::controller::Reconcilable;
use futures::StreamExt;
use kube::api::Api;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use kube_runtime::{watcher, Controller};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run_watch_loop<T>(api: Api<T>, ctx: Arc<Context<T>>)
where
    T: Reconcilable
        + Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + 'static,
{
    info!("Starting {} controller", T::KIND);

    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, ctx)
        .for_each(|result| {
            match result {
                Ok((object, _)) => debug!("{} {} reconciled", T::KIND, object.name),
                Err(e) => warn!("{} controller event failed: {}", T::KIND, e),
            }
            futures::future::ready(())
        })
        .await;

    info!("{} controller stopped", T::KIND);
}
