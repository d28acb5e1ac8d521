/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::*;
use tracing_subscriber::EnvFilter;

use label_webhook::server::{serve, webhook_router, WebhookState};
use label_webhook::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let policy = cli.policy()?;
    let tls = cli.tls()?;
    let lookup_timeout = cli.namespace_lookup_timeout()?;

    let client = Client::try_default()
        .await
        .context("failed to create kube Client")?;
    let store = Arc::new(KubeNamespaceStore::new(client));

    let reconciler = LabelReconciler::new(
        cli.mode,
        policy,
        store,
        lookup_timeout,
        info_span!("label_reconciler", mode = ?cli.mode),
    );
    info!(
        mode = ?reconciler.mode(),
        exempt_namespace = %reconciler.policy().exempt_namespace,
        hosted_control_plane_label = %reconciler.policy().hosted_control_plane_label,
        managed_label_value = %reconciler.policy().managed_label_value,
        "starting watch-filter label webhook"
    );

    let router = webhook_router(Arc::new(WebhookState::new(reconciler)));
    if let Err(error) = serve(cli.bind_address, tls, router).await {
        error!("admission webhook stopped: {error}");
        return Err(error.into());
    }
    Ok(())
}
