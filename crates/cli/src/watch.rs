// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

use kubemux_network::{
    hook::{WatchRequest, watch},
    identity::StaticIdentity,
    multiplexer::{Subscription, WatchMultiplexer},
    transport::websocket::WebSocketConnector,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::{config::CliConfig, opt::WatchOpt};

/// Builds one [`WatchRequest`] per `--path`, appending `--query` to paths without one.
#[must_use]
pub fn build_requests(opt: &WatchOpt) -> Vec<WatchRequest> {
    opt.paths
        .iter()
        .map(|path| {
            let url = match &opt.query {
                Some(query) if !query.is_empty() && !path.contains('?') => {
                    format!("{path}?{}", query.trim_start_matches('?'))
                }
                _ => path.clone(),
            };
            WatchRequest::new(url, opt.cluster.as_str())
        })
        .collect()
}

/// Streams watch events to stdout as JSON lines until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a watch cannot be opened.
pub async fn run_watch(opt: &WatchOpt) -> anyhow::Result<()> {
    let config = CliConfig::resolve(opt)?;
    let user_id = config.user_id.clone().unwrap_or_default();
    let teardown_delay = config.multiplexer.unsubscribe_delay();

    tracing::info!("Connecting to {}", config.websocket.url);
    let mux = WatchMultiplexer::new(
        config.multiplexer,
        WebSocketConnector::new(config.websocket),
        StaticIdentity::new(user_id),
    )?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let mut subscriptions: Vec<Subscription> = Vec::new();

    for request in build_requests(opt) {
        let tx = tx.clone();
        let url = request.url.clone();
        let cluster = request.cluster.clone();
        let callback = move |payload: &Value| {
            let line = json!({ "cluster": cluster, "url": url, "event": payload });
            if tx.send(line).is_err() {
                tracing::trace!("Output channel closed");
            }
        };

        if let Some(subscription) = watch(&mux, &request, callback).await? {
            tracing::info!("Watching {}", subscription.key());
            subscriptions.push(subscription);
        }
    }
    drop(tx);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => println!("{line}"),
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {e}");
                }
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    for subscription in &mut subscriptions {
        subscription.unsubscribe();
    }

    // Let the debounced teardowns send their CLOSE frames
    tokio::time::sleep(teardown_delay * 2).await;
    mux.disconnect();

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::*;
    use crate::opt::{Commands, KubemuxCli};

    fn watch_opt(args: &[&str]) -> WatchOpt {
        let mut full = vec!["kubemux", "watch", "--cluster", "minikube"];
        full.extend_from_slice(args);
        let Commands::Watch(opt) = KubemuxCli::try_parse_from(full).unwrap().command;
        opt
    }

    #[rstest]
    fn test_build_requests_without_query() {
        let opt = watch_opt(&["--path", "/api/v1/pods", "--path", "/api/v1/nodes"]);

        let requests = build_requests(&opt);

        assert_eq!(
            requests,
            vec![
                WatchRequest::new("/api/v1/pods", "minikube"),
                WatchRequest::new("/api/v1/nodes", "minikube"),
            ]
        );
    }

    #[rstest]
    #[case("/api/v1/pods", "watch=1", "/api/v1/pods?watch=1")]
    #[case("/api/v1/pods", "?watch=1", "/api/v1/pods?watch=1")]
    #[case("/api/v1/pods?limit=5", "watch=1", "/api/v1/pods?limit=5")]
    #[case("/api/v1/pods", "", "/api/v1/pods")]
    fn test_build_requests_applies_query(
        #[case] path: &str,
        #[case] query: &str,
        #[case] expected: &str,
    ) {
        let opt = watch_opt(&["--path", path, "--query", query]);

        let requests = build_requests(&opt);

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, expected);
        assert!(requests[0].enabled);
    }
}
