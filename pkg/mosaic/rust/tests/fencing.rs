// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Out-of-order responses, teardown during a fetch and request timeouts,
//! driven through the public board API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use mosaic_tiles::chart::{RenderTarget, SnapshotRenderer};
use mosaic_tiles::data::{DiagnosticIssue, StaleReason};
use mosaic_tiles::fetcher::DEFAULT_SAMPLE_ENDPOINT;
use mosaic_tiles::testing::ScriptedTransport;
use mosaic_tiles::{
    catalog, DashboardComposer, Generation, RenderOutcome, SiteSelection, TileBoard, TileError,
    TileState, VariableFetcher,
};
use serde_json::json;

const BARK_TILE: &str = "dendro-bark";

fn transport() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::fixtures([
        (
            "Bark (B)",
            json!({"categories": [{"name": "ja", "count": 3}, {"name": "nej", "count": 1}]}),
        ),
        (
            DEFAULT_SAMPLE_ENDPOINT,
            json!({"categories": [{"name": "Core", "count": 8}]}),
        ),
    ]))
}

fn board(
    transport: Arc<ScriptedTransport>,
    fetcher_timeout: Option<Duration>,
) -> (Arc<TileBoard>, Arc<SnapshotRenderer>) {
    let mut fetcher = VariableFetcher::new(transport);
    if let Some(timeout) = fetcher_timeout {
        fetcher = fetcher.with_timeout(timeout);
    }
    let charts = Arc::new(SnapshotRenderer::new());
    let board = TileBoard::new(
        catalog::builtin_tiles(),
        DashboardComposer::new(fetcher),
        charts.clone(),
        SiteSelection::new(vec![1]),
    );
    (Arc::new(board), charts)
}

/// Yield until the transport has seen `n` requests.
async fn wait_for_calls(transport: &ScriptedTransport, n: usize) {
    while transport.call_count() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn late_response_of_an_older_cycle_is_discarded() {
    let transport = transport();
    let (board, _) = board(transport.clone(), None);
    let gate = transport.hold(Generation::new(1));

    let first = tokio::spawn({
        let board = board.clone();
        async move { board.render(BARK_TILE, Some(RenderTarget::new("main"))).await }
    });
    wait_for_calls(&transport, 2).await;

    let second = board.render(BARK_TILE, None).await.unwrap();
    assert_eq!(
        second,
        RenderOutcome::Applied {
            generation: Generation::new(2),
            sections: 2
        }
    );

    gate.release();
    let first = first.await.unwrap().unwrap();
    assert_eq!(
        first,
        RenderOutcome::Discarded {
            generation: Generation::new(1),
            reason: StaleReason::Superseded {
                response: Generation::new(1),
                current: Generation::new(2),
            },
        }
    );

    let tile = board.get(BARK_TILE).unwrap();
    assert_eq!(tile.data().await.unwrap().generation, Generation::new(2));
    assert_eq!(tile.state().await, TileState::Active);
    assert_eq!(tile.in_flight(), 0);
}

#[tokio::test]
async fn unrender_waits_for_in_flight_cycle_and_discards_it() {
    let transport = transport();
    let (board, charts) = board(transport.clone(), None);
    let target = RenderTarget::new("main");

    board.render(BARK_TILE, Some(target.clone())).await.unwrap();
    assert!(!charts.snapshot(&target).charts.is_empty());

    let gate = transport.hold(Generation::new(2));
    let update = tokio::spawn({
        let board = board.clone();
        async move { board.render(BARK_TILE, None).await }
    });
    wait_for_calls(&transport, 4).await;

    let unrender = tokio::spawn({
        let board = board.clone();
        async move { board.unrender(BARK_TILE).await }
    });

    let tile = board.get(BARK_TILE).unwrap();
    while tile.state().await != TileState::Unrendering {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!unrender.is_finished());
    assert_eq!(
        board.render(BARK_TILE, None).await.unwrap_err(),
        TileError::TearingDown(BARK_TILE.to_string())
    );

    gate.release();
    unrender.await.unwrap().unwrap();
    let update = update.await.unwrap().unwrap();
    assert_eq!(
        update,
        RenderOutcome::Discarded {
            generation: Generation::new(2),
            reason: StaleReason::Inactive,
        }
    );

    assert_eq!(tile.state().await, TileState::Idle);
    assert!(!tile.is_active().await);
    assert!(tile.data().await.is_none());
    assert!(tile.target().await.is_none());
    let snapshot = charts.snapshot(&target);
    assert!(snapshot.charts.is_empty());
    assert_eq!(snapshot.listeners, 0);
}

#[tokio::test]
async fn selection_change_supersedes_a_pending_cycle() {
    let transport = transport();
    let (board, _) = board(transport.clone(), None);
    let gate = transport.hold(Generation::new(1));

    let first = tokio::spawn({
        let board = board.clone();
        async move { board.render(BARK_TILE, Some(RenderTarget::new("main"))).await }
    });
    wait_for_calls(&transport, 2).await;

    let results = board.set_selection(vec![2, 3]).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1.as_ref().unwrap().generation(), Generation::new(2));

    gate.release();
    assert!(first.await.unwrap().unwrap().is_discarded());

    let calls = transport.calls();
    for call in &calls {
        let sites = if call.body["requestId"] == 1 {
            json!([1])
        } else {
            json!([2, 3])
        };
        assert_eq!(call.body["sites"], sites, "{call:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn hung_backend_times_out_and_the_tile_settles() {
    let transport = transport();
    let (board, charts) = board(transport.clone(), Some(Duration::from_secs(5)));
    let _gate = transport.hold(Generation::new(1));
    let target = RenderTarget::new("main");

    let outcome = board.render(BARK_TILE, Some(target.clone())).await.unwrap();
    assert_eq!(
        outcome,
        RenderOutcome::NoData {
            generation: Generation::new(1)
        }
    );

    let tile = board.get(BARK_TILE).unwrap();
    assert_eq!(tile.state().await, TileState::Active);
    let data = tile.data().await.unwrap();
    assert_eq!(data.diagnostics.len(), 2);
    assert!(data
        .diagnostics
        .iter()
        .all(|d| matches!(d.issue, DiagnosticIssue::FetchFailed { .. })));
    assert_eq!(
        charts.snapshot(&target).placeholder.as_deref(),
        Some("No data available for Bark")
    );
}
