mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use relay_blob::{BlobAdapter, BlobConfig, MemoryBlobStore};
use relay_pipe::{
    AssetCatalog, CoordinatorConfig, FinalizeStage, Reply, RequestCoordinator, ResponseState,
    StreamVariant, TransferError, TransferRequest, TransferStage,
};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use common::{chunks, FakeCatalog, FakeSources, CountingStore};

const API_KEY: &str = "test-key";

fn abc123() -> AssetCatalog {
    AssetCatalog::new(
        "abc123",
        vec![
            StreamVariant::audio("hi", "webm", "audio/webm; codecs=\"opus\"")
                .with_bitrate(160)
                .with_content_length(20_000),
            StreamVariant::audio("muxed", "mp4", "video/mp4")
                .with_video()
                .with_bitrate(24),
            StreamVariant::audio("lo", "webm", "audio/webm; codecs=\"opus\"")
                .with_bitrate(48)
                .with_content_length(5_000),
        ],
    )
    .with_length_seconds(212)
}

fn sources() -> FakeSources {
    FakeSources::default()
        .with_script("lo", chunks(5, 1_000))
        .with_script("hi", chunks(20, 1_000))
}

fn coordinator(catalog: FakeCatalog, sources: FakeSources, store: CountingStore) -> RequestCoordinator {
    coordinator_with(catalog, sources, store, CoordinatorConfig::default().with_api_key(API_KEY))
}

fn coordinator_with(
    catalog: FakeCatalog,
    sources: FakeSources,
    store: CountingStore,
    config: CoordinatorConfig,
) -> RequestCoordinator {
    RequestCoordinator::new(
        Arc::new(catalog),
        Arc::new(sources),
        BlobAdapter::new(store, BlobConfig::default()),
        config,
    )
}

fn counting_store() -> CountingStore {
    CountingStore {
        inner: MemoryBlobStore::new("https://storage.test/bucket"),
        ..CountingStore::default()
    }
}

async fn run(coordinator: &RequestCoordinator, request: TransferRequest) -> Reply {
    let (state, rx) = ResponseState::channel();
    coordinator
        .handle(request, Arc::new(state), CancellationToken::new())
        .await;
    rx.await.expect("coordinator always replies")
}

#[tokio::test]
async fn relays_lowest_bitrate_audio_and_publishes_it() {
    let store = counting_store();
    let sources = Arc::new(sources());
    let coordinator = RequestCoordinator::new(
        Arc::new(FakeCatalog::default().with_asset(abc123())),
        sources.clone(),
        BlobAdapter::new(store.clone(), BlobConfig::default()),
        CoordinatorConfig::default().with_api_key(API_KEY),
    );

    let payload = run(&coordinator, TransferRequest::post("abc123").with_api_key(API_KEY))
        .await
        .unwrap();

    assert_eq!(payload.audio_url, "https://storage.test/bucket/abc123.webm");
    assert_eq!(payload.media_type, "audio/webm");
    assert_eq!(payload.length_seconds, Some(212));
    assert_eq!(payload.file_size, 5_000);
    assert_eq!(payload.transferred_bytes, 5_000);

    assert_eq!(*sources.opened.lock(), vec!["lo".to_string()]);
    assert!(store.inner.is_public("abc123.webm"));
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.metadata_calls.load(Ordering::SeqCst), 1);

    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["type"], "audio/webm");
    assert_eq!(json["audio_url"], "https://storage.test/bucket/abc123.webm");
}

#[tokio::test]
async fn wrong_api_key_is_rejected_before_any_work() {
    let sources = Arc::new(sources());
    let coordinator = RequestCoordinator::new(
        Arc::new(FakeCatalog::default().with_asset(abc123())),
        sources.clone(),
        BlobAdapter::new(counting_store(), BlobConfig::default()),
        CoordinatorConfig::default().with_api_key(API_KEY),
    );

    let reply = run(&coordinator, TransferRequest::post("abc123").with_api_key("nope")).await;
    assert!(matches!(reply, Err(TransferError::Unauthorized)));

    let reply = run(&coordinator, TransferRequest::post("abc123")).await;
    assert!(matches!(reply, Err(TransferError::Unauthorized)));

    assert!(sources.opened.lock().is_empty());
}

#[tokio::test]
async fn auth_is_checked_before_method() {
    let coordinator = coordinator(FakeCatalog::default(), sources(), counting_store());

    let reply = run(&coordinator, TransferRequest::new("GET").with_asset_id("abc123")).await;
    assert!(matches!(reply, Err(TransferError::Unauthorized)));

    let reply = run(
        &coordinator,
        TransferRequest::new("GET")
            .with_asset_id("abc123")
            .with_api_key(API_KEY),
    )
    .await;
    match reply {
        Err(err @ TransferError::MethodNotAllowed { .. }) => {
            assert_eq!(err.into_relay_error().code(), 405)
        }
        other => panic!("expected 405, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_or_blank_asset_id_is_bad_request() {
    let coordinator = coordinator(FakeCatalog::default(), sources(), counting_store());

    let reply = run(&coordinator, TransferRequest::new("POST").with_api_key(API_KEY)).await;
    assert!(matches!(reply, Err(TransferError::MissingAssetId)));

    let reply = run(&coordinator, TransferRequest::post("   ").with_api_key(API_KEY)).await;
    assert!(matches!(reply, Err(TransferError::MissingAssetId)));
}

#[tokio::test]
async fn asset_without_audio_is_not_found() {
    let video_only = AssetCatalog::new(
        "vid1",
        vec![StreamVariant::audio("muxed", "mp4", "video/mp4").with_video()],
    );
    let coordinator = coordinator(
        FakeCatalog::default().with_asset(video_only),
        sources(),
        counting_store(),
    );

    let reply = run(&coordinator, TransferRequest::post("vid1").with_api_key(API_KEY)).await;
    match reply {
        Err(err @ TransferError::NotFound { .. }) => {
            let relay = err.into_relay_error();
            assert_eq!(relay.code(), 404);
            assert_eq!(relay.message, "No audio formats available for this video");
        }
        other => panic!("expected 404, got {:?}", other),
    }

    let reply = run(&coordinator, TransferRequest::post("missing").with_api_key(API_KEY)).await;
    assert!(matches!(reply, Err(TransferError::NotFound { .. })));
}

#[tokio::test]
async fn unavailable_catalog_is_a_general_error() {
    let coordinator = coordinator(FakeCatalog::unavailable(), sources(), counting_store());
    let reply = run(&coordinator, TransferRequest::post("abc123").with_api_key(API_KEY)).await;
    match reply {
        Err(err @ TransferError::Catalog(_)) => assert_eq!(err.into_relay_error().code(), 500),
        other => panic!("expected catalog error, got {:?}", other),
    }
}

#[tokio::test]
async fn sink_failure_skips_finalization() {
    let store = CountingStore {
        fail_writes_after: Some(2_500),
        ..counting_store()
    };
    let coordinator = coordinator(
        FakeCatalog::default().with_asset(abc123()),
        sources(),
        store.clone(),
    );

    let reply = run(&coordinator, TransferRequest::post("abc123").with_api_key(API_KEY)).await;
    match reply {
        Err(TransferError::Relay {
            stage,
            bytes_transferred,
            ..
        }) => {
            assert_eq!(stage, TransferStage::Sink);
            assert_eq!(bytes_transferred, 2_000);
        }
        other => panic!("expected relay failure, got {:?}", other),
    }
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn source_failure_leaves_no_object() {
    let mut script = chunks(2, 1_000);
    script.push(Err("connection reset by peer".to_string()));
    let store = counting_store();
    let coordinator = coordinator(
        FakeCatalog::default().with_asset(abc123()),
        FakeSources::default().with_script("lo", script),
        store.clone(),
    );

    let reply = run(&coordinator, TransferRequest::post("abc123").with_api_key(API_KEY)).await;
    match reply {
        Err(err @ TransferError::Relay { .. }) => {
            let relay = err.into_relay_error();
            assert_eq!(relay.code(), 500);
            assert_eq!(relay.message, "Error in audio stream");
        }
        other => panic!("expected relay failure, got {:?}", other),
    }
    assert!(store.inner.is_empty());
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn visibility_failure_skips_metadata() {
    let store = CountingStore {
        fail_make_public: true,
        ..counting_store()
    };
    let coordinator = coordinator(
        FakeCatalog::default().with_asset(abc123()),
        sources(),
        store.clone(),
    );

    let reply = run(&coordinator, TransferRequest::post("abc123").with_api_key(API_KEY)).await;
    match reply {
        Err(TransferError::Finalization(err)) => assert_eq!(err.stage, FinalizeStage::Visibility),
        other => panic!("expected finalization failure, got {:?}", other),
    }
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn metadata_without_size_is_a_metadata_failure() {
    let store = CountingStore {
        drop_size: true,
        ..counting_store()
    };
    let coordinator = coordinator(
        FakeCatalog::default().with_asset(abc123()),
        sources(),
        store,
    );

    let reply = run(&coordinator, TransferRequest::post("abc123").with_api_key(API_KEY)).await;
    match reply {
        Err(TransferError::Finalization(err)) => assert_eq!(err.stage, FinalizeStage::Metadata),
        other => panic!("expected metadata failure, got {:?}", other),
    }
}

#[tokio::test]
async fn request_timeout_replies_once_and_skips_finalization() {
    let store = counting_store();
    let coordinator = coordinator_with(
        FakeCatalog::default().with_asset(abc123()),
        FakeSources::default().stalled(),
        store.clone(),
        CoordinatorConfig::default()
            .with_api_key(API_KEY)
            .with_request_timeout(Duration::from_millis(30)),
    );

    let (state, rx) = ResponseState::channel();
    let state = Arc::new(state);
    coordinator
        .handle(
            TransferRequest::post("abc123").with_api_key(API_KEY),
            state.clone(),
            CancellationToken::new(),
        )
        .await;

    assert!(state.is_sent());
    assert!(matches!(rx.await.unwrap(), Err(TransferError::Cancelled)));
    assert!(store.inner.is_empty());
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn timeout_during_visibility_skips_metadata() {
    let store = CountingStore {
        make_public_delay: Some(Duration::from_millis(200)),
        ..counting_store()
    };
    let coordinator = coordinator_with(
        FakeCatalog::default().with_asset(abc123()),
        sources(),
        store.clone(),
        CoordinatorConfig::default()
            .with_api_key(API_KEY)
            .with_request_timeout(Duration::from_millis(50)),
    );

    let token = CancellationToken::new();
    let (state, rx) = ResponseState::channel();
    coordinator
        .handle(
            TransferRequest::post("abc123").with_api_key(API_KEY),
            Arc::new(state),
            token.clone(),
        )
        .await;

    assert!(matches!(rx.await.unwrap(), Err(TransferError::Cancelled)));
    assert!(token.is_cancelled());
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.metadata_calls.load(Ordering::SeqCst), 0);
    assert!(!store.inner.is_public("abc123.webm"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_requests_never_arm_the_timer() {
    let coordinator = coordinator_with(
        FakeCatalog::default().with_asset(abc123()),
        sources(),
        counting_store(),
        CoordinatorConfig::default()
            .with_api_key(API_KEY)
            .with_request_timeout(Duration::ZERO),
    );

    for _ in 0..50 {
        let token = CancellationToken::new();
        let (state, rx) = ResponseState::channel();
        coordinator
            .handle(
                TransferRequest::post("abc123").with_api_key("nope"),
                Arc::new(state),
                token.clone(),
            )
            .await;
        assert!(matches!(rx.await.unwrap(), Err(TransferError::Unauthorized)));

        tokio::task::yield_now().await;
        assert!(!token.is_cancelled());
    }
}

#[tokio::test]
async fn caller_cancellation_stops_the_relay() {
    let store = counting_store();
    let coordinator = coordinator(
        FakeCatalog::default().with_asset(abc123()),
        FakeSources::default().stalled(),
        store.clone(),
    );

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let (state, rx) = ResponseState::channel();
    coordinator
        .handle(
            TransferRequest::post("abc123").with_api_key(API_KEY),
            Arc::new(state),
            token,
        )
        .await;

    assert!(matches!(rx.await.unwrap(), Err(TransferError::Cancelled)));
    assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn open_api_accepts_any_caller() {
    let coordinator = coordinator_with(
        FakeCatalog::default().with_asset(abc123()),
        sources(),
        counting_store(),
        CoordinatorConfig::default(),
    );
    let reply = run(&coordinator, TransferRequest::post("abc123")).await;
    assert!(reply.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_failures_produce_one_reply() {
    for _ in 0..50 {
        let (state, rx) = ResponseState::channel();
        let state = Arc::new(state);
        let barrier = Arc::new(Barrier::new(2));

        let mut tasks = Vec::new();
        for stage in [TransferStage::Source, TransferStage::Sink] {
            let state = state.clone();
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                state.respond(Err(TransferError::Relay {
                    stage,
                    cause: "boom".into(),
                    bytes_transferred: 0,
                }))
            }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert!(matches!(rx.await.unwrap(), Err(TransferError::Relay { .. })));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn source_and_sink_failing_together_reply_once() {
    for _ in 0..20 {
        let mut script = chunks(2, 1_000);
        script.push(Err("connection reset by peer".to_string()));
        let store = CountingStore {
            fail_writes_after: Some(1_500),
            ..counting_store()
        };
        let coordinator = coordinator(
            FakeCatalog::default().with_asset(abc123()),
            FakeSources::default().with_script("lo", script),
            store.clone(),
        );

        let (state, rx) = ResponseState::channel();
        let state = Arc::new(state);
        coordinator
            .handle(
                TransferRequest::post("abc123").with_api_key(API_KEY),
                state.clone(),
                CancellationToken::new(),
            )
            .await;

        match rx.await.unwrap() {
            Err(TransferError::Relay { stage, .. }) => assert!(matches!(
                stage,
                TransferStage::Source | TransferStage::Sink | TransferStage::Both
            )),
            other => panic!("expected relay failure, got {:?}", other),
        }
        assert!(!state.respond(Err(TransferError::Cancelled)));
        assert_eq!(store.make_public_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.metadata_calls.load(Ordering::SeqCst), 0);
    }
}
