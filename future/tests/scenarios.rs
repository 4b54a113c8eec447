use hardy_future::{AbortController, Body, CancellableFuture, Options, State, Trigger};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct IoError(String);

#[tokio::test]
async fn immediate_fulfillment() {
    let future: CancellableFuture<u16, u16> =
        CancellableFuture::new(Body::callback(|settle, _, _, ()| {
            settle.settle(200);
            Ok(())
        }));

    assert_eq!(future.state(), State::Fulfilled);
    assert_eq!(future.value(), Some(&Ok(200)));
    assert_eq!(future.clone().await, Ok(200));
}

#[tokio::test(start_paused = true)]
async fn delayed_rejection_is_cached() {
    let future: CancellableFuture<u16, u16> =
        CancellableFuture::new(Body::callback(|_, fail, _, ()| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                fail.fail(404);
            });
            Ok(())
        }));

    assert!(future.is_pending());
    assert_eq!(future.value(), None);

    let err = future.clone().await.unwrap_err();
    assert_eq!(err, 404);
    assert_eq!(future.value(), Some(&Err(err)));

    // Reading again neither re-runs nor blocks
    assert_eq!(future.value(), Some(&Err(404)));
    assert_eq!(future.clone().await, Err(404));
}

#[tokio::test]
async fn synchronous_throw_rejects() {
    let future: CancellableFuture<u16, IoError> =
        CancellableFuture::new(Body::callback(|_, _, _, ()| {
            Err(IoError("Your HDD exploded".to_string()))
        }));

    assert_eq!(future.state(), State::Rejected);
    assert_eq!(future.value(), Some(&Err(IoError("Your HDD exploded".to_string()))));
    assert!(matches!(future.trigger(), Trigger::Spent));
}

#[tokio::test]
async fn direct_style_failure() {
    let future: CancellableFuture<u16, IoError> =
        CancellableFuture::new(Body::direct(|_, ()| async {
            Err(IoError("I/O problems, check your wifi adapter".to_string()))
        }));

    let err = future.clone().await.unwrap_err();
    assert_eq!(future.state(), State::Rejected);
    assert_eq!(future.value(), Some(&Err(err)));
}

#[tokio::test(start_paused = true)]
async fn direct_style_success_after_suspension() {
    let future: CancellableFuture<u16, IoError> =
        CancellableFuture::new(Body::direct(|_, ()| async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok(200)
        }));

    assert!(future.is_pending());
    assert!(matches!(future.trigger(), Trigger::Available(_)));

    let chained = future.chain(
        |v| async move { Ok::<_, IoError>(v * 2) },
        |e| async move { Err(e) },
    );
    assert_eq!(chained.await, Ok(400));
    assert_eq!(future.value(), Some(&Ok(200)));
    assert!(matches!(future.trigger(), Trigger::Spent));
}

#[tokio::test(start_paused = true)]
async fn ignored_abort_does_not_reject() {
    let future: CancellableFuture<u16, &str> =
        CancellableFuture::new(Body::callback(|settle, _, _, ()| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                settle.settle(1);
            });
            Ok(())
        }));

    future.abort("stop").unwrap();
    assert!(future.signal().is_aborted());
    assert!(future.is_pending());

    assert_eq!(future.clone().await, Ok(1));
    assert_eq!(future.state(), State::Fulfilled);
}

#[tokio::test(start_paused = true)]
async fn observed_abort_rejects_with_reason() {
    let future: CancellableFuture<u16, &str> =
        CancellableFuture::new(Body::callback(|settle, fail, signal, ()| {
            signal.on_abort(move |reason| {
                fail.fail(*reason);
            });
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                settle.settle(200);
            });
            Ok(())
        }));

    future.abort("I don't want this").unwrap();

    assert_eq!(future.clone().await, Err("I don't want this"));
    assert_eq!(future.value(), Some(&Err("I don't want this")));
}

#[tokio::test(start_paused = true)]
async fn borrowed_signal_is_aborted_by_its_owner() {
    let controller = AbortController::new();
    let future: CancellableFuture<u16, &str> = CancellableFuture::with_options(
        Body::direct(|signal, ()| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(200),
                _ = signal.aborted() => Err(signal.reason().copied().unwrap_or("aborted")),
            }
        }),
        Options::with_signal(controller.signal()).named("fetch"),
    );

    assert!(matches!(future.trigger(), Trigger::Unavailable));

    controller.abort("caller gave up");
    assert_eq!(future.clone().await, Err("caller gave up"));

    assert_eq!(future.state(), State::Rejected);
    assert!(matches!(future.trigger(), Trigger::Unavailable));
}

#[tokio::test(start_paused = true)]
async fn polling_the_signal_in_a_loop() {
    let future: CancellableFuture<u32, String> =
        CancellableFuture::new(Body::direct(|signal, ()| async move {
            let mut ticks = 0;
            while !signal.is_aborted() {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks += 1;
            }
            Err(format!("aborted after {ticks} ticks"))
        }));

    tokio::time::sleep(Duration::from_millis(35)).await;
    future.abort("ignored reason".to_string()).unwrap();

    let err = future.clone().await.unwrap_err();
    assert!(err.starts_with("aborted after"));
    assert_eq!(future.signal().reason(), Some(&"ignored reason".to_string()));
}

#[tokio::test]
async fn borrowed_signal_with_callback_listener() {
    let controller = AbortController::new();
    let future: CancellableFuture<u16, &str> = CancellableFuture::with_options(
        Body::callback(|_, fail, signal, ()| {
            signal.on_abort(move |reason| {
                fail.fail(*reason);
            });
            Ok(())
        }),
        Options::with_signal(controller.signal()),
    );

    assert!(matches!(future.trigger(), Trigger::Unavailable));
    assert!(future.is_pending());

    controller.abort("reason");

    assert_eq!(future.state(), State::Rejected);
    assert_eq!(future.value(), Some(&Err("reason")));
    assert!(matches!(future.trigger(), Trigger::Unavailable));
}
