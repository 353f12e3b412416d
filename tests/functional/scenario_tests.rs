//! Scenario ordering and cleanup discipline.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use converge::poll::PollSpec;
use converge::probe::Outcome;
use converge::scenario::Scenario;

use crate::mock_probe::ScriptedProbe;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_cleanups_run_in_reverse_on_mid_scenario_failure() {
    let order = log();
    let step3_ran = Arc::new(AtomicBool::new(false));

    let order1 = order.clone();
    let order2 = order.clone();
    let step3 = step3_ran.clone();

    let error = Scenario::new("weighted-route")
        .action("create backends", move |ctx| {
            let order = order1.clone();
            async move {
                ctx.defer("delete backends", async move {
                    order.lock().unwrap().push("cleanup-1".to_string());
                    Ok(())
                })
                .await;
                Ok(())
            }
        })
        .action("create route", move |ctx| {
            let order = order2.clone();
            async move {
                ctx.defer("delete route", async move {
                    order.lock().unwrap().push("cleanup-2".to_string());
                    Ok(())
                })
                .await;
                Err("route rejected by admission".to_string())
            }
        })
        .action("scrape stats", move |_ctx| {
            let step3 = step3.clone();
            async move {
                step3.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .run()
        .await
        .unwrap_err();

    assert_eq!(entries(&order), vec!["cleanup-2", "cleanup-1"]);
    assert!(
        !step3_ran.load(Ordering::SeqCst),
        "steps after the failure must not run"
    );
    let message = error.to_string();
    assert!(message.contains("step `create route`"), "got: {message}");
    assert!(message.contains("route rejected"), "got: {message}");
}

#[tokio::test]
async fn test_cleanups_run_exactly_once_on_success() {
    let order = log();
    let runs = Arc::new(AtomicUsize::new(0));

    let order1 = order.clone();
    let order2 = order.clone();
    let runs1 = runs.clone();
    let runs2 = runs.clone();

    Scenario::new("happy-path")
        .action("first", move |ctx| {
            let order = order1.clone();
            let runs = runs1.clone();
            async move {
                ctx.defer("undo first", async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    order.lock().unwrap().push("undo-first".to_string());
                    Ok(())
                })
                .await;
                Ok(())
            }
        })
        .action("second", move |ctx| {
            let order = order2.clone();
            let runs = runs2.clone();
            async move {
                ctx.defer("undo second", async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    order.lock().unwrap().push("undo-second".to_string());
                    Ok(())
                })
                .await;
                Ok(())
            }
        })
        .run()
        .await
        .unwrap();

    assert_eq!(entries(&order), vec!["undo-second", "undo-first"]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_wait_timeout_identifies_step_and_runs_cleanup() {
    let order = log();
    let order1 = order.clone();

    let probe = ScriptedProbe::new([Outcome::pending("route has no admitted condition")]);
    let error = Scenario::new("route-admission")
        .action("create route", move |ctx| {
            let order = order1.clone();
            async move {
                ctx.defer("delete route", async move {
                    order.lock().unwrap().push("delete-route".to_string());
                    Ok(())
                })
                .await;
                Ok(())
            }
        })
        .wait(
            "route admitted",
            PollSpec::immediate(Duration::from_millis(5), Duration::from_millis(25)),
            probe,
        )
        .run()
        .await
        .unwrap_err();

    let message = error.to_string();
    assert!(message.contains("step `route admitted`"), "got: {message}");
    assert_eq!(entries(&order), vec!["delete-route"]);
}

#[tokio::test]
async fn test_wait_hard_failure_aborts_remaining_steps() {
    let later_ran = Arc::new(AtomicBool::new(false));
    let later = later_ran.clone();

    let probe = ScriptedProbe::new([Outcome::failed("stats report malformed")]);
    let error = Scenario::new("stats")
        .wait(
            "stats settle",
            PollSpec::immediate(Duration::from_millis(5), Duration::from_secs(10)),
            probe,
        )
        .action("assert balance", move |_ctx| {
            let later = later.clone();
            async move {
                later.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .run()
        .await
        .unwrap_err();

    assert!(error.to_string().contains("step `stats settle`"));
    assert!(error.to_string().contains("malformed"));
    assert!(!later_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cleanup_failure_does_not_mask_scenario_result() {
    let result = Scenario::new("leaky-cleanup")
        .action("create", |ctx| async move {
            ctx.defer("flaky undo", async move {
                Err("namespace already terminating".to_string())
            })
            .await;
            Ok(())
        })
        .run()
        .await;

    assert!(result.is_ok(), "cleanup errors are logged, not propagated");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panic_in_step_still_runs_cleanups() {
    let cleaned = Arc::new(AtomicBool::new(false));
    let cleaned_in_task = cleaned.clone();

    let handle = tokio::spawn(async move {
        let cleaned = cleaned_in_task.clone();
        Scenario::new("panicky")
            .action("create", move |ctx| {
                let cleaned = cleaned.clone();
                async move {
                    ctx.defer("undo create", async move {
                        cleaned.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
                    let admitted = false;
                    assert!(admitted, "route never admitted");
                    Ok(())
                }
            })
            .run()
            .await
    });

    let join_error = handle.await.unwrap_err();
    assert!(join_error.is_panic(), "panic must propagate after cleanup");
    assert!(cleaned.load(Ordering::SeqCst), "cleanup must run on panic");
}
